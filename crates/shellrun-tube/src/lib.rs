//! shellrun-tube: live process handles
//!
//! A [`Process`] owns a spawned child with piped standard streams. Output is
//! drained continuously by reader threads, so the child never stalls on a
//! full pipe while the caller is busy or blocked in [`Process::wait`].
//!
//! Drained output is held in memory until a `recv*` call takes it. Nothing
//! caps that buffer, so a handle whose program writes heavily and is never
//! read grows with everything the program has written.

pub mod process;
pub mod status;
pub mod stream;

pub use process::{Process, ProcessBuilder};
pub use status::ExitStatus;
pub use stream::{ProcessStream, StreamChunk};
