//! shellrun-elf: wrap raw shellcode in a directly loadable executable
//!
//! The image is a static `ET_EXEC` ELF with a single RWX `PT_LOAD` segment
//! covering the whole file and an executable stack. Its entry point is the
//! first shellcode byte, so the program runs exactly the given bytes.

pub mod builder;
pub mod elf;

pub use builder::{ElfBuilder, ExecutableBuilder, ExecutableImage, MAX_SHELLCODE_LEN};
