//! shellrun-asm: text to shellcode bytes
//!
//! [`BinutilsAssembler`] drives `as` and `objcopy` from a native or cross
//! GNU binutils installation found on `PATH`. Anything implementing
//! [`Assembler`] can stand in for it.

pub mod assembler;
pub mod constants;
pub mod toolchain;

pub use assembler::{Assembler, BinutilsAssembler};
pub use toolchain::Toolchain;
