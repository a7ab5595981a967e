//! shellrun: run assembly or raw shellcode as a live process
//!
//! The pipeline turns text into bytes with an [`Assembler`], wraps the bytes
//! in a loadable image with an [`ExecutableBuilder`], stages the image as a
//! uniquely named executable file and launches it as a [`Process`] with
//! piped standard streams.
//!
//! Each operation comes in two flavours: one returns the live handle as soon
//! as the program has been executed, the other blocks until it terminates and
//! returns its [`ExitStatus`].
//!
//! # Example
//!
//! ```no_run
//! use shellrun::{Arch, ExitStatus, RunnerBuilder};
//!
//! let runner = RunnerBuilder::new().arch(Arch::Amd64).build()?;
//!
//! let status = runner.run_assembly_until_exit("mov edi, 3; mov eax, SYS_exit; syscall")?;
//! assert_eq!(status, ExitStatus::Exited(3));
//!
//! let mut io = runner.run_assembly("spin: jmp spin")?;
//! println!("staged at {}", io.staged_path().display());
//! io.kill()?;
//! # Ok::<(), shellrun::ShellrunError>(())
//! ```

pub mod runner;
pub mod stager;

pub use nix::sys::signal::Signal;
pub use shellrun_asm::{Assembler, BinutilsAssembler, Toolchain, toolchain};
pub use shellrun_core::{
    self as core, Arch, Context, ContextConfig, ContextGuard, Endian, Os, Result, ShellrunError,
    context,
};
pub use shellrun_elf::{ElfBuilder, ExecutableBuilder, ExecutableImage};
pub use shellrun_tube::{ExitStatus, Process, ProcessBuilder, StreamChunk};

pub use runner::{Runner, RunnerBuilder, RunningShellcode};
pub use stager::{Cleanup, StagedExecutable, Stager};

/// Assemble `text` under the ambient context and start it
pub fn run_assembly(text: &str) -> Result<RunningShellcode> {
    Runner::default().run_assembly(text)
}

/// Start `shellcode` under the ambient context
pub fn run_shellcode(shellcode: &[u8]) -> Result<RunningShellcode> {
    Runner::default().run_shellcode(shellcode)
}

/// Assemble `text` under the ambient context, run it and wait for it
pub fn run_assembly_until_exit(text: &str) -> Result<ExitStatus> {
    Runner::default().run_assembly_until_exit(text)
}

/// Run `shellcode` under the ambient context and wait for it
pub fn run_shellcode_until_exit(shellcode: &[u8]) -> Result<ExitStatus> {
    Runner::default().run_shellcode_until_exit(shellcode)
}
