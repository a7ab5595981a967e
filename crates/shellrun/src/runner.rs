//! The shellcode runner and its builder

use std::ffi::OsString;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use log::debug;
use shellrun_asm::{Assembler, BinutilsAssembler};
use shellrun_core::{Arch, Context, ContextConfig, Endian, Os, Result, context};
use shellrun_elf::{ElfBuilder, ExecutableBuilder, ExecutableImage};
use shellrun_tube::{ExitStatus, Process, ProcessBuilder};

use crate::stager::{Cleanup, StagedExecutable, Stager};

/// Builder pattern for runner creation
pub struct RunnerBuilder {
    config: ContextConfig,
    assembler: Box<dyn Assembler>,
    executable_builder: Box<dyn ExecutableBuilder>,
    stager: Stager,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerBuilder {
    /// Binutils assembler, ELF builder, ambient context
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            assembler: Box::new(BinutilsAssembler::new()),
            executable_builder: Box::new(ElfBuilder::new()),
            stager: Stager::new(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Set target architecture
    pub fn arch(mut self, arch: Arch) -> Self {
        self.config.arch = Some(arch);
        self
    }

    /// Set target operating system
    pub fn os(mut self, os: Os) -> Self {
        self.config.os = Some(os);
        self
    }

    /// Set byte order
    pub fn endian(mut self, endian: Endian) -> Self {
        self.config.endian = Some(endian);
        self
    }

    /// Set word size in bits
    pub fn bits(mut self, bits: u8) -> Self {
        self.config.bits = Some(bits);
        self
    }

    /// Layer a whole override over the fields set so far
    pub fn context(mut self, config: ContextConfig) -> Self {
        self.config = self.config.overlay(&config);
        self
    }

    /// Replace the assembler
    pub fn assembler(mut self, assembler: impl Assembler + 'static) -> Self {
        self.assembler = Box::new(assembler);
        self
    }

    /// Replace the executable builder
    pub fn executable_builder(mut self, builder: impl ExecutableBuilder + 'static) -> Self {
        self.executable_builder = Box::new(builder);
        self
    }

    /// Set the directory staged files are written to
    pub fn staging_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.stager = self.stager.dir(dir);
        self
    }

    /// Set the staged file name prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stager = self.stager.prefix(prefix);
        self
    }

    /// Set the staged file cleanup policy
    pub fn cleanup(mut self, cleanup: Cleanup) -> Self {
        self.stager = self.stager.cleanup(cleanup);
        self
    }

    /// Append an argument passed to the launched program
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable for the launched program
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the launched program's working directory
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Build runner
    pub fn build(self) -> Result<Runner> {
        self.config.validate()?;
        Ok(self.into_runner())
    }

    fn into_runner(self) -> Runner {
        Runner {
            config: self.config,
            assembler: self.assembler,
            executable_builder: self.executable_builder,
            stager: self.stager,
            args: self.args,
            env: self.env,
            cwd: self.cwd,
        }
    }
}

/// Turns assembly or shellcode into running processes.
///
/// Every operation runs with the runner's context override merged over the
/// calling thread's current context.
pub struct Runner {
    config: ContextConfig,
    assembler: Box<dyn Assembler>,
    executable_builder: Box<dyn ExecutableBuilder>,
    stager: Stager,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
}

impl Default for Runner {
    fn default() -> Self {
        RunnerBuilder::new().into_runner()
    }
}

impl Runner {
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    /// The override this runner applies
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// The context an operation called now would use
    pub fn context(&self) -> Result<Context> {
        context::current().merged(&self.config)
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    pub fn assemble(&self, text: &str) -> Result<Vec<u8>> {
        context::scoped(&self.config, |ctx| self.assemble_in(text, ctx))
    }

    pub fn build_image(&self, shellcode: &[u8]) -> Result<ExecutableImage> {
        context::scoped(&self.config, |ctx| self.build_in(shellcode, ctx))
    }

    /// Build and stage, without launching
    pub fn stage(&self, shellcode: &[u8]) -> Result<StagedExecutable> {
        context::scoped(&self.config, |ctx| {
            let image = self.build_in(shellcode, ctx)?;
            self.stage_image(&image)
        })
    }

    /// Assemble `text` and start it; see [`Runner::run_shellcode`]
    pub fn run_assembly(&self, text: &str) -> Result<RunningShellcode> {
        context::scoped(&self.config, |ctx| {
            let shellcode = self.assemble_in(text, ctx)?;
            self.run_in(&shellcode, ctx)
        })
    }

    /// Start `shellcode` as a new process.
    ///
    /// Returns as soon as the process has been executed. It may already have
    /// exited or crashed by the time the caller looks at the handle.
    pub fn run_shellcode(&self, shellcode: &[u8]) -> Result<RunningShellcode> {
        context::scoped(&self.config, |ctx| self.run_in(shellcode, ctx))
    }

    pub fn run_assembly_until_exit(&self, text: &str) -> Result<ExitStatus> {
        context::scoped(&self.config, |ctx| {
            let shellcode = self.assemble_in(text, ctx)?;
            self.run_until_exit_in(&shellcode, ctx)
        })
    }

    /// Start `shellcode` and block until it terminates.
    ///
    /// A non-zero exit or a fatal signal is a normal result, not an error.
    pub fn run_shellcode_until_exit(&self, shellcode: &[u8]) -> Result<ExitStatus> {
        context::scoped(&self.config, |ctx| self.run_until_exit_in(shellcode, ctx))
    }

    /// Launch an already staged file
    pub fn launch(&self, staged: StagedExecutable) -> Result<RunningShellcode> {
        let mut launch = ProcessBuilder::new(staged.path()).args(self.args.iter().cloned());
        for (key, value) in &self.env {
            launch = launch.env(key.clone(), value.clone());
        }
        if let Some(dir) = &self.cwd {
            launch = launch.cwd(dir);
        }

        let process = launch.spawn()?;
        debug!("running {} as pid {}", staged.path().display(), process.pid());

        Ok(RunningShellcode { process, staged })
    }

    fn assemble_in(&self, text: &str, ctx: &Context) -> Result<Vec<u8>> {
        let shellcode = self.assembler.assemble(text, ctx)?;
        debug!("assembled {} bytes for {}", shellcode.len(), ctx.arch);
        Ok(shellcode)
    }

    fn build_in(&self, shellcode: &[u8], ctx: &Context) -> Result<ExecutableImage> {
        let image = self.executable_builder.build(shellcode, ctx)?;
        debug!(
            "built {} byte image from {} bytes of shellcode",
            image.len(),
            shellcode.len()
        );
        Ok(image)
    }

    fn stage_image(&self, image: &ExecutableImage) -> Result<StagedExecutable> {
        let staged = self.stager.stage(image)?;
        debug!("staged image at {}", staged.path().display());
        Ok(staged)
    }

    fn run_in(&self, shellcode: &[u8], ctx: &Context) -> Result<RunningShellcode> {
        let image = self.build_in(shellcode, ctx)?;
        let staged = self.stage_image(&image)?;
        self.launch(staged)
    }

    fn run_until_exit_in(&self, shellcode: &[u8], ctx: &Context) -> Result<ExitStatus> {
        let mut running = self.run_in(shellcode, ctx)?;
        let status = running.wait()?;
        debug!("pid {} terminated: {}", running.pid(), status);
        Ok(status)
    }
}

/// A launched shellcode process together with its staged file.
///
/// Dereferences to the underlying [`Process`] for I/O. Dropping a handle
/// whose process is still running kills it.
pub struct RunningShellcode {
    process: Process,
    staged: StagedExecutable,
}

impl RunningShellcode {
    /// Path of the executable the process was started from
    pub fn staged_path(&self) -> &Path {
        self.staged.path()
    }

    /// Exit status if the process has terminated, without blocking
    pub fn poll(&mut self) -> Result<Option<ExitStatus>> {
        self.process.poll()
    }

    /// Block until the process terminates
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.process.wait()
    }
}

impl Deref for RunningShellcode {
    type Target = Process;

    fn deref(&self) -> &Process {
        &self.process
    }
}

impl DerefMut for RunningShellcode {
    fn deref_mut(&mut self) -> &mut Process {
        &mut self.process
    }
}

impl std::fmt::Debug for RunningShellcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningShellcode")
            .field("pid", &self.process.pid())
            .field("staged", &self.staged.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellrun_core::ShellrunError;

    struct FixedAssembler(Vec<u8>);

    impl Assembler for FixedAssembler {
        fn assemble(&self, _text: &str, _ctx: &Context) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn build_rejects_inconsistent_override() {
        let err = RunnerBuilder::new()
            .arch(Arch::I386)
            .bits(64)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ShellrunError::InvalidContext(_)));
    }

    #[test]
    fn context_setter_overlays() {
        let runner = RunnerBuilder::new()
            .arch(Arch::Amd64)
            .bits(64)
            .context(ContextConfig::new().arch(Arch::I386))
            .build()
            .unwrap();
        assert_eq!(runner.config().arch, Some(Arch::I386));
        assert_eq!(runner.config().bits, None);
        assert_eq!(runner.context().unwrap().bits, 32);
    }

    #[test]
    fn operations_see_runner_context() {
        let runner = RunnerBuilder::new()
            .arch(Arch::I386)
            .executable_builder(ElfBuilder::new().base_address(0x1000_0000))
            .build()
            .unwrap();

        let image = runner.build_image(&[0x90]).unwrap();
        assert_eq!(image.context().arch, Arch::I386);
        assert_eq!(image.context().bits, 32);
        assert_eq!(image.entry(), 0x1000_0000 + 116);
    }

    #[test]
    fn ambient_context_is_restored() {
        let before = context::current();
        let runner = RunnerBuilder::new().arch(Arch::Arm).build().unwrap();
        runner.build_image(&[0, 0, 0, 0]).unwrap();
        assert_eq!(context::current(), before);
    }

    #[test]
    fn assemble_uses_configured_assembler() {
        let runner = RunnerBuilder::new()
            .assembler(FixedAssembler(vec![0xcc]))
            .build()
            .unwrap();
        assert_eq!(runner.assemble("whatever").unwrap(), vec![0xcc]);
    }

    #[test]
    fn empty_shellcode_is_build_error_before_staging() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RunnerBuilder::new()
            .staging_dir(dir.path())
            .build()
            .unwrap();

        let err = runner.run_shellcode(&[]).unwrap_err();
        assert!(matches!(err, ShellrunError::Build(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn stage_writes_built_image() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RunnerBuilder::new()
            .arch(Arch::Amd64)
            .staging_dir(dir.path())
            .build()
            .unwrap();

        let image = runner.build_image(&[0x90, 0xc3]).unwrap();
        let staged = runner.stage(&[0x90, 0xc3]).unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), image.bytes());
    }
}
