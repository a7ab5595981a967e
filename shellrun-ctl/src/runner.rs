use std::io::{self, Write};
use std::path::{Path, PathBuf};

use console::style;
use log::{debug, info};
use serde::Serialize;
use shellrun::{Cleanup, ContextConfig, ExitStatus, RunnerBuilder, RunningShellcode};

use crate::cli::InputArgs;
use crate::input::load_shellcode;

/// Configuration for one `run` invocation
pub struct RunConfig {
    pub input: InputArgs,
    pub context: ContextConfig,
    pub wait: bool,
    pub cleanup: Cleanup,
    pub staging_dir: Option<PathBuf>,
    pub args: Vec<String>,
    pub json: bool,
}

#[derive(Serialize)]
struct RunReport<'a> {
    pid: i32,
    staged: &'a Path,
    status: ExitStatus,
    poll_code: i32,
    stdout: String,
    stderr: String,
}

impl<'a> RunReport<'a> {
    fn new(
        running: &'a RunningShellcode,
        status: ExitStatus,
        stdout: &[u8],
        stderr: &[u8],
    ) -> Self {
        Self {
            pid: running.pid().as_raw(),
            staged: running.staged_path(),
            status,
            poll_code: status.poll_code(),
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        }
    }
}

fn status_line(status: ExitStatus, staged: &Path) -> String {
    let styled = if status.success() {
        style(status.to_string()).green().bold()
    } else {
        style(status.to_string()).red().bold()
    };
    format!(
        "{}={} | {}={}",
        style("status").dim(),
        styled,
        style("staged").dim(),
        staged.display()
    )
}

/// Run the shellcode; returns the exit code this process should exit with
pub fn run_shellcode(config: RunConfig) -> Result<i32, Box<dyn std::error::Error>> {
    let mut builder = RunnerBuilder::new()
        .context(config.context.clone())
        .cleanup(config.cleanup);

    if let Some(dir) = &config.staging_dir {
        debug!("Using staging dir: {}", dir.display());
        builder = builder.staging_dir(dir);
    }
    for arg in &config.args {
        builder = builder.arg(arg);
    }

    let runner = builder.build()?;
    info!("Target: {}", runner.context()?.arch);

    let shellcode = load_shellcode(&config.input, &runner)?;
    let mut running = runner.run_shellcode(&shellcode)?;
    info!(
        "Started pid {} from {}",
        running.pid(),
        running.staged_path().display()
    );

    if !config.wait {
        let status = running.interactive()?;
        eprintln!("{}", style(status).dim());
        return Ok(status.shell_code());
    }

    running.close_stdin();
    let stdout = running.recv_all()?;
    let stderr = running.stderr().to_vec();
    let status = running.wait()?;

    if config.json {
        let report = RunReport::new(&running, status, &stdout, &stderr);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        io::stdout().write_all(&stdout)?;
        io::stderr().write_all(&stderr)?;
        println!("{}", status_line(status, running.staged_path()));
    }

    Ok(status.shell_code())
}

#[cfg(all(test, target_os = "linux", target_arch = "x86_64"))]
mod tests {
    use super::*;
    use shellrun::Arch;
    use std::fs;

    // mov edi, 3; mov eax, 60; syscall
    const EXIT_3: &str = "bf03000000b83c0000000f05";
    // ud2
    const ILLEGAL: &str = "0f0b";
    // write(1, "hi\n", 3); exit(0)
    const HELLO: &str = "b868690a00504889e6bf01000000ba03000000b8010000000f0531ffb83c0000000f05";

    fn config(hex: &str, dir: &Path) -> RunConfig {
        RunConfig {
            input: InputArgs {
                asm: None,
                hex: Some(hex.to_string()),
                file: None,
            },
            context: ContextConfig::new().arch(Arch::Amd64),
            wait: true,
            cleanup: Cleanup::Keep,
            staging_dir: Some(dir.to_path_buf()),
            args: Vec::new(),
            json: false,
        }
    }

    #[test]
    fn wait_returns_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_shellcode(config(EXIT_3, dir.path())).unwrap(), 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn signal_maps_to_shell_code() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_shellcode(config(ILLEGAL, dir.path())).unwrap(), 132);
    }

    #[test]
    fn cleanup_leaves_staging_dir_empty() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig {
            cleanup: Cleanup::OnDrop,
            ..config(EXIT_3, dir.path())
        };
        assert_eq!(run_shellcode(run).unwrap(), 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn json_output_returns_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig {
            json: true,
            ..config(EXIT_3, dir.path())
        };
        assert_eq!(run_shellcode(run).unwrap(), 3);
    }

    #[test]
    fn interactive_run_returns_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig {
            wait: false,
            ..config(EXIT_3, dir.path())
        };
        assert_eq!(run_shellcode(run).unwrap(), 3);
    }

    #[test]
    fn bad_hex_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_shellcode(config("zz", dir.path())).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn report_carries_output_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RunnerBuilder::new()
            .arch(Arch::Amd64)
            .staging_dir(dir.path())
            .build()
            .unwrap();
        let mut running = runner
            .run_shellcode(&crate::input::parse_hex(HELLO).unwrap())
            .unwrap();
        let stdout = running.recv_all().unwrap();
        let status = running.wait().unwrap();

        let report = RunReport::new(&running, status, &stdout, b"");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stdout"], "hi\n");
        assert_eq!(json["poll_code"], 0);
        assert_eq!(json["status"]["kind"], "exited");
        assert_eq!(json["pid"], running.pid().as_raw());
        assert_eq!(json["staged"], running.staged_path().to_str().unwrap());
    }

    #[test]
    fn status_line_names_status_and_path() {
        let line = status_line(ExitStatus::Exited(3), Path::new("/tmp/shellrun-x"));
        assert!(line.contains("exited with code 3"), "{}", line);
        assert!(line.contains("/tmp/shellrun-x"), "{}", line);

        let line = status_line(ExitStatus::Signaled(4), Path::new("/tmp/shellrun-y"));
        assert!(line.contains("killed by signal"), "{}", line);
    }
}
