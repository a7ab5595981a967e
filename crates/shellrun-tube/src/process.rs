//! Spawned process with piped standard streams

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use shellrun_core::{Result, ShellrunError};

use crate::status::ExitStatus;
use crate::stream::{ProcessStream, StreamChunk, spawn_reader};

/// Launch configuration for a [`Process`]
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Spawn the program.
    ///
    /// Returns once the OS has executed it; an exec refusal is reported as
    /// [`ShellrunError::Launch`].
    pub fn spawn(&self) -> Result<Process> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.envs(self.env.iter().map(|(k, v)| (k, v)));

        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        let spawned = {
            let _lock = shellrun_core::spawn_lock();
            command.spawn()
        };
        let mut child = spawned.map_err(|e| ShellrunError::Launch {
            path: self.program.clone(),
            source: e,
        })?;

        let pid = Pid::from_raw(child.id() as i32);
        debug!("spawned {} as pid {}", self.program.display(), pid);

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, stream) = ProcessStream::new();
        let mut process = Process {
            child,
            pid,
            program: self.program.clone(),
            stdin,
            stream,
            stdout_buf: Vec::new(),
            stderr_buf: Vec::new(),
            eof: false,
            status: None,
        };

        // On error, dropping `process` kills and reaps the child.
        if let Some(out) = stdout {
            spawn_reader(out, false, tx.clone())?;
        }
        if let Some(err) = stderr {
            spawn_reader(err, true, tx)?;
        }

        process.poll()?;
        Ok(process)
    }
}

/// A running (or finished) child process
pub struct Process {
    child: Child,
    pid: Pid,
    program: PathBuf,
    stdin: Option<ChildStdin>,
    stream: ProcessStream,
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
    eof: bool,
    status: Option<ExitStatus>,
}

impl Process {
    /// Spawn `program` with default launch settings
    pub fn spawn(program: impl AsRef<Path>) -> Result<Self> {
        ProcessBuilder::new(program).spawn()
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Exit status if the process has terminated, without blocking.
    ///
    /// The first observed status is cached and returned from then on.
    pub fn poll(&mut self) -> Result<Option<ExitStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }

        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(self.record(status.into()))),
            Ok(None) => Ok(None),
            Err(e) => Err(ShellrunError::Process(format!(
                "poll pid {} failed: {}",
                self.pid, e
            ))),
        }
    }

    /// Block until the process terminates
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        let status = self.child.wait().map_err(|e| {
            ShellrunError::Process(format!("wait for pid {} failed: {}", self.pid, e))
        })?;
        Ok(self.record(status.into()))
    }

    fn record(&mut self, status: ExitStatus) -> ExitStatus {
        debug!("pid {} {}", self.pid, status);
        self.status = Some(status);
        status
    }

    pub fn is_alive(&mut self) -> Result<bool> {
        Ok(self.poll()?.is_none())
    }

    /// Deliver `signal` to the process if it is still running
    pub fn signal(&mut self, signal: Signal) -> Result<()> {
        if self.poll()?.is_some() {
            return Ok(());
        }
        kill(self.pid, signal).map_err(|e| {
            ShellrunError::Process(format!("Failed to send {}: {}", signal.as_str(), e))
        })
    }

    /// SIGKILL the process and reap it
    pub fn kill(&mut self) -> Result<ExitStatus> {
        self.signal(Signal::SIGKILL)?;
        self.wait()
    }

    /// Write all of `data` to the process's stdin
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ShellrunError::Process("stdin is closed".to_string()))?;
        stdin
            .write_all(data)
            .and_then(|_| stdin.flush())
            .map_err(|e| {
                ShellrunError::Process(format!("write to pid {} failed: {}", self.pid, e))
            })
    }

    pub fn sendline(&mut self, data: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(data.len() + 1);
        line.extend_from_slice(data);
        line.push(b'\n');
        self.send(&line)
    }

    /// Close stdin so the process reads end of file
    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    /// Pull one chunk into the buffers; false once output is closed
    fn fill(&mut self, deadline: Option<Instant>) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }

        let chunk = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    // Expired deadline still hands out what is already queued.
                    match self.stream.try_recv() {
                        Ok(Some(chunk)) => Some(chunk),
                        Ok(None) => return Err(ShellrunError::Timeout),
                        Err(_) => None,
                    }
                } else {
                    self.stream.recv_timeout(remaining)?
                }
            }
            None => self.stream.recv(),
        };

        match chunk {
            Some(StreamChunk::Stdout(data)) => self.stdout_buf.extend_from_slice(&data),
            Some(StreamChunk::Stderr(data)) => self.stderr_buf.extend_from_slice(&data),
            None => self.eof = true,
        }
        Ok(!self.eof)
    }

    /// Buffer whatever output is pending without blocking
    fn drain_pending(&mut self) {
        while !self.eof {
            match self.stream.try_recv() {
                Ok(Some(StreamChunk::Stdout(data))) => self.stdout_buf.extend_from_slice(&data),
                Ok(Some(StreamChunk::Stderr(data))) => self.stderr_buf.extend_from_slice(&data),
                Ok(None) => break,
                Err(_) => self.eof = true,
            }
        }
    }

    /// Receive available stdout data.
    ///
    /// Blocks until at least one byte arrives, the output closes (returns an
    /// empty vector) or `timeout` elapses.
    pub fn recv(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        while self.stdout_buf.is_empty() {
            if !self.fill(deadline)? {
                break;
            }
        }
        self.drain_pending();
        Ok(std::mem::take(&mut self.stdout_buf))
    }

    /// Receive stdout up to and including `delim`
    pub fn recv_until(&mut self, delim: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>> {
        if delim.is_empty() {
            return Ok(Vec::new());
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(pos) = find(&self.stdout_buf, delim) {
                let rest = self.stdout_buf.split_off(pos + delim.len());
                return Ok(std::mem::replace(&mut self.stdout_buf, rest));
            }
            if !self.fill(deadline)? {
                return Err(ShellrunError::Process(format!(
                    "output of pid {} closed before delimiter",
                    self.pid
                )));
            }
        }
    }

    pub fn recv_line(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        self.recv_until(b"\n", timeout)
    }

    /// Receive stdout until the process closes it
    pub fn recv_all(&mut self) -> Result<Vec<u8>> {
        while self.fill(None)? {}
        Ok(std::mem::take(&mut self.stdout_buf))
    }

    /// Everything the process has written to stderr so far
    pub fn stderr(&mut self) -> &[u8] {
        self.drain_pending();
        &self.stderr_buf
    }

    /// Relay the caller's stdin to the process and its output to ours until
    /// the process closes its output, then wait for it.
    pub fn interactive(&mut self) -> Result<ExitStatus> {
        if let Some(mut child_stdin) = self.stdin.take() {
            // Stays blocked on our stdin after the child exits; it is
            // abandoned rather than joined.
            thread::Builder::new()
                .name("tube-stdin".to_string())
                .spawn(move || {
                    let _ = io::copy(&mut io::stdin().lock(), &mut child_stdin);
                })?;
        }

        let mut out = io::stdout();
        let mut err = io::stderr();
        out.write_all(&std::mem::take(&mut self.stdout_buf))?;
        err.write_all(&std::mem::take(&mut self.stderr_buf))?;
        out.flush()?;

        while !self.eof {
            match self.stream.recv() {
                Some(StreamChunk::Stdout(data)) => {
                    out.write_all(&data)?;
                    out.flush()?;
                }
                Some(StreamChunk::Stderr(data)) => err.write_all(&data)?,
                None => self.eof = true,
            }
        }

        self.wait()
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.status.is_none()
            && let Err(e) = self.kill()
        {
            warn!("failed to reap pid {}: {}", self.pid, e);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
