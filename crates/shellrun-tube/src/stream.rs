//! Stream handling for process output

use std::io::Read;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread;
use std::time::Duration;

use log::trace;
use shellrun_core::{Result, ShellrunError};

const READ_CHUNK: usize = 4096;

/// A chunk of process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Data from stdout
    Stdout(Vec<u8>),
    /// Data from stderr
    Stderr(Vec<u8>),
}

/// Receiving side of the output readers.
///
/// The channel disconnects once every reader has hit end of file, which is
/// how callers observe that the child closed its output.
pub struct ProcessStream {
    receiver: Receiver<StreamChunk>,
}

impl ProcessStream {
    /// Create new process stream handler
    pub fn new() -> (Sender<StreamChunk>, Self) {
        let (tx, rx) = channel();
        (tx, ProcessStream { receiver: rx })
    }

    /// Block until the next chunk; `None` once all output is closed
    pub fn recv(&self) -> Option<StreamChunk> {
        self.receiver.recv().ok()
    }

    /// Wait up to `timeout` for the next chunk
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<StreamChunk>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Err(ShellrunError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    /// Try to receive next chunk without blocking.
    ///
    /// `Ok(None)` means nothing is pending; `Err(Disconnected)` means the
    /// output is closed.
    pub fn try_recv(&self) -> std::result::Result<Option<StreamChunk>, TryRecvError> {
        match self.receiver.try_recv() {
            Ok(chunk) => Ok(Some(chunk)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Spawn a reader thread that forwards everything read from `reader`
pub fn spawn_reader<R>(
    mut reader: R,
    is_stderr: bool,
    tx: Sender<StreamChunk>,
) -> Result<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let name = if is_stderr { "tube-stderr" } else { "tube-stdout" };
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let data = buf[..n].to_vec();
                        let chunk = if is_stderr {
                            StreamChunk::Stderr(data)
                        } else {
                            StreamChunk::Stdout(data)
                        };

                        if tx.send(chunk).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        trace!("{} reader stopped: {}", name, e);
                        break;
                    }
                }
            }
        })?;

    Ok(handle)
}
