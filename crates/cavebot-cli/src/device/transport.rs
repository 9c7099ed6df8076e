//! Serial transport: line-oriented byte stream to the device.
//!
//! The device node only offers blocking reads/writes, so the transport
//! runs a reader thread and a writer thread and bridges them to the async
//! world with tokio channels. The reader splits the stream into trimmed
//! lines; framing above this layer is one command or acknowledgement per
//! line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cavebot_core::error::AgentError;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Transport-level failures. Everything above treats these as "the device
/// is gone", distinct from an unacknowledged command.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("device channel closed")]
    Closed,
}

/// A line-oriented, timeout-aware byte channel to the device.
///
/// `recv_line` returning `Ok(None)` means the timeout elapsed with no
/// line available; `Err(Closed)` means the device went away.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_line(&self, line: &str) -> Result<(), LinkError>;
    async fn recv_line(&self, timeout: Duration) -> Result<Option<String>, LinkError>;
    /// Drop any buffered input lines (stale acknowledgements).
    async fn clear_input(&self);
    async fn shutdown(&self);
}

/// Channel capacity for both directions.
const CHANNEL_CAPACITY: usize = 64;

/// Serial device transport over a tty node.
pub struct SerialTransport {
    write_tx: mpsc::Sender<String>,
    /// Wrapped in a Mutex for interior mutability so recv can take &self.
    read_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    shutdown: Arc<AtomicBool>,
    reader_thread: Option<std::thread::JoinHandle<()>>,
    writer_thread: Option<std::thread::JoinHandle<()>>,
}

impl SerialTransport {
    /// Open the device node, switch it to raw 8N1 mode at the requested
    /// baud rate, and start the I/O threads.
    pub fn open(port: &str, baud: u32) -> Result<Self, AgentError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(port)
            .map_err(|e| AgentError::device_unavailable(port, e))?;

        configure_raw(&file, baud).map_err(|e| AgentError::device_unavailable(port, e))?;

        let reader = file
            .try_clone()
            .map_err(|e| AgentError::device_unavailable(port, e))?;
        let writer = file;

        let shutdown = Arc::new(AtomicBool::new(false));
        let (write_tx, write_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (read_tx, read_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

        let reader_shutdown = shutdown.clone();
        let reader_thread = std::thread::spawn(move || {
            Self::reader_loop(reader, read_tx, reader_shutdown);
        });

        let writer_thread = std::thread::spawn(move || {
            Self::writer_loop(writer, write_rx);
        });

        Ok(Self {
            write_tx,
            read_rx: tokio::sync::Mutex::new(read_rx),
            shutdown,
            reader_thread: Some(reader_thread),
            writer_thread: Some(writer_thread),
        })
    }

    /// Reader loop running in a background thread. Splits the stream into
    /// trimmed, non-empty lines.
    fn reader_loop(reader: impl Read, read_tx: mpsc::Sender<String>, shutdown: Arc<AtomicBool>) {
        let mut reader = BufReader::new(reader);
        loop {
            if shutdown.load(Ordering::SeqCst) {
                debug!("serial reader shutdown");
                break;
            }

            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    debug!("serial reader EOF");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    // Blocking send since we're in a thread.
                    if read_tx.blocking_send(trimmed.to_string()).is_err() {
                        debug!("serial read channel closed");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    // Line noise during device reset produces non-UTF8
                    // garbage; skip the line and keep reading.
                    debug!("serial reader skipped undecodable bytes: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("serial read error: {}", e);
                    break;
                }
            }
        }
    }

    /// Writer loop running in a background thread.
    fn writer_loop(mut writer: File, mut write_rx: mpsc::Receiver<String>) {
        while let Some(line) = write_rx.blocking_recv() {
            if let Err(e) = writer.write_all(line.as_bytes()) {
                error!("serial write error: {}", e);
                break;
            }
            if let Err(e) = writer.flush() {
                error!("serial flush error: {}", e);
                break;
            }
        }
        debug!("serial writer exiting");
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send_line(&self, line: &str) -> Result<(), LinkError> {
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        self.write_tx
            .send(framed)
            .await
            .map_err(|_| LinkError::Closed)
    }

    async fn recv_line(&self, timeout: Duration) -> Result<Option<String>, LinkError> {
        let mut rx = self.read_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(line)) => Ok(Some(line)),
            Ok(None) => Err(LinkError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn clear_input(&self) {
        let mut rx = self.read_rx.lock().await;
        while rx.try_recv().is_ok() {}
    }

    async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.read_rx.lock().await.close();
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // The reader may be parked in a blocking read on the tty, which
        // cannot be interrupted without closing the descriptor; the thread
        // exits when the device produces its next byte or disappears. The
        // handles are kept so the threads are not detached, but we do not
        // join them here.
        if let Some(ref handle) = self.reader_thread {
            if !handle.is_finished() {
                debug!("serial reader thread still running on drop");
            }
        }
        if let Some(ref handle) = self.writer_thread {
            if !handle.is_finished() {
                debug!("serial writer thread still running on drop");
            }
        }
    }
}

/// Put the tty into raw 8N1 mode at the given baud rate and flush both
/// directions. Raw mode disables echo and line editing so the device sees
/// frames byte-for-byte.
fn configure_raw(file: &File, baud: u32) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    let speed = baud_constant(baud);

    // SAFETY: fd is a valid open descriptor for the lifetime of `file`,
    // and termios is a plain C struct initialized by tcgetattr.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        libc::cfmakeraw(&mut tio);
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);

        // 8N1, receiver on, modem control lines ignored.
        tio.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
        tio.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;

        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::tcflush(fd, libc::TCIOFLUSH);
    }
    Ok(())
}

/// Map a numeric baud rate to its termios constant. Unlisted rates fall
/// back to 115200 with a warning rather than failing the connection.
fn baud_constant(baud: u32) -> libc::speed_t {
    match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        other => {
            warn!("unsupported baud rate {}, falling back to 115200", other);
            libc::B115200
        }
    }
}
