use crate::config::Config;
use crate::error::CollectorError;
use crate::events::WatchMessage;
use log::{debug, info, warn};
use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delay between attempts to enqueue a line while the detection loop is behind
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Timing and rotation behaviour of a tail
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Idle delay between polls when no new data is available
    pub poll_interval: Duration,
    /// Delay before retrying after a read error
    pub retry_delay: Duration,
    /// Reopen the file when it is replaced, rewind when it is truncated
    pub follow_rotation: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            retry_delay: Duration::from_secs(1),
            follow_rotation: true,
        }
    }
}

impl From<&Config> for TailOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            retry_delay: config.retry_delay(),
            follow_rotation: config.follow_rotation,
        }
    }
}

/// Identity of the file behind a path, used to notice rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn file_identity(metadata: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        dev: metadata.dev(),
        ino: metadata.ino(),
    })
}

#[cfg(not(unix))]
fn file_identity(_metadata: &Metadata) -> Option<FileIdentity> {
    None
}

/// Live view of the lines appended to a growing file
///
/// Opening positions the reader at the current end of the file, so history is never
/// replayed. `poll_line` is the non-blocking suspension point: it returns a complete
/// line if one is available and `None` otherwise. Iterating blocks between polls with
/// a fixed idle delay and never ends.
///
/// # Example
///
/// ```rust,no_run
/// use pool_watcher::collectors::LogTail;
///
/// let tail = LogTail::open("/var/log/nginx/access.log").unwrap();
/// for line in tail {
///     println!("{}", line);
/// }
/// ```
pub struct LogTail {
    path: PathBuf,
    reader: BufReader<File>,
    /// Bytes consumed from the current file
    position: u64,
    identity: Option<FileIdentity>,
    /// Bytes of a line whose newline has not been written yet
    pending: Vec<u8>,
    options: TailOptions,
}

impl LogTail {
    /// Open `path` with default options and seek to its end
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::OpenFailed` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CollectorError> {
        Self::open_with(path, TailOptions::default())
    }

    /// Open `path` with explicit options and seek to its end
    pub fn open_with(path: impl AsRef<Path>, options: TailOptions) -> Result<Self, CollectorError> {
        let path = path.as_ref().to_path_buf();
        let open_failed = |source| CollectorError::OpenFailed {
            path: path.display().to_string(),
            source,
        };

        let file = File::open(&path).map_err(open_failed)?;
        let identity = file.metadata().map(|m| file_identity(&m)).map_err(open_failed)?;
        let mut reader = BufReader::new(file);
        let position = reader.seek(SeekFrom::End(0)).map_err(open_failed)?;

        debug!("Tailing {} from offset {}", path.display(), position);

        Ok(Self {
            path,
            reader,
            position,
            identity,
            pending: Vec::new(),
            options,
        })
    }

    /// Read the next complete line if one is available
    ///
    /// The returned line has trailing whitespace and the newline stripped. A partially
    /// written line is held back until its newline arrives.
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::IoError` on a read failure; the tail stays usable and the
    /// caller may retry.
    pub fn poll_line(&mut self) -> Result<Option<String>, CollectorError> {
        let before = self.pending.len();
        let result = self.reader.read_until(b'\n', &mut self.pending);
        self.position += (self.pending.len() - before) as u64;
        let read = result?;

        if self.pending.last() == Some(&b'\n') {
            let line = String::from_utf8_lossy(&self.pending).trim_end().to_string();
            self.pending.clear();
            return Ok(Some(line));
        }

        if read == 0 && self.options.follow_rotation {
            self.check_rotation()?;
        }

        Ok(None)
    }

    /// Path being tailed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reopen or rewind if the file behind the path was replaced or truncated
    fn check_rotation(&mut self) -> Result<(), CollectorError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            // Rotated away and not recreated yet
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let identity = file_identity(&metadata);
        if identity.is_some() && identity != self.identity {
            info!("Log file {} was replaced, reopening", self.path.display());
            let file = File::open(&self.path)?;
            self.identity = file_identity(&file.metadata()?);
            self.reader = BufReader::new(file);
            self.position = 0;
            self.pending.clear();
        } else if metadata.len() < self.position {
            info!(
                "Log file {} was truncated ({} < {}), reading from start",
                self.path.display(),
                metadata.len(),
                self.position
            );
            self.reader.seek(SeekFrom::Start(0))?;
            self.position = 0;
            self.pending.clear();
        }

        Ok(())
    }
}

impl Iterator for LogTail {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            match self.poll_line() {
                Ok(Some(line)) => return Some(line),
                Ok(None) => thread::sleep(self.options.poll_interval),
                Err(e) => {
                    warn!("Error reading {}: {}", self.path.display(), e);
                    thread::sleep(self.options.retry_delay);
                }
            }
        }
    }
}

/// Background worker feeding new log lines into the detection loop
///
/// Owns a `LogTail` on a dedicated thread and pushes every line onto a bounded queue.
/// The file is opened on the calling thread so that an unreadable log fails `start`
/// immediately. Read errors after that are retried.
pub struct LogTailer {
    /// Log file to follow
    path: PathBuf,
    /// Tail timing and rotation behaviour
    options: TailOptions,
    /// Queue consumed by the detection loop
    output_channel: SyncSender<WatchMessage>,
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    /// Cleared to ask the thread to stop
    running: Arc<AtomicBool>,
}

impl LogTailer {
    /// Create a tailer for `path` that sends lines to `channel`
    pub fn new(path: impl Into<PathBuf>, options: TailOptions, channel: SyncSender<WatchMessage>) -> Self {
        Self {
            path: path.into(),
            options,
            output_channel: channel,
            thread_handle: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the log and start the background thread
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::OpenFailed` if the log cannot be opened, which is fatal
    /// for the watcher, and `CollectorError::AlreadyRunning` on a second start.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.is_running() {
            return Err(CollectorError::AlreadyRunning);
        }

        let tail = LogTail::open_with(&self.path, self.options.clone())?;
        let channel = self.output_channel.clone();
        let running = Arc::clone(&self.running);
        self.running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("log-tailer".to_string())
            .spawn(move || Self::tailer_thread(tail, channel, running))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CollectorError::IoError(e)
            })?;

        self.thread_handle = Some(handle);
        info!("LogTailer started on {}", self.path.display());
        Ok(())
    }

    /// Stop the background thread and wait for it to finish
    pub fn stop(&mut self) -> Result<(), CollectorError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| {
                CollectorError::ThreadJoin("tailer thread panicked".to_string())
            })?;
            info!("LogTailer stopped");
        }

        Ok(())
    }

    /// Check if the background thread is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Main tailer thread function
    fn tailer_thread(mut tail: LogTail, channel: SyncSender<WatchMessage>, running: Arc<AtomicBool>) {
        let poll_interval = tail.options.poll_interval;
        let retry_delay = tail.options.retry_delay;
        let mut consecutive_failures: u32 = 0;

        while running.load(Ordering::SeqCst) {
            match tail.poll_line() {
                Ok(Some(line)) => {
                    if consecutive_failures > 0 {
                        info!(
                            "Reading {} recovered after {} failures",
                            tail.path().display(),
                            consecutive_failures
                        );
                        consecutive_failures = 0;
                    }
                    if !Self::enqueue(&channel, WatchMessage::Line(line), &running) {
                        break;
                    }
                }
                Ok(None) => thread::sleep(poll_interval),
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Error reading {} (failure #{}), retrying in {:?}: {}",
                        tail.path().display(),
                        consecutive_failures,
                        retry_delay,
                        e
                    );
                    thread::sleep(retry_delay);
                }
            }
        }

        running.store(false, Ordering::SeqCst);
        debug!("Log tailer thread finished");
    }

    /// Push a message, waiting while the queue is full
    ///
    /// Returns `false` when the consumer is gone or the tailer is stopping.
    fn enqueue(
        channel: &SyncSender<WatchMessage>,
        mut message: WatchMessage,
        running: &AtomicBool,
    ) -> bool {
        loop {
            match channel.try_send(message) {
                Ok(()) => return true,
                Err(TrySendError::Full(returned)) => {
                    if !running.load(Ordering::SeqCst) {
                        return false;
                    }
                    message = returned;
                    thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Line queue closed, stopping tailer");
                    return false;
                }
            }
        }
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
