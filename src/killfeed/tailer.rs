//! Follows the newest server log file line by line.
//!
//! A fresh tailer starts at the end of the newest file so history is not
//! replayed. Once attached, it switches to a newer file (from its start)
//! when the server rotates logs, and re-attaches from the start when the
//! current file is truncated or deleted.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

use crate::logs;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to list log files in {}: {reason}", dir.display())]
    Discover { dir: PathBuf, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the tailer reads and how long it waits.
#[derive(Debug, Clone)]
pub struct TailerConfig {
    pub dir: PathBuf,
    pub extension: String,
    /// Sleep between reads once the end of the file is reached.
    pub poll_interval: Duration,
    /// Sleep between directory scans while no log file exists.
    pub no_file_backoff: Duration,
}

/// The file being followed and the byte offset of the next unread line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCursor {
    pub path: PathBuf,
    pub offset: u64,
}

struct OpenLog {
    cursor: LogCursor,
    reader: BufReader<File>,
    /// Bytes of a line whose terminator has not been written yet.
    pending: Vec<u8>,
}

/// Where the next open positions itself.
#[derive(Debug, Clone)]
enum OpenFrom {
    End,
    Start,
    /// Resume at a known offset if the newest file is still this one.
    Cursor(LogCursor),
}

pub struct LogTailer {
    config: TailerConfig,
    current: Option<OpenLog>,
    open_from: OpenFrom,
}

impl LogTailer {
    pub fn new(config: TailerConfig) -> Self {
        Self {
            config,
            current: None,
            open_from: OpenFrom::End,
        }
    }

    /// A tailer that reads the first file it finds from the start.
    pub fn from_start(config: TailerConfig) -> Self {
        Self {
            config,
            current: None,
            open_from: OpenFrom::Start,
        }
    }

    /// A tailer that continues at `cursor` instead of the end of the file.
    /// Falls back to the start of the newest file if that is another file.
    pub fn resume(config: TailerConfig, cursor: LogCursor) -> Self {
        Self {
            config,
            current: None,
            open_from: OpenFrom::Cursor(cursor),
        }
    }

    pub fn cursor(&self) -> Option<&LogCursor> {
        self.current.as_ref().map(|log| &log.cursor)
    }

    /// Drop the current file. The next read re-selects the newest file and
    /// reads it from the start.
    pub fn reset(&mut self) {
        self.current = None;
        self.open_from = OpenFrom::Start;
    }

    /// Drop the current file after a read error. The next read reopens the
    /// newest file at the last delivered offset when it is the same file,
    /// so nothing already yielded is read again.
    pub fn recover(&mut self) {
        if let Some(log) = self.current.take() {
            self.open_from = OpenFrom::Cursor(log.cursor);
        }
    }

    /// Wait for and return the next complete line, without its terminator.
    ///
    /// Cancel safe: a partially read line is kept and completed by the next
    /// call.
    pub async fn next_line(&mut self) -> Result<String, TailError> {
        loop {
            let Some(log) = self.current.as_mut() else {
                let opened = self.open_newest().await?;
                self.current = Some(opened);
                continue;
            };

            let read = log
                .reader
                .read_until(b'\n', &mut log.pending)
                .await
                .map_err(|source| TailError::Read {
                    path: log.cursor.path.clone(),
                    source,
                })?;

            if log.pending.last() == Some(&b'\n') {
                let bytes = std::mem::take(&mut log.pending);
                log.cursor.offset += bytes.len() as u64;
                return Ok(decode_line(&bytes));
            }

            if read == 0 {
                if self.check_rotation().await? {
                    continue;
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }

    /// Returns `true` when the current file was dropped because it was
    /// truncated, deleted or superseded by a newer file.
    async fn check_rotation(&mut self) -> Result<bool, TailError> {
        let Some(log) = self.current.as_ref() else {
            return Ok(true);
        };
        let path = log.cursor.path.clone();
        let consumed = log.cursor.offset + log.pending.len() as u64;

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.len() < consumed => {
                warn!(path = %path.display(), "Log file truncated, re-reading from the start");
                self.reset();
                return Ok(true);
            },
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Log file removed, re-selecting newest log");
                self.reset();
                return Ok(true);
            },
            Err(source) => return Err(TailError::Read { path, source }),
        }

        if let Some(newest) = self.newest().await?
            && newest != path
        {
            info!(from = %path.display(), to = %newest.display(), "Log rotated");
            self.reset();
            return Ok(true);
        }
        Ok(false)
    }

    async fn newest(&self) -> Result<Option<PathBuf>, TailError> {
        let dir = self.config.dir.clone();
        let extension = self.config.extension.clone();
        let found = tokio::task::spawn_blocking(move || logs::newest_log_file(&dir, &extension))
            .await
            .map_err(|e| TailError::Discover {
                dir: self.config.dir.clone(),
                reason: e.to_string(),
            })?;
        found.map_err(|e| TailError::Discover {
            dir: self.config.dir.clone(),
            reason: format!("{e:#}"),
        })
    }

    async fn open_newest(&mut self) -> Result<OpenLog, TailError> {
        let mut announced = false;
        let path = loop {
            if let Some(path) = self.newest().await? {
                break path;
            }
            if !announced {
                info!(dir = %self.config.dir.display(), "No log file found, waiting");
                announced = true;
            }
            tokio::time::sleep(self.config.no_file_backoff).await;
        };

        let from = match &self.open_from {
            OpenFrom::End => None,
            OpenFrom::Start => Some(0),
            OpenFrom::Cursor(cursor) if cursor.path == path => Some(cursor.offset),
            OpenFrom::Cursor(_) => Some(0),
        };
        let log = open_at(&path, from).await?;
        debug!(path = %path.display(), offset = log.cursor.offset, "Tailing log file");
        self.open_from = OpenFrom::Start;
        Ok(log)
    }
}

/// Open `path` at `offset`, or at its end when `offset` is `None`. An
/// offset past the end means the file was truncated meanwhile, so reading
/// starts over at 0.
async fn open_at(path: &Path, offset: Option<u64>) -> Result<OpenLog, TailError> {
    let read_err = |source| TailError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).await.map_err(read_err)?;
    let offset = match offset {
        None => file.seek(SeekFrom::End(0)).await.map_err(read_err)?,
        Some(offset) => {
            let len = file.metadata().await.map_err(read_err)?.len();
            let offset = if offset > len {
                warn!(path = %path.display(), offset, len, "Log file shrank, reading from the start");
                0
            } else {
                offset
            };
            file.seek(SeekFrom::Start(offset)).await.map_err(read_err)?
        },
    };
    Ok(OpenLog {
        cursor: LogCursor {
            path: path.to_path_buf(),
            offset,
        },
        reader: BufReader::new(file),
        pending: Vec::new(),
    })
}

fn decode_line(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    line.trim_end_matches(['\n', '\r']).to_string()
}
