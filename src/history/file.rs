use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use super::HistoryStore;
use crate::error::HistoryError;
use crate::HistoryRecord;

/// Size based rotation settings for the history log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the active file reaches this many bytes. `None` disables
    /// rotation.
    pub max_bytes: Option<u64>,
    /// Number of backups kept (`<path>.1` is the newest).
    pub keep: usize,
    /// Gzip each backup as it is created (`<path>.1.gz`).
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: None,
            keep: 1,
            compress: false,
        }
    }
}

/// Append-only line writer with size based rotation.
pub struct RotatingWriter {
    path: PathBuf,
    file: fs::File,
    policy: RotationPolicy,
    fsync: bool,
    // Active file ends in an unterminated fragment.
    torn_tail: bool,
}

impl RotatingWriter {
    pub fn open(path: &Path, policy: RotationPolicy, fsync: bool) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("directory {} does not exist", parent.display()),
                ));
            }
        }
        let file = open_append(path)?;
        let torn_tail = ends_without_newline(path)?;
        if torn_tail {
            tracing::warn!(path=%path.display(), "history file ends in a partial line; next record starts a new line");
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            policy,
            fsync,
            torn_tail,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Write one line. The line lands in a single file; rotation only ever
    /// happens between lines. A failed write is truncated away so the file
    /// never keeps a partial or unacknowledged record.
    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.rotate_if_needed()?;
        let mut buf = Vec::with_capacity(line.len() + 2);
        if self.torn_tail {
            buf.push(b'\n');
        }
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let prev_len = self.file.metadata()?.len();
        if let Err(err) = self.append(&buf) {
            match self.file.set_len(prev_len) {
                Ok(()) => tracing::warn!(path=%self.path.display(), error=%err, "history write failed; rolled back"),
                Err(trunc) => {
                    self.torn_tail = true;
                    tracing::error!(path=%self.path.display(), error=%err, truncate_error=%trunc, "history write failed and could not be rolled back");
                }
            }
            return Err(err);
        }
        self.torn_tail = false;
        Ok(())
    }

    fn append(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.file.write_all(buf)?;
        self.file.flush()?;
        if self.fsync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn current_size(&self) -> Option<u64> {
        self.path.metadata().ok().map(|m| m.len())
    }

    /// Path of backup `idx` (1 = newest), plain and compressed.
    pub fn backup_paths(&self, idx: usize) -> (PathBuf, PathBuf) {
        (
            with_suffix(&self.path, &format!(".{}", idx)),
            with_suffix(&self.path, &format!(".{}.gz", idx)),
        )
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        let Some(limit) = self.policy.max_bytes else {
            return Ok(());
        };
        if self.policy.keep == 0 || self.current_size().unwrap_or(0) < limit {
            return Ok(());
        }
        self.rotate()
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        let keep = self.policy.keep;
        let (oldest_plain, oldest_gz) = self.backup_paths(keep);
        remove_if_exists(&oldest_plain)?;
        remove_if_exists(&oldest_gz)?;
        for idx in (1..keep).rev() {
            let (plain, gz) = self.backup_paths(idx);
            let (next_plain, next_gz) = self.backup_paths(idx + 1);
            if plain.exists() {
                fs::rename(&plain, &next_plain)?;
            }
            if gz.exists() {
                fs::rename(&gz, &next_gz)?;
            }
        }
        let (newest_plain, newest_gz) = self.backup_paths(1);
        fs::rename(&self.path, &newest_plain)?;
        self.file = open_append(&self.path)?;
        self.torn_tail = false;
        tracing::info!(path=%self.path.display(), keep, "rotated history file");

        if self.policy.compress {
            if let Err(e) = compress_file(&newest_plain, &newest_gz) {
                tracing::warn!(path=%newest_plain.display(), error=%e, "failed to compress history backup; keeping it uncompressed");
                let _ = fs::remove_file(&newest_gz);
            }
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().create(true).append(true).open(path)
}

fn ends_without_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn compress_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    let data = fs::read(src)?;
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&data)?;
    let buf = gz.finish()?;
    fs::write(dst, buf)?;
    fs::remove_file(src)
}

/// Durable history store backed by a newline-delimited JSON file.
///
/// Each record is one line; decimal fields are written as strings so they
/// read back exactly. Appends are serialized through a mutex and executed
/// on the blocking thread pool.
pub struct FileHistoryStore {
    writer: Arc<Mutex<RotatingWriter>>,
}

impl FileHistoryStore {
    pub fn open(path: &Path, policy: RotationPolicy, fsync: bool) -> std::io::Result<Self> {
        let writer = RotatingWriter::open(path, policy, fsync)?;
        tracing::info!(path=%path.display(), "opened history file");
        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    /// Read every record from the active file and all backups, newest file
    /// first.
    pub async fn scan(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || {
            let guard = writer
                .lock()
                .map_err(|_| HistoryError::Unavailable("history writer lock poisoned".into()))?;
            read_all(&guard)
        })
        .await
        .map_err(|e| HistoryError::Unavailable(e.to_string()))?
    }
}

fn read_all(writer: &RotatingWriter) -> Result<Vec<HistoryRecord>, HistoryError> {
    let mut records = Vec::new();
    read_lines(fs::File::open(writer.path())?, &mut records)?;
    for idx in 1..=writer.policy().keep {
        let (plain, gz) = writer.backup_paths(idx);
        if plain.exists() {
            read_lines(fs::File::open(&plain)?, &mut records)?;
        }
        if gz.exists() {
            read_lines(GzDecoder::new(fs::File::open(&gz)?), &mut records)?;
        }
    }
    Ok(records)
}

fn read_lines<R: Read>(source: R, out: &mut Vec<HistoryRecord>) -> Result<(), HistoryError> {
    for line in BufReader::new(source).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryRecord>(&line) {
            Ok(record) => out.push(record),
            Err(e) => tracing::warn!(error=%e, "skipping unreadable history line"),
        }
    }
    Ok(())
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn put(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let line = serde_json::to_string(record)?;
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || {
            let mut guard = writer
                .lock()
                .map_err(|_| HistoryError::Unavailable("history writer lock poisoned".into()))?;
            guard.write_line(&line).map_err(HistoryError::from)
        })
        .await
        .map_err(|e| HistoryError::Unavailable(e.to_string()))?
    }

    async fn get(&self, id: &Uuid) -> Result<Option<HistoryRecord>, HistoryError> {
        let records = self.scan().await?;
        Ok(records.into_iter().find(|r| r.id == *id))
    }
}
