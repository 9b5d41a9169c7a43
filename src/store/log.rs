//! Append-only log store
//!
//! Every committed batch is appended as one frame:
//!
//! ```text
//! +------------------+
//! | Body Length      | (u32 LE)
//! +------------------+
//! | Length Checksum  | (u32 LE, CRC-32 of the length bytes)
//! +------------------+
//! | Body Checksum    | (u32 LE, CRC-32 of body)
//! +------------------+
//! | Body             | ops, each:
//! |                  |   0x01 klen(u32 LE) key vlen(u32 LE) value   put
//! |                  |   0x02 klen(u32 LE) key                      delete
//! +------------------+
//! ```
//!
//! The whole file is replayed into a `BTreeMap` on open. A final frame that
//! is cut short or fails its body checksum is what a crash mid-append leaves
//! behind; it is dropped and the file truncated to the last complete frame.
//! A length that fails its own checksum, or a bad frame followed by more
//! data, is corruption and fails the open.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use super::memory::{apply, count, scan};
use super::{Batch, BatchOp, KvIter, Store, StoreError, StoreResult};

const HEADER_LEN: usize = 12;
const OP_PUT: u8 = 0x01;
const OP_DELETE: u8 = 0x02;

struct Writer {
    file: File,
    len: u64,
}

/// Durable store kept in a single log file
pub struct LogStore {
    path: PathBuf,
    sync_writes: bool,
    writer: Mutex<Writer>,
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
    failed: AtomicBool,
    read_only: bool,
}

enum Frame {
    Complete { ops: Vec<BatchOp>, len: usize },
    Torn(String),
    Corrupt(String),
}

impl LogStore {
    /// Open or create the log at `path`, syncing every commit to disk
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, true)
    }

    /// Open or create the log at `path`
    ///
    /// With `sync_writes` off, commits reach the OS but not necessarily the
    /// disk; a crash can lose recent batches, never part of one.
    pub fn open_with(path: impl AsRef<Path>, sync_writes: bool) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        Self::replay(path, file, sync_writes, false)
    }

    /// Open an existing log without modifying it
    ///
    /// An incomplete final frame is skipped but left on disk. Writes fail
    /// with `ReadOnly`.
    pub fn open_read_only(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).open(&path)?;
        Self::replay(path, file, false, true)
    }

    fn replay(path: PathBuf, file: File, sync_writes: bool, read_only: bool) -> StoreResult<Self> {
        let data = fs::read(&path)?;

        let mut map = BTreeMap::new();
        let mut offset = 0usize;
        let mut frames = 0usize;
        while offset < data.len() {
            match decode_frame(&data[offset..]) {
                Frame::Complete { ops, len } => {
                    apply(&mut map, ops);
                    offset += len;
                    frames += 1;
                }
                Frame::Torn(reason) if read_only => {
                    tracing::warn!(
                        path = %path.display(),
                        offset,
                        ignored = data.len() - offset,
                        "Ignoring incomplete final frame: {}",
                        reason
                    );
                    break;
                }
                Frame::Torn(reason) => {
                    tracing::warn!(
                        path = %path.display(),
                        offset,
                        dropped = data.len() - offset,
                        "Discarding incomplete final frame: {}",
                        reason
                    );
                    file.set_len(offset as u64)?;
                    file.sync_all()?;
                    break;
                }
                Frame::Corrupt(reason) => {
                    return Err(StoreError::Corruption {
                        offset: offset as u64,
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            frames,
            keys = map.len(),
            read_only,
            "Replayed log store"
        );

        Ok(Self {
            path,
            sync_writes,
            writer: Mutex::new(Writer {
                file,
                len: offset as u64,
            }),
            map: RwLock::new(map),
            closed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            read_only,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of committed frames
    pub fn log_len(&self) -> u64 {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner).len
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if self.failed.load(Ordering::Acquire) {
            return Err(StoreError::Failed);
        }
        Ok(())
    }

    /// Error for an append that failed after `write`, given how undoing the
    /// partial frame went
    ///
    /// When the rollback fails too, the file may end in a partial frame and
    /// the store refuses all further operations.
    fn abort_append(&self, write: std::io::Error, rollback: std::io::Result<()>) -> StoreError {
        match rollback {
            Ok(()) => StoreError::Io(write),
            Err(rollback) => {
                self.failed.store(true, Ordering::Release);
                tracing::error!(
                    path = %self.path.display(),
                    %write,
                    %rollback,
                    "Could not remove partial frame; log store stopped"
                );
                StoreError::RollbackFailed { write, rollback }
            }
        }
    }
}

impl Store for LogStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn write_batch(&self, batch: Batch) -> StoreResult<()> {
        self.check_open()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        if batch.is_empty() {
            return Ok(());
        }

        let frame = encode_frame(batch.ops())?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // A writer queued behind a failed rollback must not append either.
        if self.failed.load(Ordering::Acquire) {
            return Err(StoreError::Failed);
        }

        let committed = writer.len;
        if let Err(write) = append_frame(&mut writer.file, &frame, self.sync_writes) {
            // A partial frame must not stay in front of later appends.
            let rollback = writer.file.set_len(committed);
            return Err(self.abort_append(write, rollback));
        }
        writer.len += frame.len() as u64;

        // Applied while the writer lock is held so map order matches log order.
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut map, batch.into_ops());
        Ok(())
    }

    fn iterate(&self, prefix: &[u8]) -> StoreResult<KvIter<'_>> {
        self.iterate_from(prefix, prefix)
    }

    fn iterate_from(&self, prefix: &[u8], start: &[u8]) -> StoreResult<KvIter<'_>> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let entries = scan(&map, prefix, start);
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn count_from(&self, prefix: &[u8], start: &[u8]) -> StoreResult<usize> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(count(&map, prefix, start))
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if !self.read_only {
            let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            writer.file.sync_all()?;
        }
        tracing::debug!(path = %self.path.display(), "Closed log store");
        Ok(())
    }
}

fn append_frame(file: &mut File, frame: &[u8], sync: bool) -> std::io::Result<()> {
    file.write_all(frame)?;
    file.flush()?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

fn encode_frame(ops: &[BatchOp]) -> StoreResult<Vec<u8>> {
    let mut body = Vec::new();
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                body.push(OP_PUT);
                put_bytes(&mut body, key)?;
                put_bytes(&mut body, value)?;
            }
            BatchOp::Delete { key } => {
                body.push(OP_DELETE);
                put_bytes(&mut body, key)?;
            }
        }
    }

    let body_len = u32::try_from(body.len()).map_err(|_| too_large(body.len()))?;
    let len_bytes = body_len.to_le_bytes();

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&len_bytes);
    frame.extend_from_slice(&crc32fast::hash(&len_bytes).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> StoreResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| too_large(bytes.len()))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn too_large(len: usize) -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{} bytes exceeds the frame size limit", len),
    ))
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn decode_frame(data: &[u8]) -> Frame {
    if data.len() < HEADER_LEN {
        return Frame::Torn(format!("{} header bytes", data.len()));
    }
    let (body_len, len_checksum, checksum) =
        match (read_u32(data, 0), read_u32(data, 4), read_u32(data, 8)) {
            (Some(len), Some(len_crc), Some(crc)) => (len, len_crc, crc),
            _ => return Frame::Torn("short header".to_string()),
        };

    // Nothing past a bad length can be located, so it is never a torn tail.
    if crc32fast::hash(&body_len.to_le_bytes()) != len_checksum {
        return Frame::Corrupt("frame length checksum mismatch".to_string());
    }

    let end = HEADER_LEN + body_len as usize;
    if end > data.len() {
        return Frame::Torn(format!(
            "frame needs {} bytes, {} remain",
            end,
            data.len()
        ));
    }

    let body = &data[HEADER_LEN..end];
    if crc32fast::hash(body) != checksum {
        let reason = "checksum mismatch".to_string();
        return if end == data.len() {
            Frame::Torn(reason)
        } else {
            Frame::Corrupt(reason)
        };
    }

    match decode_ops(body) {
        Ok(ops) => Frame::Complete { ops, len: end },
        Err(reason) => Frame::Corrupt(reason),
    }
}

fn decode_ops(body: &[u8]) -> Result<Vec<BatchOp>, String> {
    let mut ops = Vec::new();
    let mut at = 0usize;
    while at < body.len() {
        let tag = body[at];
        at += 1;
        let key = take_bytes(body, &mut at)?;
        match tag {
            OP_PUT => {
                let value = take_bytes(body, &mut at)?;
                ops.push(BatchOp::Put { key, value });
            }
            OP_DELETE => ops.push(BatchOp::Delete { key }),
            other => return Err(format!("unknown op tag {:#04x}", other)),
        }
    }
    Ok(ops)
}

fn take_bytes(body: &[u8], at: &mut usize) -> Result<Vec<u8>, String> {
    let len = read_u32(body, *at).ok_or_else(|| "truncated length".to_string())? as usize;
    *at += 4;
    let bytes = body
        .get(*at..*at + len)
        .ok_or_else(|| format!("length {} overruns frame", len))?;
    *at += len;
    Ok(bytes.to_vec())
}
