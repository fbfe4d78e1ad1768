//! Write-ahead log for the local store.
//!
//! Every committed transaction is appended as one record before it is applied
//! in memory, so a transaction is either fully on disk or absent.
//!
//! # Format
//!
//! ```text
//! header:  b"NSYNCWAL" | u32 LE format version
//! record:  u32 LE payload length | u32 LE crc32(payload) | payload
//! payload: MessagePack of WalRecord { version, collection, ops }
//! ```
//!
//! On open, records are replayed in order. A record cut short at the end of
//! the file (crash mid-append) is truncated away. A checksum mismatch on the
//! final record is treated the same way; a mismatch with more data after it
//! is corruption.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use notesync_core::{Collection, SyncError, SyncResult};
use serde::{Deserialize, Serialize};

use crate::sharded::WriteOp;

/// File magic.
const MAGIC: &[u8; 8] = b"NSYNCWAL";
/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;
/// Header length in bytes.
const HEADER_LEN: u64 = 12;
/// Frame prefix length (len + crc).
const FRAME_LEN: u64 = 8;
/// Refuse single records larger than this.
const MAX_RECORD_LEN: u32 = 256 * 1024 * 1024;

/// Name of the log file inside the store directory.
pub const WAL_FILE: &str = "store.wal";

/// One committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Commit version assigned by the store.
    pub version: u64,
    /// Collection the transaction wrote to.
    pub collection: Collection,
    /// Operations, in commit order.
    pub ops: Vec<WriteOp>,
}

/// Append handle on the log file.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: File,
    sync: bool,
    records: u64,
}

impl Wal {
    /// Open (or create) the log in `dir` and return it with every intact record.
    pub fn open(dir: &Path, sync: bool) -> SyncResult<(Self, Vec<WalRecord>)> {
        fs::create_dir_all(dir)
            .map_err(|e| SyncError::io(format!("creating {}", dir.display()), e))?;
        let path = dir.join(WAL_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SyncError::io(format!("opening {}", path.display()), e))?;

        let len = file
            .metadata()
            .map_err(|e| SyncError::io("reading wal metadata", e))?
            .len();

        let records = if len == 0 {
            write_header(&mut file)?;
            Vec::new()
        } else {
            let (records, good_len) = read_records(&mut file, len)?;
            if good_len < len {
                tracing::warn!(
                    target: "notesync::store",
                    path = %path.display(),
                    dropped_bytes = len - good_len,
                    "Truncating torn tail of write-ahead log"
                );
                file.set_len(good_len)
                    .map_err(|e| SyncError::io("truncating wal tail", e))?;
            }
            records
        };

        file.seek(SeekFrom::End(0))
            .map_err(|e| SyncError::io("seeking wal end", e))?;

        let count = records.len() as u64;
        Ok((
            Self {
                path,
                file,
                sync,
                records: count,
            },
            records,
        ))
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended since the log was last rewritten.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Append one record.
    pub fn append(&mut self, record: &WalRecord) -> SyncResult<()> {
        let frame = encode_frame(record)?;
        self.file
            .write_all(&frame)
            .map_err(|e| SyncError::io("appending wal record", e))?;
        if self.sync {
            self.file
                .sync_data()
                .map_err(|e| SyncError::io("syncing wal", e))?;
        }
        self.records += 1;
        Ok(())
    }

    /// Replace the log with `records` (a compacted image of the store).
    ///
    /// Written to a temporary file first and renamed over the log, so a crash
    /// leaves either the old or the new log.
    pub fn rewrite(&mut self, records: &[WalRecord]) -> SyncResult<()> {
        let tmp = self.path.with_extension("wal.tmp");
        {
            let mut out =
                File::create(&tmp).map_err(|e| SyncError::io("creating compacted wal", e))?;
            write_header(&mut out)?;
            for record in records {
                out.write_all(&encode_frame(record)?)
                    .map_err(|e| SyncError::io("writing compacted wal", e))?;
            }
            out.sync_all()
                .map_err(|e| SyncError::io("syncing compacted wal", e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| SyncError::io("installing compacted wal", e))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| SyncError::io("reopening wal", e))?;
        file.seek(SeekFrom::End(0))
            .map_err(|e| SyncError::io("seeking wal end", e))?;
        self.file = file;
        self.records = records.len() as u64;
        Ok(())
    }
}

fn write_header(file: &mut File) -> SyncResult<()> {
    file.write_all(MAGIC)
        .and_then(|_| file.write_u32::<LittleEndian>(FORMAT_VERSION))
        .and_then(|_| file.sync_data())
        .map_err(|e| SyncError::io("writing wal header", e))
}

fn encode_frame(record: &WalRecord) -> SyncResult<Vec<u8>> {
    let payload = rmp_serde::to_vec(record).map_err(|e| SyncError::serialization(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_RECORD_LEN)
        .ok_or_else(|| SyncError::storage("wal record too large"))?;
    let mut frame = Vec::with_capacity(FRAME_LEN as usize + payload.len());
    frame
        .write_u32::<LittleEndian>(len)
        .and_then(|_| frame.write_u32::<LittleEndian>(crc32fast::hash(&payload)))
        .map_err(|e| SyncError::io("encoding wal frame", e))?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Read every intact record; returns them with the length of the valid prefix.
fn read_records(file: &mut File, file_len: u64) -> SyncResult<(Vec<WalRecord>, u64)> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| SyncError::io("seeking wal start", e))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|_| SyncError::corruption("wal header truncated"))?;
    if &magic != MAGIC {
        return Err(SyncError::corruption("wal magic mismatch"));
    }
    let version = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| SyncError::corruption("wal header truncated"))?;
    if version != FORMAT_VERSION {
        return Err(SyncError::corruption(format!(
            "unsupported wal format version {version}"
        )));
    }

    let mut records = Vec::new();
    let mut offset = HEADER_LEN;
    loop {
        if offset == file_len {
            break;
        }
        let len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SyncError::io("reading wal frame", e)),
        };
        let crc = match reader.read_u32::<LittleEndian>() {
            Ok(crc) => crc,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(SyncError::io("reading wal frame", e)),
        };
        let end = offset + FRAME_LEN + u64::from(len);
        if len > MAX_RECORD_LEN || end > file_len {
            // Torn append: the length prefix made it to disk, the payload did not.
            break;
        }
        let mut payload = vec![0u8; len as usize];
        reader
            .read_exact(&mut payload)
            .map_err(|e| SyncError::io("reading wal payload", e))?;
        if crc32fast::hash(&payload) != crc {
            if end == file_len {
                break;
            }
            return Err(SyncError::corruption(format!(
                "wal checksum mismatch at offset {offset}"
            )));
        }
        let record: WalRecord = rmp_serde::from_slice(&payload)
            .map_err(|e| SyncError::corruption(format!("undecodable wal record: {e}")))?;
        records.push(record);
        offset = end;
    }
    Ok((records, offset))
}
