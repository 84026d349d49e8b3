use crate::core::tasks::{PersistentTask, TaskId};
use crate::err::Result;
use crate::fs::fs_op::{fs_read_bytes_if_exists, fs_save_bytes_atomic};
use crate::global_var::LOGGER;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STORE_SUFFIX: &str = "tasks";
const FRAME_HEADER_LEN: usize = 4;

/// One stored task: its kind tag and encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub kind: String,
    pub payload: Vec<u8>,
}

impl TaskRecord {
    pub fn from_task(task: &dyn PersistentTask) -> Result<Self> {
        Ok(Self {
            kind: task.kind().to_string(),
            payload: task.encode()?,
        })
    }

    pub fn id(&self) -> TaskId {
        TaskId::from_parts(&self.kind, &self.payload)
    }
}

/// The per-profile task file.
///
/// The file has no header. It is a sequence of frames, each a little-endian
/// `u32` length followed by that many bytes of a bincode-encoded [`TaskRecord`].
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: Option<PathBuf>,
}

impl TaskStore {
    /// Store at `<misc_dir>/<profile>.tasks`. If the directory cannot be
    /// created the store persists nothing for this session.
    pub fn open<P: AsRef<Path>>(misc_dir: P, profile: &str) -> Self {
        let dir = misc_dir.as_ref();
        if let Err(e) = std::fs::create_dir_all(dir) {
            LOGGER.error(format!(
                "Cannot create task store directory {}: {}. Tasks will not be persisted",
                dir.display(),
                e
            ));
            return Self::detached();
        }
        Self {
            path: Some(dir.join(format!("{}.{}", profile, STORE_SUFFIX))),
        }
    }

    /// A store that never reads or writes anything.
    pub fn detached() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read every decodable record. Never fails: a missing file means no
    /// tasks, bad frames are skipped and logged.
    pub async fn load(&self) -> Vec<TaskRecord> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        match fs_read_bytes_if_exists(path).await {
            Ok(Some(bytes)) => decode_frames(&bytes),
            Ok(None) => {
                LOGGER.debug(format!("No task store at {}, first start", path.display()));
                Vec::new()
            }
            Err(e) => {
                LOGGER.error(format!(
                    "Unable to read task store {}: {:?}",
                    path.display(),
                    e
                ));
                Vec::new()
            }
        }
    }

    /// Replace the stored set with `records`, in order.
    pub async fn save(&self, records: &[TaskRecord]) -> Result<()> {
        let Some(path) = &self.path else {
            LOGGER.debug(format!(
                "Task store is detached, dropping {} tasks",
                records.len()
            ));
            return Ok(());
        };
        let bytes = encode_frames(records)?;
        fs_save_bytes_atomic(path, &bytes)
            .await
            .map_err(|e| format!("Unable to write task store {}: {}", path.display(), e))?;
        LOGGER.info(format!(
            "Stored {} tasks to {}",
            records.len(),
            path.display()
        ));
        Ok(())
    }

    /// `(kind, payload size)` per frame. Frames that cannot be decoded are
    /// reported with their raw size and a `<unreadable>` kind.
    pub async fn inspect(&self) -> Result<Vec<(String, usize)>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let Some(bytes) = fs_read_bytes_if_exists(path).await? else {
            return Ok(Vec::new());
        };
        let mut summary = Vec::new();
        let mut buf: &[u8] = &bytes;
        while buf.remaining() >= FRAME_HEADER_LEN {
            let len = buf.get_u32_le() as usize;
            if buf.remaining() < len {
                summary.push(("<truncated>".to_string(), buf.remaining()));
                break;
            }
            let (frame, rest) = buf.split_at(len);
            match decode_record(frame) {
                Ok(record) => summary.push((record.kind, record.payload.len())),
                Err(_) => summary.push(("<unreadable>".to_string(), len)),
            }
            buf = rest;
        }
        Ok(summary)
    }
}

fn decode_record(frame: &[u8]) -> Result<TaskRecord> {
    let (record, _) =
        bincode::serde::decode_from_slice::<TaskRecord, _>(frame, bincode::config::standard())?;
    Ok(record)
}

pub(crate) fn encode_frames(records: &[TaskRecord]) -> Result<Vec<u8>> {
    let cfg = bincode::config::standard();
    let mut out = BytesMut::new();
    for record in records {
        let body = bincode::serde::encode_to_vec(record, cfg)?;
        let len = u32::try_from(body.len())
            .map_err(|_| format!("Task record of kind {} is too large", record.kind))?;
        out.put_u32_le(len);
        out.put_slice(&body);
    }
    Ok(out.to_vec())
}

pub(crate) fn decode_frames(bytes: &[u8]) -> Vec<TaskRecord> {
    let mut records = Vec::new();
    let mut buf = bytes;
    let mut index = 0usize;
    while buf.has_remaining() {
        if buf.remaining() < FRAME_HEADER_LEN {
            LOGGER.error(format!(
                "Task store ends inside frame #{} header, ignoring {} trailing bytes",
                index,
                buf.remaining()
            ));
            break;
        }
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len {
            LOGGER.error(format!(
                "Task store frame #{} is truncated ({} of {} bytes), stopping load",
                index,
                buf.remaining(),
                len
            ));
            break;
        }
        let (frame, rest) = buf.split_at(len);
        match decode_record(frame) {
            Ok(record) => records.push(record),
            Err(e) => LOGGER.error(format!(
                "Skipping unreadable task record #{}: {:?}",
                index, e
            )),
        }
        buf = rest;
        index += 1;
    }
    records
}
