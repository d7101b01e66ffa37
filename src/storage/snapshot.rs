use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::Widget;

/// 快照文件 Header
const MAGIC: u32 = 0x5749_0001;
const VERSION_CURRENT: u32 = 1;
const STATE_COMMITTED: u32 = 0x0000_0001;
const STATE_INCOMPLETE: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 4; // magic + version + state + data_len + checksum

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WidgetSnapshotV1 {
    /// 按 z 升序
    pub widgets: Vec<Widget>,
}

/// 原子快照存储（atomic replacement）
///
/// 落盘流程：
/// 1) 写 widgets.db.tmp 的 INCOMPLETE header（len/checksum 先置 0）
/// 2) `bincode::serialize_into(file)` 流式写 body，并边写边计算 checksum / data_len
/// 3) seek 回开头覆盖 COMMITTED header
/// 4) fsync(tmpfile)
/// 5) rename(tmp, target) — 原子替换（POSIX 保证）
/// 6) fsync(dir)
///
/// 加载时校验 magic + version + state + data_len + checksum，任何不一致都拒绝，
/// 不会把半截快照当成索引内容。
///
/// 所有写入共用同一个 tmp 路径，`write_lock` 把整个 1)..6) 串行化。
pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

struct SimpleChecksum {
    hash: u32,
    pending: [u8; 4],
    pending_len: usize,
}

impl SimpleChecksum {
    fn new() -> Self {
        Self {
            hash: 0,
            pending: [0u8; 4],
            pending_len: 0,
        }
    }

    fn update(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let need = 4 - self.pending_len;
            let take = need.min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];

            if self.pending_len == 4 {
                self.process_chunk(self.pending);
                self.pending_len = 0;
                self.pending = [0u8; 4];
            }
        }

        let mut chunks = data.chunks_exact(4);
        for chunk in chunks.by_ref() {
            self.process_chunk([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let rest = chunks.remainder();
        if !rest.is_empty() {
            self.pending[..rest.len()].copy_from_slice(rest);
            self.pending_len = rest.len();
        }
    }

    fn finalize(mut self) -> u32 {
        if self.pending_len > 0 {
            let mut buf = [0u8; 4];
            buf[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
            self.process_chunk(buf);
        }
        self.hash
    }

    fn process_chunk(&mut self, chunk: [u8; 4]) {
        self.hash = self.hash.wrapping_add(u32::from_le_bytes(chunk));
        self.hash = self.hash.rotate_left(7);
    }
}

struct ChecksumWriter<'a, W: Write> {
    inner: &'a mut W,
    checksum: SimpleChecksum,
    bytes: u64,
}

impl<'a, W: Write> ChecksumWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            checksum: SimpleChecksum::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (u64, u32) {
        (self.bytes, self.checksum.finalize())
    }
}

impl<'a, W: Write> Write for ChecksumWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.checksum.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn encode_header(state: u32, data_len: u32, checksum: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&VERSION_CURRENT.to_le_bytes());
    header[8..12].copy_from_slice(&state.to_le_bytes());
    header[12..16].copy_from_slice(&data_len.to_le_bytes());
    header[16..20].copy_from_slice(&checksum.to_le_bytes());
    header
}

fn read_u32(data: &[u8], at: usize) -> anyhow::Result<u32> {
    let bytes: [u8; 4] = data[at..at + 4].try_into()?;
    Ok(u32::from_le_bytes(bytes))
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载快照；文件不存在或任一校验失败都返回 `Ok(None)`
    pub fn load_if_valid(&self) -> anyhow::Result<Option<WidgetSnapshotV1>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&self.path)
            .with_context(|| format!("read snapshot {}", self.path.display()))?;
        if data.len() < HEADER_SIZE {
            tracing::warn!("Snapshot too small, ignoring");
            return Ok(None);
        }

        let magic = read_u32(&data, 0)?;
        let version = read_u32(&data, 4)?;
        let state = read_u32(&data, 8)?;
        let data_len = read_u32(&data, 12)? as usize;
        let stored_checksum = read_u32(&data, 16)?;

        if magic != MAGIC {
            tracing::warn!("Snapshot magic mismatch: {:#x} != {:#x}", magic, MAGIC);
            return Ok(None);
        }
        if version != VERSION_CURRENT {
            tracing::warn!(
                "Snapshot version mismatch: {} != {}",
                version,
                VERSION_CURRENT
            );
            return Ok(None);
        }
        if state != STATE_COMMITTED {
            tracing::warn!("Snapshot state INCOMPLETE, ignoring");
            return Ok(None);
        }

        let body = &data[HEADER_SIZE..];
        if body.len() != data_len {
            tracing::warn!("Snapshot data length mismatch");
            return Ok(None);
        }

        let computed = simple_checksum(body);
        if computed != stored_checksum {
            tracing::warn!(
                "Snapshot checksum mismatch: {} != {}",
                computed,
                stored_checksum
            );
            return Ok(None);
        }

        match bincode::deserialize::<WidgetSnapshotV1>(body) {
            Ok(snap) => Ok(Some(snap)),
            Err(e) => {
                tracing::warn!("Snapshot v1 deserialize failed: {}", e);
                Ok(None)
            }
        }
    }

    /// 原子写入快照；失败时清理 tmp 文件，目标文件保持上一次的内容
    pub fn write_atomic(&self, snap: &WidgetSnapshotV1) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        let data_len = match self.write_tmp(&tmp_path, snap) {
            Ok(len) => len,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        tracing::info!(
            "Snapshot written: {} widgets, {} bytes",
            snap.widgets.len(),
            HEADER_SIZE + data_len as usize
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("db.tmp")
    }

    /// 1)..5)：写 tmp、提交 header、fsync、rename。返回 body 长度
    fn write_tmp(&self, tmp_path: &Path, snap: &WidgetSnapshotV1) -> anyhow::Result<u32> {
        let mut file = std::fs::File::create(tmp_path)
            .with_context(|| format!("create {}", tmp_path.display()))?;
        file.write_all(&encode_header(STATE_INCOMPLETE, 0, 0))?;

        let (data_len_u64, checksum) = {
            let mut cw = ChecksumWriter::new(&mut file);
            bincode::serialize_into(&mut cw, snap)?;
            cw.finish()
        };

        let data_len: u32 = data_len_u64
            .try_into()
            .map_err(|_| anyhow::anyhow!("Snapshot too large (>{} bytes)", u32::MAX))?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encode_header(STATE_COMMITTED, data_len, checksum))?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(tmp_path, &self.path)
            .with_context(|| format!("rename {} -> {}", tmp_path.display(), self.path.display()))?;
        Ok(data_len)
    }
}

/// 简单校验和（非加密，仅用于完整性检测）
fn simple_checksum(data: &[u8]) -> u32 {
    let mut c = SimpleChecksum::new();
    c.update(data);
    c.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WidgetId;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("widget-index-{}-{}", tag, nanos))
    }

    fn sample(n: i32) -> WidgetSnapshotV1 {
        WidgetSnapshotV1 {
            widgets: (0..n)
                .map(|z| Widget {
                    id: WidgetId::generate(),
                    x: z * 10,
                    y: -z,
                    z: z * 2,
                    width: 5,
                    height: 7,
                    last_updated: chrono::Utc::now(),
                })
                .collect(),
        }
    }

    #[test]
    fn missing_file_loads_none() {
        let store = SnapshotStore::new(unique_tmp_dir("missing").join("widgets.db"));
        assert!(store.load_if_valid().unwrap().is_none());
    }

    #[test]
    fn written_snapshot_loads_back() {
        let dir = unique_tmp_dir("write");
        let store = SnapshotStore::new(dir.join("widgets.db"));
        let snap = sample(5);

        store.write_atomic(&snap).unwrap();
        assert!(!dir.join("widgets.db.tmp").exists());

        let loaded = store.load_if_valid().unwrap().unwrap();
        assert_eq!(loaded.widgets, snap.widgets);
    }

    #[test]
    fn flipped_byte_is_rejected() {
        let dir = unique_tmp_dir("corrupt");
        let path = dir.join("widgets.db");
        let store = SnapshotStore::new(path.clone());
        store.write_atomic(&sample(3)).unwrap();

        let mut data = std::fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        assert!(store.load_if_valid().unwrap().is_none());
    }

    #[test]
    fn incomplete_header_is_rejected() {
        let dir = unique_tmp_dir("incomplete");
        let path = dir.join("widgets.db");
        let store = SnapshotStore::new(path.clone());
        store.write_atomic(&sample(2)).unwrap();

        let mut data = std::fs::read(&path).unwrap();
        data[8..12].copy_from_slice(&STATE_INCOMPLETE.to_le_bytes());
        std::fs::write(&path, &data).unwrap();

        assert!(store.load_if_valid().unwrap().is_none());
    }

    #[test]
    fn concurrent_writers_never_leave_invalid_snapshot() {
        let dir = unique_tmp_dir("concurrent");
        let store = std::sync::Arc::new(SnapshotStore::new(dir.join("widgets.db")));
        let big = std::sync::Arc::new(sample(2000));
        let small = std::sync::Arc::new(sample(50));

        for _ in 0..50 {
            let handles: Vec<_> = [big.clone(), small.clone()]
                .into_iter()
                .map(|snap| {
                    let store = store.clone();
                    std::thread::spawn(move || store.write_atomic(&snap))
                })
                .collect();
            for h in handles {
                h.join().unwrap().unwrap();
            }

            let loaded = store.load_if_valid().unwrap().expect("valid snapshot");
            assert!(loaded.widgets == big.widgets || loaded.widgets == small.widgets);
        }
        assert!(!dir.join("widgets.db.tmp").exists());
    }

    #[test]
    fn failed_rename_removes_tmp() {
        let dir = unique_tmp_dir("failed");
        let path = dir.join("widgets.db");
        let store = SnapshotStore::new(path.clone());
        store.write_atomic(&sample(3)).unwrap();

        // 目标位置换成非空目录，rename 必然失败
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(store.write_atomic(&sample(4)).is_err());
        assert!(!dir.join("widgets.db.tmp").exists());
        assert!(path.join("occupied").is_dir());
    }

    #[test]
    fn checksum_is_split_invariant() {
        let data: Vec<u8> = (0u8..=200).collect();
        let mut split = SimpleChecksum::new();
        split.update(&data[..3]);
        split.update(&data[3..10]);
        split.update(&data[10..]);
        assert_eq!(split.finalize(), simple_checksum(&data));
    }
}
