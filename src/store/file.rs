use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{
    check_batch, FrameId, FrameMetadata, FrameStatus, FrameStore, FrameSummary, StoreError,
};

const FILE_MAGIC: &[u8; 4] = b"SQMF";
const FILE_VERSION: u16 = 1;
const FILE_HEADER_LEN: u64 = 8;

/// `u32` body length followed by a 4-byte body checksum.
const ENTRY_HEADER_LEN: usize = 8;
/// op + id + timestamp + metadata length.
const PUT_FIXED_LEN: usize = 1 + 8 + 8 + 4;
const DELETE_LEN: usize = 1 + 8;
/// Anything larger is treated as a corrupt length prefix during replay.
const MAX_ENTRY_LEN: usize = 256 * 1024 * 1024;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

const WRITE_BUFFER_LEN: usize = 64 * 1024;

/// Backing file of a [`FileFrameStore`].
pub trait LogFile: Read + Write + Seek + Send + 'static {
    fn set_len(&self, len: u64) -> io::Result<()>;

    fn sync_data(&self) -> io::Result<()>;
}

impl LogFile for File {
    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    kind: String,
    status: FrameStatus,
    timestamp_ms: u64,
    offset: u64,
}

/// Append-only frame log on a single file.
///
/// Layout: an 8-byte file header, then entries of
/// `[u32 len][4-byte sha256 prefix][body]`. A zero length marks the end of
/// the written region, so a preallocated file can be replayed. Writes are
/// buffered; `commit` flushes and syncs.
///
/// A failed append is rolled back to the end of the last complete entry and
/// only that entry is lost. The writer is gone only when the rollback itself
/// fails; every later call then reports [`StoreError::Unavailable`].
pub struct FileFrameStore<F: LogFile = File> {
    path: PathBuf,
    writer: Option<BufWriter<F>>,
    end: u64,
    index: BTreeMap<FrameId, IndexEntry>,
    next_id: FrameId,
    scratch: Vec<u8>,
}

impl FileFrameStore<File> {
    /// Creates a new, empty store, replacing any file at `path`.
    ///
    /// The file is zero-filled to `initial_size` bytes up front.
    pub fn create(path: &Path, initial_size: u64) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut header = [0u8; FILE_HEADER_LEN as usize];
        header[..4].copy_from_slice(FILE_MAGIC);
        header[4..6].copy_from_slice(&FILE_VERSION.to_le_bytes());
        file.write_all(&header)?;
        if initial_size > FILE_HEADER_LEN {
            file.set_len(initial_size)?;
        }
        file.sync_all()?;
        file.seek(SeekFrom::Start(FILE_HEADER_LEN))?;

        debug!(path = %path.display(), initial_size, "created frame store");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::with_capacity(WRITE_BUFFER_LEN, file)),
            end: FILE_HEADER_LEN,
            index: BTreeMap::new(),
            next_id: 1,
            scratch: Vec::new(),
        })
    }

    /// Opens an existing store and replays its log.
    ///
    /// A torn or corrupt tail (from a crash mid-write) is cut off.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::options().read(true).write(true).open(path)?;
        Self::open_file(path, file)
    }

    /// Opens `path` if it exists, otherwise creates it.
    pub fn open_or_create(path: &Path, initial_size: u64) -> Result<Self, StoreError> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, initial_size)
        }
    }
}

impl<F: LogFile> FileFrameStore<F> {
    /// Replays an already opened log. `path` is only used for logging.
    pub fn open_file(path: &Path, mut file: F) -> Result<Self, StoreError> {
        file.seek(SeekFrom::Start(0))?;

        let mut header = [0u8; FILE_HEADER_LEN as usize];
        file.read_exact(&mut header).map_err(|_| StoreError::Corrupt {
            offset: 0,
            reason: "missing file header",
        })?;
        if &header[..4] != FILE_MAGIC {
            return Err(StoreError::Corrupt {
                offset: 0,
                reason: "bad file magic",
            });
        }
        if u16::from_le_bytes([header[4], header[5]]) != FILE_VERSION {
            return Err(StoreError::Corrupt {
                offset: 0,
                reason: "unsupported file version",
            });
        }

        let replay = replay(&mut BufReader::new(&mut file))?;
        if let Some(reason) = replay.torn {
            warn!(
                path = %path.display(),
                offset = replay.end,
                reason,
                "truncating torn frame log tail",
            );
            file.set_len(replay.end)?;
            file.sync_data()?;
        }
        file.seek(SeekFrom::Start(replay.end))?;

        let next_id = replay.index.keys().next_back().map_or(1, |id| id + 1);

        debug!(
            path = %path.display(),
            frames = replay.index.len(),
            end = replay.end,
            "opened frame store",
        );

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::with_capacity(WRITE_BUFFER_LEN, file)),
            end: replay.end,
            index: replay.index,
            next_id,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of frames in the index, including deleted ones.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Reads back a frame's metadata and content.
    pub fn read_frame(
        &mut self,
        id: FrameId,
    ) -> Result<Option<(FrameMetadata, Vec<u8>)>, StoreError> {
        let Some(offset) = self.index.get(&id).map(|entry| entry.offset) else {
            return Ok(None);
        };
        let end = self.end;
        let writer = self.writer()?;

        // BufWriter's Seek impl flushes pending writes first.
        writer.seek(SeekFrom::Start(offset))?;
        let read = read_entry(writer.get_mut());
        writer.seek(SeekFrom::Start(end))?;

        let body = match read? {
            EntryRead::Body(body) => body,
            _ => {
                return Err(StoreError::Corrupt {
                    offset,
                    reason: "indexed entry unreadable",
                })
            }
        };
        match parse_body(&body) {
            Some(Parsed::Put {
                meta_json, content, ..
            }) => {
                let meta: FrameMetadata = serde_json::from_slice(meta_json)?;
                Ok(Some((meta, content.to_vec())))
            }
            _ => Err(StoreError::Corrupt {
                offset,
                reason: "indexed entry is not a put",
            }),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<F>, StoreError> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => Err(unavailable(&self.path)),
        }
    }

    /// Writes the entry currently in `scratch`, returning its offset.
    fn append_scratch(&mut self) -> Result<u64, StoreError> {
        let len = u32::try_from(self.scratch.len()).map_err(|_| StoreError::Corrupt {
            offset: self.end,
            reason: "entry exceeds u32 length",
        })?;
        let digest = Sha256::digest(&self.scratch);

        let Some(writer) = self.writer.as_mut() else {
            return Err(unavailable(&self.path));
        };
        let result = writer
            .write_all(&len.to_le_bytes())
            .and_then(|_| writer.write_all(&digest[..4]))
            .and_then(|_| writer.write_all(&self.scratch));
        if let Err(e) = result {
            let start = self.end;
            match self.roll_back(start) {
                Ok(()) => debug!(
                    path = %self.path.display(),
                    offset = start,
                    "rolled back partial frame log entry",
                ),
                Err(rollback) => warn!(
                    path = %self.path.display(),
                    offset = start,
                    error = %rollback,
                    "frame log rollback failed, store unavailable",
                ),
            }
            return Err(e.into());
        }

        let offset = self.end;
        self.end += (ENTRY_HEADER_LEN + self.scratch.len()) as u64;
        Ok(offset)
    }

    /// Cuts the log back to `start` after a failed append.
    ///
    /// Bytes of complete entries still in the write buffer are written out
    /// first; anything after `start` is discarded. Leaves the writer unset
    /// on failure.
    fn roll_back(&mut self, start: u64) -> io::Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let (mut file, buffered) = writer.into_parts();
        let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());

        let written = file.stream_position()?;
        if written < start {
            let missing = usize::try_from(start - written)
                .map_err(|_| io::Error::new(ErrorKind::InvalidData, "rollback gap too large"))?;
            let complete = buffered.get(..missing).ok_or_else(|| {
                io::Error::new(ErrorKind::UnexpectedEof, "write buffer behind log end")
            })?;
            file.write_all(complete)?;
        }
        file.set_len(start)?;
        file.seek(SeekFrom::Start(start))?;

        self.writer = Some(BufWriter::with_capacity(WRITE_BUFFER_LEN, file));
        Ok(())
    }
}

fn unavailable(path: &Path) -> StoreError {
    StoreError::Unavailable(format!(
        "{} could not roll back a failed write; reopen to recover",
        path.display()
    ))
}

impl<F: LogFile> FrameStore for FileFrameStore<F> {
    fn put(
        &mut self,
        content: &[u8],
        metadata: &FrameMetadata,
        timestamp_ms: u64,
    ) -> Result<FrameId, StoreError> {
        self.writer()?;

        let meta_json = serde_json::to_vec(metadata)?;
        let meta_len = u32::try_from(meta_json.len()).map_err(|_| StoreError::Corrupt {
            offset: self.end,
            reason: "metadata exceeds u32 length",
        })?;

        let id = self.next_id;
        self.scratch.clear();
        self.scratch
            .reserve(PUT_FIXED_LEN + meta_json.len() + content.len());
        self.scratch.push(OP_PUT);
        self.scratch.extend_from_slice(&id.to_le_bytes());
        self.scratch.extend_from_slice(&timestamp_ms.to_le_bytes());
        self.scratch.extend_from_slice(&meta_len.to_le_bytes());
        self.scratch.extend_from_slice(&meta_json);
        self.scratch.extend_from_slice(content);

        let offset = self.append_scratch()?;
        self.next_id += 1;
        self.index.insert(
            id,
            IndexEntry {
                kind: metadata.kind.clone(),
                status: FrameStatus::Active,
                timestamp_ms,
                offset,
            },
        );
        Ok(id)
    }

    fn put_batch(
        &mut self,
        contents: &[&[u8]],
        metadata: &[FrameMetadata],
        timestamps: &[u64],
    ) -> Result<Vec<FrameId>, StoreError> {
        check_batch(contents, metadata, timestamps)?;
        self.scratch.reserve(contents.iter().map(|c| c.len()).max().unwrap_or(0));

        let mut ids = Vec::with_capacity(contents.len());
        for ((content, meta), ts) in contents.iter().zip(metadata).zip(timestamps) {
            ids.push(self.put(content, meta, *ts)?);
        }
        Ok(ids)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        // A failed flush keeps the unwritten bytes buffered for the next try.
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    fn delete(&mut self, id: FrameId) -> Result<(), StoreError> {
        self.writer()?;
        match self.index.get(&id) {
            None => return Err(StoreError::UnknownFrame { id }),
            Some(entry) if entry.status == FrameStatus::Deleted => return Ok(()),
            Some(_) => {}
        }

        self.scratch.clear();
        self.scratch.push(OP_DELETE);
        self.scratch.extend_from_slice(&id.to_le_bytes());
        self.append_scratch()?;

        if let Some(entry) = self.index.get_mut(&id) {
            entry.status = FrameStatus::Deleted;
        }
        Ok(())
    }

    fn list_frame_metadata(&self) -> Result<Vec<FrameSummary>, StoreError> {
        Ok(self
            .index
            .iter()
            .map(|(id, entry)| FrameSummary {
                id: *id,
                kind: entry.kind.clone(),
                status: entry.status,
                timestamp_ms: entry.timestamp_ms,
            })
            .collect())
    }
}

struct Replay {
    index: BTreeMap<FrameId, IndexEntry>,
    end: u64,
    torn: Option<&'static str>,
}

enum EntryRead {
    Body(Vec<u8>),
    /// Clean end of log: EOF or the zero-filled preallocated region.
    End,
    Torn(&'static str),
}

enum Parsed<'a> {
    Put {
        id: FrameId,
        timestamp_ms: u64,
        meta_json: &'a [u8],
        content: &'a [u8],
    },
    Delete {
        id: FrameId,
    },
}

fn replay<R: Read>(reader: &mut R) -> Result<Replay, StoreError> {
    let mut index: BTreeMap<FrameId, IndexEntry> = BTreeMap::new();
    let mut end = FILE_HEADER_LEN;

    loop {
        let body = match read_entry(reader)? {
            EntryRead::Body(body) => body,
            EntryRead::End => {
                return Ok(Replay {
                    index,
                    end,
                    torn: None,
                })
            }
            EntryRead::Torn(reason) => {
                return Ok(Replay {
                    index,
                    end,
                    torn: Some(reason),
                })
            }
        };

        match parse_body(&body) {
            Some(Parsed::Put {
                id,
                timestamp_ms,
                meta_json,
                ..
            }) => {
                let Ok(meta) = serde_json::from_slice::<FrameMetadata>(meta_json) else {
                    return Ok(Replay {
                        index,
                        end,
                        torn: Some("unparseable frame metadata"),
                    });
                };
                index.insert(
                    id,
                    IndexEntry {
                        kind: meta.kind,
                        status: FrameStatus::Active,
                        timestamp_ms,
                        offset: end,
                    },
                );
            }
            Some(Parsed::Delete { id }) => {
                if let Some(entry) = index.get_mut(&id) {
                    entry.status = FrameStatus::Deleted;
                }
            }
            None => {
                return Ok(Replay {
                    index,
                    end,
                    torn: Some("malformed entry body"),
                })
            }
        }

        end += (ENTRY_HEADER_LEN + body.len()) as u64;
    }
}

fn read_entry<R: Read>(reader: &mut R) -> Result<EntryRead, StoreError> {
    let mut header = [0u8; ENTRY_HEADER_LEN];
    match read_full(reader, &mut header)? {
        0 => return Ok(EntryRead::End),
        n if n < ENTRY_HEADER_LEN => return Ok(EntryRead::Torn("partial entry header")),
        _ => {}
    }

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if len == 0 {
        return Ok(EntryRead::End);
    }
    if len > MAX_ENTRY_LEN {
        return Ok(EntryRead::Torn("entry length out of range"));
    }

    let mut body = vec![0u8; len];
    if read_full(reader, &mut body)? < len {
        return Ok(EntryRead::Torn("partial entry body"));
    }
    if Sha256::digest(&body)[..4] != header[4..8] {
        return Ok(EntryRead::Torn("entry checksum mismatch"));
    }
    Ok(EntryRead::Body(body))
}

/// Reads until `buf` is full or EOF, returning the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, StoreError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn parse_body(body: &[u8]) -> Option<Parsed<'_>> {
    match *body.first()? {
        OP_PUT => {
            if body.len() < PUT_FIXED_LEN {
                return None;
            }
            let id = u64::from_le_bytes(body.get(1..9)?.try_into().ok()?);
            let timestamp_ms = u64::from_le_bytes(body.get(9..17)?.try_into().ok()?);
            let meta_len = u32::from_le_bytes(body.get(17..21)?.try_into().ok()?) as usize;
            let meta_end = PUT_FIXED_LEN.checked_add(meta_len)?;
            let meta_json = body.get(PUT_FIXED_LEN..meta_end)?;
            let content = body.get(meta_end..)?;
            Some(Parsed::Put {
                id,
                timestamp_ms,
                meta_json,
                content,
            })
        }
        OP_DELETE if body.len() == DELETE_LEN => {
            let id = u64::from_le_bytes(body.get(1..9)?.try_into().ok()?);
            Some(Parsed::Delete { id })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::store::FrameKind;

    /// Real file whose next `fail_writes` write calls return an I/O error.
    struct FlakyFile {
        inner: File,
        fail_writes: Arc<AtomicUsize>,
    }

    impl Read for FlakyFile {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for FlakyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let failing = self
                .fail_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(io::Error::new(ErrorKind::Other, "injected write failure"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FlakyFile {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl LogFile for FlakyFile {
        fn set_len(&self, len: u64) -> io::Result<()> {
            self.inner.set_len(len)
        }

        fn sync_data(&self) -> io::Result<()> {
            self.inner.sync_data()
        }
    }

    fn meta(name: &str) -> FrameMetadata {
        FrameMetadata::new(FrameKind::Event, format!("seqmem://session/t/event/{name}"))
            .with_tag("name", name)
    }

    #[test]
    fn test_put_commit_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");

        {
            let mut store = FileFrameStore::create(&path, 0).expect("create");
            let a = store.put(b"alpha", &meta("a"), 10).expect("put");
            let ids = store
                .put_batch(
                    &[b"beta".as_slice(), b"gamma".as_slice()],
                    &[meta("b"), meta("c")],
                    &[20, 30],
                )
                .expect("batch");
            assert_eq!(ids, vec![a + 1, a + 2]);
            store.commit().expect("commit");
        }

        let mut store = FileFrameStore::open(&path).expect("open");
        assert_eq!(store.len(), 3);
        let listed = store.list_frame_metadata().expect("list");
        assert_eq!(
            listed.iter().map(|f| f.timestamp_ms).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert!(listed.iter().all(|f| f.kind == "seqmem.event"));

        let (m, content) = store.read_frame(listed[1].id).expect("read").expect("present");
        assert_eq!(content, b"beta");
        assert_eq!(m, meta("b"));

        let next = store.put(b"delta", &meta("d"), 40).expect("put after reopen");
        assert_eq!(next, listed[2].id + 1);
    }

    #[test]
    fn test_delete_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");

        let id = {
            let mut store = FileFrameStore::create(&path, 0).expect("create");
            let id = store.put(b"x", &meta("x"), 1).expect("put");
            store.put(b"y", &meta("y"), 2).expect("put");
            store.delete(id).expect("delete");
            store.delete(id).expect("second delete is a no-op");
            store.commit().expect("commit");
            id
        };

        let store = FileFrameStore::open(&path).expect("open");
        let listed = store.list_frame_metadata().expect("list");
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].status, FrameStatus::Deleted);
        assert_eq!(listed[1].status, FrameStatus::Active);
    }

    #[test]
    fn test_preallocated_file_replays() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");

        {
            let mut store = FileFrameStore::create(&path, 1 << 20).expect("create");
            store.put(b"one", &meta("one"), 1).expect("put");
            store.commit().expect("commit");
        }
        assert_eq!(fs::metadata(&path).expect("stat").len(), 1 << 20);

        let mut store = FileFrameStore::open(&path).expect("open");
        assert_eq!(store.len(), 1);
        store.put(b"two", &meta("two"), 2).expect("put");
        store.commit().expect("commit");
        drop(store);

        let store = FileFrameStore::open(&path).expect("reopen");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_torn_tail_truncated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");

        let good_len = {
            let mut store = FileFrameStore::create(&path, 0).expect("create");
            store.put(b"kept", &meta("k"), 1).expect("put");
            store.commit().expect("commit");
            fs::metadata(&path).expect("stat").len()
        };

        // Simulate a crash halfway through the next entry.
        {
            let mut f = File::options().append(true).open(&path).expect("append");
            f.write_all(&100u32.to_le_bytes()).expect("write");
            f.write_all(&[0xAB; 12]).expect("write");
        }

        let mut store = FileFrameStore::open(&path).expect("open");
        assert_eq!(store.len(), 1);
        assert_eq!(fs::metadata(&path).expect("stat").len(), good_len);

        store.put(b"after", &meta("a"), 2).expect("put");
        store.commit().expect("commit");
        drop(store);
        assert_eq!(FileFrameStore::open(&path).expect("reopen").len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_treated_as_torn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");
        {
            let mut store = FileFrameStore::create(&path, 0).expect("create");
            store.put(b"first", &meta("f"), 1).expect("put");
            store.put(b"second", &meta("s"), 2).expect("put");
            store.commit().expect("commit");
        }

        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).expect("write");

        let store = FileFrameStore::open(&path).expect("open");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_bad_header_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");
        fs::write(&path, b"NOTAFRAMELOG").expect("write");
        assert!(matches!(
            FileFrameStore::open(&path),
            Err(StoreError::Corrupt { offset: 0, .. })
        ));
    }

    #[test]
    fn test_open_or_create_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/deeper/frames.log");
        let store = FileFrameStore::open_or_create(&path, 0).expect("create");
        assert!(store.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_unknown_delete_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileFrameStore::create(&dir.path().join("f.log"), 0).expect("create");
        assert!(matches!(
            store.delete(7),
            Err(StoreError::UnknownFrame { id: 7 })
        ));
    }

    #[test]
    fn test_failed_append_rolls_back_and_store_keeps_working() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");
        {
            let mut store = FileFrameStore::create(&path, 0).expect("create");
            store.put(b"before", &meta("before"), 1).expect("put");
            store.commit().expect("commit");
        }

        let fail_writes = Arc::new(AtomicUsize::new(0));
        let file = FlakyFile {
            inner: File::options().read(true).write(true).open(&path).expect("open"),
            fail_writes: Arc::clone(&fail_writes),
        };
        let mut store = FileFrameStore::open_file(&path, file).expect("replay");
        assert_eq!(store.len(), 1);

        // Buffered only; reaches the file with the next flush.
        let buffered = store.put(b"buffered", &meta("buffered"), 2).expect("put");

        // Larger than the write buffer, so the append has to flush and fails.
        fail_writes.store(1, Ordering::SeqCst);
        let big = vec![0x5A; WRITE_BUFFER_LEN * 2];
        let err = store.put(&big, &meta("big"), 3).expect_err("injected failure");
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.len(), 2);

        let after = store.put(b"after", &meta("after"), 4).expect("put after failure");
        assert_eq!(after, buffered + 1);
        store.commit().expect("commit after failure");
        let (_, content) = store.read_frame(buffered).expect("read").expect("present");
        assert_eq!(content, b"buffered");
        drop(store);

        let store = FileFrameStore::open(&path).expect("reopen");
        let listed = store.list_frame_metadata().expect("list");
        assert_eq!(
            listed.iter().map(|f| f.timestamp_ms).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
    }

    #[test]
    fn test_failed_commit_retries_buffered_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.log");
        drop(FileFrameStore::create(&path, 0).expect("create"));

        let fail_writes = Arc::new(AtomicUsize::new(0));
        let file = FlakyFile {
            inner: File::options().read(true).write(true).open(&path).expect("open"),
            fail_writes: Arc::clone(&fail_writes),
        };
        let mut store = FileFrameStore::open_file(&path, file).expect("replay");
        store.put(b"one", &meta("one"), 1).expect("put");

        fail_writes.store(1, Ordering::SeqCst);
        assert!(store.commit().is_err());
        store.commit().expect("second commit");
        drop(store);

        assert_eq!(FileFrameStore::open(&path).expect("reopen").len(), 1);
    }
}
