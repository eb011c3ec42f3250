use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

use super::SinkRow;

/// Share of `max_bytes` kept when the spool is capped.
const KEEP_NUMERATOR: u64 = 9;
const KEEP_DENOMINATOR: u64 = 10;

/// Append-only newline-delimited JSON spool.
///
/// With a nonzero `max_bytes`, an oversized file is cut down to its newest
/// 90%, starting at a line boundary, via a temp file and rename. The same
/// format backs the fallback queue, which is read from the head with
/// [`JsonlSpool::read_head`] and shortened with [`JsonlSpool::consume`].
/// Leading lines of a spool and the number of bytes they span.
#[derive(Debug, Default)]
pub struct SpoolHead {
    pub lines: Vec<String>,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct JsonlSpool {
    path: PathBuf,
    max_bytes: u64,
}

impl JsonlSpool {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends rows, one JSON object per line.
    pub async fn append(&self, rows: &[SinkRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(rows.len() * 192);
        for row in rows {
            serde_json::to_writer(&mut buf, row).context("serializing spool row")?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening spool {}", self.path.display()))?;
        file.write_all(&buf).await.context("appending spool rows")?;
        file.flush().await.context("flushing spool")?;
        drop(file);

        if self.max_bytes > 0 {
            self.cap().await?;
        }

        Ok(())
    }

    /// Reads up to `max_lines` lines from the start of the spool. A missing
    /// file reads as empty.
    pub async fn read_head(&self, max_lines: usize) -> Result<SpoolHead> {
        let file = match fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SpoolHead::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("opening spool {}", self.path.display()))
            }
        };

        let mut reader = BufReader::new(file);
        let mut head = SpoolHead::default();
        let mut line = Vec::new();
        while head.lines.len() < max_lines {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .await
                .context("reading spool")?;
            if n == 0 {
                break;
            }
            head.bytes += n as u64;
            head.lines
                .push(String::from_utf8_lossy(&line).trim_end().to_string());
        }

        Ok(head)
    }

    /// Drops the first `bytes` bytes, removing the file once nothing is left.
    pub async fn consume(&self, bytes: u64) -> Result<()> {
        let size = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).context("reading spool size"),
        };

        if bytes >= size {
            return fs::remove_file(&self.path)
                .await
                .with_context(|| format!("removing drained spool {}", self.path.display()));
        }

        let rest = self.read_from(bytes).await?;
        self.replace(&rest).await
    }

    /// Trims the spool to its newest lines once it exceeds `max_bytes`.
    async fn cap(&self) -> Result<()> {
        let size = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).context("reading spool size"),
        };
        if size <= self.max_bytes {
            return Ok(());
        }

        let keep = self.max_bytes * KEEP_NUMERATOR / KEEP_DENOMINATOR;
        let mut data = Vec::new();
        if keep > 0 {
            data = self.read_from(size - keep).await?;

            // Drop the partial first line.
            if let Some(nl) = data.iter().position(|b| *b == b'\n') {
                if nl + 1 < data.len() {
                    data.drain(..=nl);
                }
            }
        }

        self.replace(&data).await?;

        tracing::debug!(
            path = %self.path.display(),
            before = size,
            after = data.len(),
            "capped spool",
        );

        Ok(())
    }

    async fn read_from(&self, offset: u64) -> Result<Vec<u8>> {
        let mut file = fs::File::open(&self.path).await.context("opening spool")?;
        file.seek(SeekFrom::Start(offset))
            .await
            .context("seeking spool")?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await.context("reading spool")?;
        Ok(data)
    }

    /// Swaps the file contents for `data` via a temp file and rename.
    async fn replace(&self, data: &[u8]) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).await.context("writing spool copy")?;
        fs::rename(&tmp, &self.path)
            .await
            .context("replacing spool with rewritten copy")
    }
}
