use std::io::Write;

use anyhow::{bail, Context, Result};

use super::{AnalyticalSinkChannel, SinkRow};
use crate::config::HttpSinkConfig;

/// ClickHouse HTTP interface channel.
///
/// Rows go out as `INSERT INTO <db>.<table> FORMAT JSONEachRow` with an
/// NDJSON body, optionally compressed.
pub struct HttpChannel {
    client: reqwest::Client,
    cfg: HttpSinkConfig,
    base: String,
    query: String,
    encoding: BodyEncoding,
}

impl HttpChannel {
    pub fn new(cfg: HttpSinkConfig) -> Result<Self> {
        if cfg.url.is_empty() {
            bail!("http sink url is empty");
        }

        let encoding = BodyEncoding::from_name(&cfg.compression)?;

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("building HTTP client")?;

        let base = cfg.url.trim_end_matches('/').to_string();
        let query = format!(
            "INSERT INTO {}.{} FORMAT JSONEachRow",
            cfg.database, cfg.table
        );

        Ok(Self {
            client,
            cfg,
            base,
            query,
            encoding,
        })
    }

    fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if !self.cfg.username.is_empty() {
            request = request.basic_auth(&self.cfg.username, Some(&self.cfg.password));
        }
        for (k, v) in &self.cfg.headers {
            request = request.header(k.as_str(), v.as_str());
        }
        request
    }
}

impl AnalyticalSinkChannel for HttpChannel {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn probe(&self) -> Result<()> {
        let request = self.authorize(self.client.get(format!("{}/ping", self.base)));
        let resp = request.send().await.context("probing ClickHouse HTTP")?;

        let status = resp.status();
        // Drain body for connection reuse.
        let _ = resp.bytes().await;

        if !status.is_success() {
            bail!("ClickHouse HTTP probe unexpected status: {status}");
        }

        Ok(())
    }

    async fn push(&self, rows: &[SinkRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::with_capacity(rows.len() * 192);
        for row in rows {
            serde_json::to_writer(&mut buf, row).context("serializing row to JSON")?;
            buf.push(b'\n');
        }
        let raw_len = buf.len();

        let mut request = self
            .client
            .post(&self.base)
            .query(&[("query", self.query.as_str())])
            .header("Content-Type", "application/x-ndjson")
            .body(self.encoding.encode(buf)?);

        if let Some(encoding) = self.encoding.header() {
            request = request.header("Content-Encoding", encoding);
        }

        let resp = self
            .authorize(request)
            .send()
            .await
            .context("sending HTTP insert")?;

        let status = resp.status();
        let _ = resp.bytes().await;

        if !status.is_success() {
            bail!("HTTP insert unexpected status: {status}");
        }

        tracing::debug!(rows = rows.len(), bytes = raw_len, "pushed rows via HTTP");

        Ok(())
    }
}

/// Request body encoding, fixed when the channel is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEncoding {
    Identity,
    Gzip,
    Zstd,
    /// zlib stream, sent as `Content-Encoding: deflate`.
    Deflate,
    Snappy,
}

impl BodyEncoding {
    fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "" | "none" => Self::Identity,
            "gzip" => Self::Gzip,
            "zstd" => Self::Zstd,
            "zlib" => Self::Deflate,
            "snappy" => Self::Snappy,
            other => bail!("unsupported compression: {other}"),
        })
    }

    fn header(self) -> Option<&'static str> {
        match self {
            Self::Identity => None,
            Self::Gzip => Some("gzip"),
            Self::Zstd => Some("zstd"),
            Self::Deflate => Some("deflate"),
            Self::Snappy => Some("snappy"),
        }
    }

    /// Encodes an NDJSON batch, consuming the raw buffer.
    fn encode(self, ndjson: Vec<u8>) -> Result<Vec<u8>> {
        let level = flate2::Compression::fast();
        match self {
            Self::Identity => Ok(ndjson),
            Self::Gzip => {
                let mut out = flate2::write::GzEncoder::new(Vec::new(), level);
                out.write_all(&ndjson)?;
                out.finish().context("finishing gzip body")
            }
            Self::Deflate => {
                let mut out = flate2::write::ZlibEncoder::new(Vec::new(), level);
                out.write_all(&ndjson)?;
                out.finish().context("finishing zlib body")
            }
            Self::Zstd => zstd::bulk::compress(&ndjson, 1).context("zstd body"),
            Self::Snappy => snap::raw::Encoder::new()
                .compress_vec(&ndjson)
                .context("snappy body"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    const SAMPLE: &[u8] = b"{\"name\":\"x\"}\n{\"name\":\"y\"}\n";

    fn encode(name: &str) -> Vec<u8> {
        BodyEncoding::from_name(name)
            .expect("known encoding")
            .encode(SAMPLE.to_vec())
            .expect("encode")
    }

    #[test]
    fn test_identity_body_untouched() {
        assert_eq!(encode("none"), SAMPLE);
        assert_eq!(encode(""), SAMPLE);
        assert_eq!(BodyEncoding::Identity.header(), None);
    }

    #[test]
    fn test_gzip_and_deflate_bodies_decode() {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(encode("gzip").as_slice())
            .read_to_end(&mut out)
            .expect("gunzip");
        assert_eq!(out, SAMPLE);

        let mut out = Vec::new();
        flate2::read::ZlibDecoder::new(encode("zlib").as_slice())
            .read_to_end(&mut out)
            .expect("inflate");
        assert_eq!(out, SAMPLE);
        assert_eq!(BodyEncoding::Deflate.header(), Some("deflate"));
    }

    #[test]
    fn test_zstd_and_snappy_bodies_decode() {
        assert_eq!(zstd::decode_all(encode("zstd").as_slice()).expect("unzstd"), SAMPLE);
        let out = snap::raw::Decoder::new()
            .decompress_vec(&encode("snappy"))
            .expect("unsnap");
        assert_eq!(out, SAMPLE);
    }

    #[test]
    fn test_unknown_compression_rejected_at_construction() {
        assert!(BodyEncoding::from_name("brotli").is_err());
        let err = HttpChannel::new(HttpSinkConfig {
            url: "http://127.0.0.1:8123".to_string(),
            compression: "brotli".to_string(),
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_new_requires_url() {
        assert!(HttpChannel::new(HttpSinkConfig::default()).is_err());

        let channel = HttpChannel::new(HttpSinkConfig {
            url: "http://127.0.0.1:8123/".to_string(),
            compression: "zstd".to_string(),
            ..Default::default()
        })
        .expect("channel");
        assert_eq!(channel.base, "http://127.0.0.1:8123");
        assert_eq!(channel.query, "INSERT INTO seq.mem_events FORMAT JSONEachRow");
        assert_eq!(channel.encoding, BodyEncoding::Zstd);
    }
}
