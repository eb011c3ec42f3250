use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::sink::SinkMode;

/// Top-level configuration for the seqmem engine.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Session identifier. Generated per process when unset.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Embedded frame store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Hot-path ingest configuration.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Background persistence writer configuration.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Analytical sink configuration.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Prometheus health metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Embedded frame store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store file path. Default: "data/seqmem.sqmf".
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Bytes preallocated when the store file is created. Default: 4MB.
    #[serde(default = "default_store_initial_size")]
    pub initial_size: u64,
}

/// Hot-path ingest configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Dedup window in milliseconds; 0 disables dedup. Default: 250.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Dedup ring capacity; 0 disables dedup. Default: 4096.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Raw records kept for tail queries. Default: 512.
    #[serde(default = "default_tail_capacity")]
    pub tail_capacity: usize,

    /// Maximum frames waiting for the writer. Default: 65536.
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
}

/// Background persistence writer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Flush timer period. Default: 50ms.
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,

    /// Maximum frames drained per flush. Default: 256.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Minimum time between durable commits. Default: 1s.
    #[serde(default = "default_commit_interval", with = "humantime_serde")]
    pub commit_interval: Duration,

    /// Minimum time between maintenance passes. Default: 10m.
    #[serde(default = "default_maintenance_interval", with = "humantime_serde")]
    pub maintenance_interval: Duration,

    /// Frame time-to-live in days; 0 disables maintenance. Default: 30.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,

    /// Maximum deletions per maintenance pass. Default: 1000.
    #[serde(default = "default_max_deletes")]
    pub max_deletes_per_pass: usize,
}

/// Native analytical sink transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeKind {
    /// ClickHouse native TCP protocol.
    #[default]
    Clickhouse,
    /// ClickHouse HTTP interface.
    Http,
}

/// Analytical sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Routing mode (auto, native, mirror, file, off and their aliases).
    /// Default: auto, which is native when `http.url` is set and file
    /// otherwise.
    #[serde(default)]
    pub mode: SinkMode,

    /// JSONL spool path. Default: "data/seq_mem.jsonl".
    #[serde(default = "default_spool_path")]
    pub spool_path: PathBuf,

    /// Spool size cap in bytes; 0 disables the cap. Default: 50MB.
    #[serde(default = "default_spool_max_bytes")]
    pub spool_max_bytes: u64,

    /// Queue for rows the native channel did not accept. Replayed from the
    /// head on every writer tick. Default: "data/seq_mem_fallback.jsonl".
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,

    /// Fallback lines replayed per writer tick; 0 disables replay.
    /// Default: 1000.
    #[serde(default = "default_replay_batch")]
    pub replay_batch: usize,

    /// Native channel transport. Default: clickhouse.
    #[serde(default)]
    pub native: NativeKind,

    /// ClickHouse native connection configuration.
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,

    /// ClickHouse HTTP configuration.
    #[serde(default)]
    pub http: HttpSinkConfig,
}

/// ClickHouse native TCP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    /// Server host. Default: "127.0.0.1".
    #[serde(default = "default_ch_host")]
    pub host: String,

    /// Native protocol port. Default: 9000.
    #[serde(default = "default_ch_port")]
    pub port: u16,

    /// Database name. Default: "seq".
    #[serde(default = "default_database")]
    pub database: String,

    /// Target table. Default: "mem_events".
    #[serde(default = "default_table")]
    pub table: String,

    /// ClickHouse username.
    #[serde(default)]
    pub username: String,

    /// ClickHouse password.
    #[serde(default)]
    pub password: String,
}

/// ClickHouse HTTP interface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSinkConfig {
    /// Base URL, e.g. "http://127.0.0.1:8123".
    #[serde(default)]
    pub url: String,

    /// Database name. Default: "seq".
    #[serde(default = "default_database")]
    pub database: String,

    /// Target table. Default: "mem_events".
    #[serde(default = "default_table")]
    pub table: String,

    /// Additional HTTP headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Compression algorithm (none, gzip, zstd, zlib, snappy). Default: none.
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Request timeout. Default: 2.5s.
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// ClickHouse username.
    #[serde(default)]
    pub username: String,

    /// ClickHouse password.
    #[serde(default)]
    pub password: String,
}

/// Prometheus health metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Serve metrics and query endpoints. Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// Listen address. Default: ":9090".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_store_path() -> PathBuf {
    PathBuf::from("data/seqmem.sqmf")
}

fn default_store_initial_size() -> u64 {
    4 * 1024 * 1024
}

fn default_dedup_window_ms() -> u64 {
    250
}

fn default_dedup_capacity() -> usize {
    4096
}

fn default_tail_capacity() -> usize {
    512
}

fn default_pending_capacity() -> usize {
    65_536
}

fn default_tick() -> Duration {
    Duration::from_millis(50)
}

fn default_max_batch() -> usize {
    256
}

fn default_commit_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_maintenance_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_ttl_days() -> u64 {
    30
}

fn default_max_deletes() -> usize {
    1000
}

fn default_spool_path() -> PathBuf {
    PathBuf::from("data/seq_mem.jsonl")
}

fn default_spool_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from("data/seq_mem_fallback.jsonl")
}

fn default_replay_batch() -> usize {
    1000
}

fn default_ch_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ch_port() -> u16 {
    9000
}

fn default_database() -> String {
    "seq".to_string()
}

fn default_table() -> String {
    "mem_events".to_string()
}

fn default_compression() -> String {
    "none".to_string()
}

fn default_http_timeout() -> Duration {
    Duration::from_millis(2500)
}

fn default_health_addr() -> String {
    ":9090".to_string()
}

// --- Default trait implementations ---

impl Default for Config {
    fn default() -> Self {
        Self {
            session_id: None,
            store: StoreConfig::default(),
            ingest: IngestConfig::default(),
            writer: WriterConfig::default(),
            sink: SinkConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            initial_size: default_store_initial_size(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: default_dedup_window_ms(),
            dedup_capacity: default_dedup_capacity(),
            tail_capacity: default_tail_capacity(),
            pending_capacity: default_pending_capacity(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            tick: default_tick(),
            max_batch: default_max_batch(),
            commit_interval: default_commit_interval(),
            maintenance_interval: default_maintenance_interval(),
            ttl_days: default_ttl_days(),
            max_deletes_per_pass: default_max_deletes(),
        }
    }
}

impl SinkConfig {
    /// `mode` with `Auto` settled by whether `http.url` is set.
    pub fn effective_mode(&self) -> SinkMode {
        self.mode.resolve(!self.http.url.is_empty())
    }

    /// Transport for the native channel. `Auto` only ever resolves to the
    /// HTTP interface, since that is what its URL addresses.
    pub fn native_kind(&self) -> NativeKind {
        match self.mode {
            SinkMode::Auto => NativeKind::Http,
            _ => self.native,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::default(),
            spool_path: default_spool_path(),
            spool_max_bytes: default_spool_max_bytes(),
            fallback_path: default_fallback_path(),
            replay_batch: default_replay_batch(),
            native: NativeKind::default(),
            clickhouse: ClickHouseConfig::default(),
            http: HttpSinkConfig::default(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: default_ch_host(),
            port: default_ch_port(),
            database: default_database(),
            table: default_table(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: default_database(),
            table: default_table(),
            headers: HashMap::new(),
            compression: default_compression(),
            timeout: default_http_timeout(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_health_addr(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file, overlay the environment and
    /// validate.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let mut cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.apply_env();
        cfg.validate()?;

        Ok(cfg)
    }

    /// Overlays `SEQ_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlays variables from `lookup`. Empty values are ignored and
    /// unparseable numbers are skipped with a warning.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("SEQ_MEM_WAX_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = get("SEQ_CH_MEM_PATH") {
            self.sink.spool_path = PathBuf::from(v);
        }
        if let Some(v) = get("SEQ_CH_MODE") {
            self.sink.mode = SinkMode::parse(&v);
        }
        if let Some(v) = get("SEQ_MEM_SESSION_ID") {
            self.session_id = Some(v);
        }
        if let Some(v) = parse_env(&get, "SEQ_MEM_TTL_DAYS") {
            self.writer.ttl_days = v;
        }
        if let Some(v) = parse_env(&get, "SEQ_MEM_DEDUP_WINDOW_MS") {
            self.ingest.dedup_window_ms = v;
        }
        if let Some(v) = parse_env(&get, "SEQ_MEM_DEDUP_CAPACITY") {
            self.ingest.dedup_capacity = v;
        }
        if let Some(v) = get("SEQ_CH_HOST") {
            self.sink.clickhouse.host = v;
        }
        if let Some(v) = parse_env(&get, "SEQ_CH_PORT") {
            self.sink.clickhouse.port = v;
        }
        if let Some(v) = get("SEQ_CH_DATABASE") {
            self.sink.clickhouse.database = v.clone();
            self.sink.http.database = v;
        }
        if let Some(v) = get("SEQ_MEM_REMOTE_URL") {
            self.sink.http.url = v;
            self.sink.native = NativeKind::Http;
        }
        if let Some(v) = parse_env(&get, "SEQ_MEM_LOCAL_TAIL_MAX_BYTES") {
            self.sink.spool_max_bytes = v;
        }
        if let Some(v) = get("SEQ_MEM_REMOTE_FALLBACK_PATH") {
            self.sink.fallback_path = PathBuf::from(v);
        }
        if let Some(v) = parse_env(&get, "SEQ_MEM_REMOTE_DRAIN_BATCH_SIZE") {
            self.sink.replay_batch = v;
        }
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.writer.tick.is_zero() {
            bail!("writer.tick must be positive");
        }

        if self.writer.max_batch == 0 {
            bail!("writer.max_batch must be positive");
        }

        if self.ingest.pending_capacity == 0 {
            bail!("ingest.pending_capacity must be positive");
        }

        if self.store.path.as_os_str().is_empty() {
            bail!("store.path is required");
        }

        if !matches!(
            self.sink.http.compression.as_str(),
            "" | "none" | "gzip" | "zstd" | "zlib" | "snappy"
        ) {
            bail!(
                "sink.http.compression must be one of none, gzip, zstd, zlib, snappy (got {:?})",
                self.sink.http.compression
            );
        }

        if self.sink.effective_mode().uses_native()
            && self.sink.native_kind() == NativeKind::Http
            && self.sink.http.url.is_empty()
        {
            bail!("sink.http.url is required when sink.native is http");
        }

        if self.health.enabled && self.health.addr.is_empty() {
            bail!("health.addr is required when health is enabled");
        }

        Ok(())
    }

    /// Configured session id, or a freshly generated one.
    pub fn resolve_session_id(&self) -> String {
        match &self.session_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => generate_session_id(),
        }
    }

    /// Time-to-live for persisted frames, if maintenance is enabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.writer.ttl_days > 0)
            .then(|| Duration::from_secs(self.writer.ttl_days.saturating_mul(86_400)))
    }
}

fn parse_env<T, G>(get: &G, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring unparseable environment value");
            None
        }
    }
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates `<utc timestamp>-<8 hex>`.
pub fn generate_session_id() -> String {
    let now = chrono::Utc::now();
    let seq = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hasher.finalize();

    format!(
        "{}-{:02x}{:02x}{:02x}{:02x}",
        now.format("%Y%m%dT%H%M%SZ"),
        digest[0],
        digest[1],
        digest[2],
        digest[3],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.ingest.dedup_window_ms, 250);
        assert_eq!(cfg.ingest.dedup_capacity, 4096);
        assert_eq!(cfg.ingest.tail_capacity, 512);
        assert_eq!(cfg.writer.tick, Duration::from_millis(50));
        assert_eq!(cfg.writer.max_batch, 256);
        assert_eq!(cfg.writer.commit_interval, Duration::from_secs(1));
        assert_eq!(cfg.writer.maintenance_interval, Duration::from_secs(600));
        assert_eq!(cfg.writer.ttl_days, 30);
        assert_eq!(cfg.sink.mode, SinkMode::Auto);
        assert_eq!(cfg.sink.effective_mode(), SinkMode::File);
        assert_eq!(cfg.sink.fallback_path, PathBuf::from("data/seq_mem_fallback.jsonl"));
        assert_eq!(cfg.sink.replay_batch, 1000);
        assert_eq!(cfg.sink.clickhouse.host, "127.0.0.1");
        assert_eq!(cfg.sink.clickhouse.port, 9000);
        assert_eq!(cfg.sink.clickhouse.database, "seq");
        assert_eq!(cfg.sink.spool_max_bytes, 50 * 1024 * 1024);
        assert!(!cfg.health.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_overrides() {
        let yaml = r#"
session_id: fixed
writer:
  tick: 20ms
  commit_interval: 2s
sink:
  mode: dual
  native: http
  http:
    url: http://ch:8123
    compression: zstd
health:
  enabled: true
"#;
        let cfg: Config = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(cfg.session_id.as_deref(), Some("fixed"));
        assert_eq!(cfg.writer.tick, Duration::from_millis(20));
        assert_eq!(cfg.writer.commit_interval, Duration::from_secs(2));
        assert_eq!(cfg.writer.max_batch, 256);
        assert_eq!(cfg.sink.mode, SinkMode::Mirror);
        assert_eq!(cfg.sink.native, NativeKind::Http);
        assert_eq!(cfg.sink.http.table, "mem_events");
        assert!(cfg.health.enabled);
        assert_eq!(cfg.health.addr, ":9090");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[
            ("SEQ_MEM_WAX_PATH", "/tmp/x.sqmf"),
            ("SEQ_CH_MEM_PATH", "/tmp/x.jsonl"),
            ("SEQ_CH_MODE", "remote-only"),
            ("SEQ_MEM_SESSION_ID", "abc"),
            ("SEQ_MEM_TTL_DAYS", "0"),
            ("SEQ_MEM_DEDUP_WINDOW_MS", "100"),
            ("SEQ_MEM_DEDUP_CAPACITY", "8"),
            ("SEQ_CH_HOST", "ch.internal"),
            ("SEQ_CH_PORT", "9440"),
            ("SEQ_CH_DATABASE", "telemetry"),
            ("SEQ_MEM_LOCAL_TAIL_MAX_BYTES", "1024"),
            ("SEQ_MEM_REMOTE_FALLBACK_PATH", "/tmp/fallback.jsonl"),
            ("SEQ_MEM_REMOTE_DRAIN_BATCH_SIZE", "25"),
        ]));

        assert_eq!(cfg.store.path, PathBuf::from("/tmp/x.sqmf"));
        assert_eq!(cfg.sink.spool_path, PathBuf::from("/tmp/x.jsonl"));
        assert_eq!(cfg.sink.mode, SinkMode::Native);
        assert_eq!(cfg.session_id.as_deref(), Some("abc"));
        assert_eq!(cfg.writer.ttl_days, 0);
        assert!(cfg.ttl().is_none());
        assert_eq!(cfg.ingest.dedup_window_ms, 100);
        assert_eq!(cfg.ingest.dedup_capacity, 8);
        assert_eq!(cfg.sink.clickhouse.host, "ch.internal");
        assert_eq!(cfg.sink.clickhouse.port, 9440);
        assert_eq!(cfg.sink.clickhouse.database, "telemetry");
        assert_eq!(cfg.sink.http.database, "telemetry");
        assert_eq!(cfg.sink.native, NativeKind::Clickhouse);
        assert_eq!(cfg.sink.spool_max_bytes, 1024);
        assert_eq!(cfg.sink.fallback_path, PathBuf::from("/tmp/fallback.jsonl"));
        assert_eq!(cfg.sink.replay_batch, 25);
    }

    #[test]
    fn test_env_remote_url_selects_http() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[("SEQ_MEM_REMOTE_URL", "http://ch:8123")]));
        assert_eq!(cfg.sink.native, NativeKind::Http);
        assert_eq!(cfg.sink.http.url, "http://ch:8123");
        // The default auto mode picks the remote up without SEQ_CH_MODE.
        assert_eq!(cfg.sink.effective_mode(), SinkMode::Native);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_env_bad_numbers_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[
            ("SEQ_MEM_TTL_DAYS", "forever"),
            ("SEQ_CH_PORT", "99999"),
            ("SEQ_MEM_DEDUP_WINDOW_MS", ""),
        ]));
        assert_eq!(cfg.writer.ttl_days, 30);
        assert_eq!(cfg.sink.clickhouse.port, 9000);
        assert_eq!(cfg.ingest.dedup_window_ms, 250);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut cfg = Config::default();
        cfg.writer.max_batch = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let mut cfg = Config::default();
        cfg.writer.tick = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_compression() {
        let mut cfg = Config::default();
        cfg.sink.http.compression = "brotli".to_string();
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("compression"));
    }

    #[test]
    fn test_validate_requires_http_url() {
        let mut cfg = Config::default();
        cfg.sink.mode = SinkMode::Native;
        cfg.sink.native = NativeKind::Http;
        assert!(cfg.validate().is_err());

        // Not needed when the native channel is unused.
        cfg.sink.mode = SinkMode::File;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_session_id_shape() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        let (stamp, suffix) = a.rsplit_once('-').expect("dash");
        assert_eq!(stamp.len(), "20260101T000000Z".len());
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolve_session_id_prefers_configured() {
        let cfg = Config {
            session_id: Some(" pinned ".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_session_id(), "pinned");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seqmem.yaml");
        std::fs::write(&path, "ingest:\n  tail_capacity: 64\n").expect("write");
        let cfg = Config::load(&path).expect("load");
        assert_eq!(cfg.ingest.tail_capacity, 64);
    }
}
