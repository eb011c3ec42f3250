use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::ingest::stats::StatsSnapshot;
use crate::ingest::IngestState;
use crate::query;

/// Prometheus metrics for engine health, plus the HTTP server exposing them
/// alongside the JSON query views.
///
/// All metrics use the "seqmem" namespace. Engine counters are mirrored
/// from [`IngestState`] on every scrape and by the stats reporter.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,
    /// Last snapshot mirrored into `engine_events`.
    mirrored: parking_lot::Mutex<StatsSnapshot>,

    /// Engine counters by counter name.
    pub engine_events: IntCounterVec,
    /// Frames waiting for the persistence writer.
    pub pending_frames: IntGauge,
    /// Distinct event names observed.
    pub event_names: IntGauge,
    /// Seconds since the engine started.
    pub uptime_seconds: Gauge,
    /// Whether the native analytical sink channel is in use (1=yes, 0=no).
    pub sink_native_active: IntGauge,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let engine_events = IntCounterVec::new(
            Opts::new("engine_events_total", "Engine counters by name.").namespace("seqmem"),
            &["counter"],
        )?;
        let pending_frames = IntGauge::with_opts(
            Opts::new(
                "pending_frames",
                "Frames waiting for the persistence writer.",
            )
            .namespace("seqmem"),
        )?;
        let event_names = IntGauge::with_opts(
            Opts::new("event_names", "Distinct event names observed.").namespace("seqmem"),
        )?;
        let uptime_seconds = Gauge::with_opts(
            Opts::new("uptime_seconds", "Seconds since the engine started.").namespace("seqmem"),
        )?;
        let sink_native_active = IntGauge::with_opts(
            Opts::new(
                "sink_native_active",
                "Whether the native analytical sink channel is in use (1=yes, 0=no).",
            )
            .namespace("seqmem"),
        )?;

        registry.register(Box::new(engine_events.clone()))?;
        registry.register(Box::new(pending_frames.clone()))?;
        registry.register(Box::new(event_names.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(sink_native_active.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            mirrored: parking_lot::Mutex::new(StatsSnapshot::default()),
            engine_events,
            pending_frames,
            event_names,
            uptime_seconds,
            sink_native_active,
        })
    }

    /// Copies engine counters and gauges from `state`.
    pub fn observe(&self, state: &IngestState) {
        let delta = {
            let mut mirrored = self.mirrored.lock();
            // Snapshot under the lock so concurrent observers mirror in order.
            let current = state.stats().snapshot();
            let delta = current.delta(&mirrored);
            *mirrored = current;
            delta
        };

        for (name, n) in delta.fields() {
            if n > 0 {
                self.engine_events.with_label_values(&[name]).inc_by(n);
            }
        }

        self.pending_frames
            .set(i64::try_from(state.pending_len()).unwrap_or(i64::MAX));
        self.event_names
            .set(i64::try_from(state.aggregates().counts.len()).unwrap_or(i64::MAX));
        self.uptime_seconds.set(state.uptime().as_secs_f64());
    }

    /// Renders the registry in Prometheus text format.
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("encoding metrics")?;
        String::from_utf8(buffer).context("converting metrics to string")
    }

    /// Starts the HTTP server and returns the bound address.
    pub async fn start(self: &Arc<Self>, state: Arc<IngestState>) -> Result<SocketAddr> {
        let addr = if self.addr.is_empty() {
            ":9090"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let app_state = Arc::new(AppState {
            health: Arc::clone(self),
            state,
        });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .route("/v1/metrics", get(metrics_json_handler))
            .route("/v1/tail", get(tail_json_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "health metrics server started");

            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "health metrics server error");
            }
        });

        Ok(local_addr)
    }

    /// Gracefully shuts down the health metrics server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

/// Shared state for axum handlers.
struct AppState {
    health: Arc<HealthMetrics>,
    state: Arc<IngestState>,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    app.health.observe(&app.state);

    match app.health.gather_text() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "encoding metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}

/// GET /v1/metrics - aggregate snapshot as JSON.
async fn metrics_json_handler(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        query::metrics_json(&app.state),
    )
}

#[derive(Debug, Deserialize)]
struct TailQuery {
    max: Option<i32>,
}

/// GET /v1/tail?max=N - recent raw records, decoded.
async fn tail_json_handler(
    State(app): State<Arc<AppState>>,
    Query(params): Query<TailQuery>,
) -> impl IntoResponse {
    let max = params.max.unwrap_or(50);
    (
        [(header::CONTENT_TYPE, "application/json")],
        query::tail_json(&app.state, max),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::ingest::stats::EngineStats;
    use crate::record::Event;

    fn state() -> Arc<IngestState> {
        Arc::new(IngestState::new(
            &IngestConfig::default(),
            "h".into(),
            false,
            Arc::new(EngineStats::new()),
        ))
    }

    #[test]
    fn test_observe_mirrors_deltas() {
        let health = HealthMetrics::new(":0").expect("metrics");
        let st = state();
        st.record(&Event::new("x", 1, 1, true, None));
        st.record(&Event::new("x", 2, 1, true, None));

        health.observe(&st);
        health.observe(&st);

        let recorded = health.engine_events.with_label_values(&["recorded"]).get();
        assert_eq!(recorded, 2);
        assert_eq!(health.event_names.get(), 1);
        assert_eq!(health.pending_frames.get(), 1);

        let text = health.gather_text().expect("text");
        assert!(text.contains("seqmem_engine_events_total{counter=\"recorded\"} 2"));
        assert!(text.contains("seqmem_pending_frames 1"));
    }

    #[test]
    fn test_concurrent_observers_count_each_event_once() {
        let health = Arc::new(HealthMetrics::new(":0").expect("metrics"));
        let st = state();

        let threads: Vec<_> = (0..4u64)
            .map(|t| {
                let health = Arc::clone(&health);
                let st = Arc::clone(&st);
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        st.record(&Event::new("c", t * 1_000_000 + i * 1_000, 1, true, None));
                        health.observe(&st);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("observer thread");
        }
        health.observe(&st);

        let recorded = health.engine_events.with_label_values(&["recorded"]).get();
        assert_eq!(recorded, 2_000);
    }

    #[tokio::test]
    async fn test_server_routes() {
        let health = Arc::new(HealthMetrics::new("127.0.0.1:0").expect("metrics"));
        let st = state();
        st.record(&Event::new("db", 5, 9, true, Some("users")));

        let addr = health.start(st).await.expect("start");
        let base = format!("http://{addr}");
        let client = reqwest::Client::new();

        let body = client
            .get(format!("{base}/healthz"))
            .send()
            .await
            .expect("healthz")
            .text()
            .await
            .expect("body");
        assert_eq!(body, "ok");

        let metrics = client
            .get(format!("{base}/v1/metrics"))
            .send()
            .await
            .expect("metrics")
            .text()
            .await
            .expect("body");
        let metrics: serde_json::Value = serde_json::from_str(&metrics).expect("json");
        assert_eq!(metrics["counts"]["db"], 1);

        let tail = client
            .get(format!("{base}/v1/tail?max=5"))
            .send()
            .await
            .expect("tail")
            .text()
            .await
            .expect("body");
        let tail: serde_json::Value = serde_json::from_str(&tail).expect("json");
        assert_eq!(tail["count"], 1);
        assert_eq!(tail["events"][0]["subject"], "users");

        let text = client
            .get(format!("{base}/metrics"))
            .send()
            .await
            .expect("prom")
            .text()
            .await
            .expect("body");
        assert!(text.contains("seqmem_engine_events_total"));

        health.stop().await.expect("stop");
    }
}
