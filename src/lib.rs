//! In-process telemetry capture engine.
//!
//! Callers record fixed-shape events through a [`Recorder`]. Events are
//! counted, deduplicated by content and queued; a background task batches
//! them into an append-only frame store and mirrors rows to an analytical
//! sink. Recording never blocks on I/O and never fails.

pub mod clock;
pub mod config;
pub mod engine;
pub mod export;
pub mod ingest;
pub mod persist;
pub mod query;
pub mod record;
pub mod sink;
pub mod store;

pub use config::Config;
pub use engine::{Engine, Recorder};
pub use record::{decode, encode, Event, Record};
