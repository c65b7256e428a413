//! Service layer: pipeline orchestration.
//!
//! [`IngestService`] drives a request through decoding, identity
//! resolution, registration upserts and the telemetry batch write.

pub mod identity_gate;
pub mod ingest_service;
pub mod telemetry_writer;
pub mod upsert;

pub use identity_gate::IdentityGate;
pub use ingest_service::{IngestReport, IngestService};
pub use telemetry_writer::TelemetryWriter;
pub use upsert::UpsertEngine;
