//! # aquahub-ingest
//!
//! HTTP ingestion gateway for AquaHub IoT hubs.
//!
//! Hubs send telemetry and registration data as query strings of the form
//! `/v1/<route>?api_key=<hardware_token>:<user_token>&<k>=<v>&...`. The
//! service decodes the packed keys, resolves the hub credential to
//! persistent ids, upserts devices and sensors, and stores readings in bulk.
//! Every request is acknowledged with `{"status":"Ok"}`; failures are
//! reported through structured logs only.
//!
//! ## Architecture
//!
//! ```text
//! Hubs (HTTP GET)
//!     │
//!     ├── Handlers (api/)
//!     │
//!     ├── IngestService (service/)
//!     │     ├── RouteDecoder table (domain/route)
//!     │     ├── IdentityGate + IdentityCache
//!     │     ├── UpsertEngine
//!     │     └── TelemetryWriter
//!     │
//!     └── TelemetryStore (persistence/): PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
