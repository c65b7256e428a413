//! Domain layer: wire format, routes and identities.
//!
//! This module holds everything that can be decided without touching
//! storage: the compact `f<digits>` key codec, request splitting and
//! credential validation, the per-route decoders, and the identity types
//! and cache used to attribute readings.

pub mod identity;
pub mod identity_cache;
pub mod key_codec;
pub mod payload;
pub mod request;
pub mod route;

pub use identity::{HubRef, IdentityTuple, ResolvedIds};
pub use identity_cache::IdentityCache;
pub use key_codec::SensorKey;
pub use payload::DecodedPayload;
pub use request::{HardwareCredential, IngestRequest, KeyValuePair};
pub use route::{Route, RouteDecoder};
