// flowgrid-api: async client for the external L3 routing service REST API.
//
// Everything the controller knows about the routing service goes through
// this crate: topology and port-descriptor queries, idempotent interface
// and route provisioning, and the retry discipline shared by all of them.
// Response shapes vary across deployments; the `models` module normalizes
// them into canonical records so the core never sees the variance.

pub mod client;
pub mod error;
pub mod models;
pub mod retry;
pub mod router;

mod inspect;

pub use client::{Applied, RoutingClient};
pub use error::Error;
pub use models::{Dpid, PortDesc, PortNo};
pub use retry::RetryPolicy;
pub use router::Ensure;
