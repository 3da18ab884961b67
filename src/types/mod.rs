// ABOUTME: Validated domain types for remote targets.
// ABOUTME: Endpoints and user@host targets are checked once at construction.

mod endpoint;
mod target;

pub use endpoint::{DEFAULT_SSH_PORT, Endpoint, EndpointError};
pub use target::{Target, TargetError};
