//! Local dashboard for the burrow tunnel client.
//!
//! The tunnel client owns a [`publisher::StatusPublisher`] and reports state
//! changes through it; every open browser tab receives them over `/_ws`.

pub mod app;
pub mod http;
pub mod publisher;
pub mod shutdown;
pub mod ws;

/// Version string reported as `client_version`.
pub fn client_version() -> String {
    format!("{}+{}", env!("CARGO_PKG_VERSION"), env!("BURROW_GIT_SHA"))
}
