//! Local HTTP relay for code running in the sandbox.
//!
//! Scripts cannot reach arbitrary origins themselves, so they describe the
//! call as a [`RelayCall`] and the relay performs it. The same
//! [`Forwarder`] backs the HTTP endpoint and in-process direct calls.

mod call;
mod client;
mod error;
mod forward;
mod server;

pub use call::RelayCall;
pub use client::RelayClient;
pub use error::RelayError;
pub use forward::{Forwarded, Forwarder};
pub use server::{RELAY_PATH, RelayState, build_router, mime_from_extension, serve};
