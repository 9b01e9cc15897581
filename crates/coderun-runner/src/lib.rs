//! Sandboxed snippet runner.
//!
//! Snippets are [rhai](https://rhai.rs) scripts. Each run gets a fresh
//! engine holding only the capabilities bound in `script`: the host bridge,
//! logging, outbound HTTP and, when enabled, URL module loading.

mod bridge;
mod console;
mod error;
mod fixture;
mod http;
mod modules;
mod runner;
mod script;

pub use bridge::{BridgeFuture, FieldMeta, HostBridge, RecordFields, TableInfo};
pub use console::{Console, ConsoleEvent, RunId, RunOutput, RunPhase};
pub use error::{BridgeError, FetchError};
pub use fixture::{FixtureBridge, FixtureRecord, FixtureTable, Workbook};
pub use http::HttpRoute;
pub use modules::{FetchFuture, HttpFetcher, ModuleFetcher, StaticFetcher, UrlModuleResolver};
pub use runner::{RunHandle, Runner, RunnerBuilder};
