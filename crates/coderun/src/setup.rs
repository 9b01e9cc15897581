//! Wiring a session from resolved configuration.

use std::sync::Arc;
use std::time::Duration;

use coderun_config::{HttpRoute as RouteSetting, ResolvedConfig};
use coderun_gallery::{FileStore, Gallery, Locale, Workbench};
use coderun_relay::{Forwarder, RelayClient, RelayState};
use coderun_runner::{FixtureBridge, HostBridge, HttpFetcher, HttpRoute, Runner};
use eyre::Result;

use crate::session::Session;

/// How long the host gets to report its language
pub const LOCALE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn build_runner(config: &ResolvedConfig) -> Result<Runner> {
    let bridge: Arc<dyn HostBridge> = match &config.fixture {
        Some(path) => Arc::new(FixtureBridge::load(path)?),
        None => Arc::new(FixtureBridge::default()),
    };

    let timeout = Duration::from_secs(config.relay.timeout_secs);
    let http = match config.runner.http {
        RouteSetting::Direct => HttpRoute::Direct(Forwarder::new(timeout)?),
        RouteSetting::Relay => HttpRoute::Relay(RelayClient::new(
            &config.relay.url,
            config.relay.token.clone(),
            timeout,
        )?),
    };

    let mut builder = Runner::builder(bridge, http).max_operations(config.runner.max_operations);
    if config.runner.modules {
        builder = builder.modules(Arc::new(HttpFetcher::new(timeout)?));
    }
    Ok(builder.build())
}

/// Configured locale, else the host's language, else English
pub async fn resolve_locale(configured: Option<&str>, bridge: &dyn HostBridge) -> Locale {
    if let Some(tag) = configured {
        return Locale::from_tag(tag);
    }
    match tokio::time::timeout(LOCALE_TIMEOUT, bridge.language()).await {
        Ok(Ok(tag)) => Locale::from_tag(&tag),
        Ok(Err(e)) => {
            tracing::warn!("host language unavailable: {e}");
            Locale::En
        }
        Err(_) => {
            tracing::warn!("host language lookup timed out");
            Locale::En
        }
    }
}

pub async fn open_session(config: &ResolvedConfig) -> Result<Session<FileStore>> {
    let runner = build_runner(config)?;
    let locale = resolve_locale(config.locale.as_deref(), runner.bridge().as_ref()).await;
    tracing::debug!(%locale, storage = %config.storage, "opening gallery");

    let gallery = Gallery::new(locale, FileStore::open(config.storage.clone())?);
    Ok(Session::new(Workbench::open(gallery)?, runner))
}

pub fn relay_state(config: &ResolvedConfig) -> Result<RelayState> {
    let forwarder = Forwarder::new(Duration::from_secs(config.relay.timeout_secs))?
        .with_allowed_hosts(config.relay.allowed_hosts.clone());
    Ok(RelayState::new(
        forwarder,
        config.relay.token.clone(),
        config.relay.assets_dir.clone(),
    ))
}
