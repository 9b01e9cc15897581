//! Loading script modules from URLs.
//!
//! Both `import "<url>" as ns;` and `load_module(url)` go through
//! [`UrlModuleResolver`]. A module is fetched, compiled and evaluated once
//! per run; later imports of the same URL reuse it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rhai::{Engine, EvalAltResult, Map, Module, ModuleResolver, Position, Scope, Shared};
use tokio::runtime::Handle;

use crate::error::FetchError;

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;

/// Source of module text
pub trait ModuleFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Fetches modules with a plain GET
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ModuleFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(response.text().await?)
        })
    }
}

/// Fixed URL-to-source table, for tests and offline use
#[derive(Default)]
pub struct StaticFetcher {
    sources: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(url.into(), source.into());
        self
    }
}

impl ModuleFetcher for StaticFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        let result = self
            .sources
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()));
        Box::pin(std::future::ready(result))
    }
}

/// Module resolver that fetches by URL
#[derive(Clone)]
pub struct UrlModuleResolver {
    fetcher: Arc<dyn ModuleFetcher>,
    handle: Handle,
    loaded: Arc<Mutex<HashMap<String, Shared<Module>>>>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl UrlModuleResolver {
    pub fn new(fetcher: Arc<dyn ModuleFetcher>, handle: Handle) -> Self {
        Self {
            fetcher,
            handle,
            loaded: Arc::default(),
            pending: Arc::default(),
        }
    }

    /// Fetch, compile and evaluate `url`, or return the already loaded module
    pub fn load(&self, engine: &Engine, url: &str) -> Result<Shared<Module>, Box<EvalAltResult>> {
        if let Some(module) = self.loaded.lock().get(url) {
            return Ok(module.clone());
        }

        if !self.pending.lock().insert(url.to_string()) {
            return Err(format!("circular import of module {url}").into());
        }
        let result = self.fetch_and_eval(engine, url);
        self.pending.lock().remove(url);

        let module = result?;
        self.loaded.lock().insert(url.to_string(), module.clone());
        Ok(module)
    }

    fn fetch_and_eval(
        &self,
        engine: &Engine,
        url: &str,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        tracing::debug!(url, "fetching module");
        let source = self
            .handle
            .block_on(self.fetcher.fetch(url))
            .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })?;

        let mut ast = engine.compile(&source)?;
        ast.set_source(url);
        Ok(Module::eval_ast_as_new(Scope::new(), &ast, engine)?.into())
    }

    /// Exported variables of the module at `url`
    pub fn load_exports(&self, engine: &Engine, url: &str) -> Result<Map, Box<EvalAltResult>> {
        let module = self.load(engine, url)?;
        Ok(module
            .iter_var()
            .map(|(name, value)| (name.into(), value.clone()))
            .collect())
    }
}

impl ModuleResolver for UrlModuleResolver {
    fn resolve(
        &self,
        engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        self.load(engine, path)
            .map_err(|err| EvalAltResult::ErrorInModule(path.to_string(), err, pos).into())
    }
}
