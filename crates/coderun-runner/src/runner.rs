//! Running snippets.
//!
//! Every run builds a fresh engine, evaluates on a blocking worker and
//! writes into its own [`RunLog`]. Runs may overlap; each is told apart by
//! its [`RunId`].

use std::sync::Arc;

use rhai::{AST, CallFnOptions, Dynamic, Scope};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::bridge::HostBridge;
use crate::console::{Console, ConsoleEvent, RunId, RunLog, RunOutput, RunPhase};
use crate::http::HttpRoute;
use crate::modules::{ModuleFetcher, UrlModuleResolver};
use crate::script::{Bitable, Capabilities, build_engine, error_message, parse_message};

const ENTRY_POINT: &str = "main";

/// Runs snippets against a host bridge
#[derive(Clone)]
pub struct Runner {
    inner: Arc<Inner>,
}

struct Inner {
    bridge: Arc<dyn HostBridge>,
    http: Arc<HttpRoute>,
    fetcher: Option<Arc<dyn ModuleFetcher>>,
    max_operations: Option<u64>,
    console: Arc<Console>,
}

pub struct RunnerBuilder {
    bridge: Arc<dyn HostBridge>,
    http: HttpRoute,
    fetcher: Option<Arc<dyn ModuleFetcher>>,
    max_operations: Option<u64>,
}

impl RunnerBuilder {
    /// Enable `import` and `load_module` through this fetcher
    pub fn modules(mut self, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Cap the number of operations per run
    pub fn max_operations(mut self, max: Option<u64>) -> Self {
        self.max_operations = max;
        self
    }

    pub fn build(self) -> Runner {
        Runner {
            inner: Arc::new(Inner {
                bridge: self.bridge,
                http: Arc::new(self.http),
                fetcher: self.fetcher,
                max_operations: self.max_operations,
                console: Arc::new(Console::new()),
            }),
        }
    }
}

/// A run in flight
pub struct RunHandle {
    run: RunId,
    join: JoinHandle<RunOutput>,
    console: Arc<Console>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.run
    }

    pub async fn wait(self) -> RunOutput {
        match self.join.await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(run = %self.run, "run aborted: {e}");
                let output = RunOutput {
                    run: self.run,
                    logs: String::new(),
                    error: Some(format!("run aborted: {e}")),
                };
                self.console.finish(output.clone());
                output
            }
        }
    }
}

impl Runner {
    pub fn builder(bridge: Arc<dyn HostBridge>, http: HttpRoute) -> RunnerBuilder {
        RunnerBuilder {
            bridge,
            http,
            fetcher: None,
            max_operations: None,
        }
    }

    pub fn bridge(&self) -> &Arc<dyn HostBridge> {
        &self.inner.bridge
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.inner.console
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.inner.console.subscribe()
    }

    /// Run `source` to completion
    pub async fn run(&self, source: impl Into<String>) -> RunOutput {
        self.spawn(source).wait().await
    }

    /// Start a run without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, source: impl Into<String>) -> RunHandle {
        let source = source.into();
        let run = self.inner.console.begin();
        let inner = Arc::clone(&self.inner);
        let handle = Handle::current();
        let join = tokio::task::spawn_blocking(move || execute(&inner, run, &source, handle));
        RunHandle {
            run,
            join,
            console: Arc::clone(&self.inner.console),
        }
    }
}

fn execute(inner: &Inner, run: RunId, source: &str, handle: Handle) -> RunOutput {
    let console = &inner.console;
    tracing::info!(run = %run, "run started");

    let log = Arc::new(RunLog::new(run, Arc::clone(console)));
    let result = evaluate(inner, run, &log, source, handle);

    let (phase, error) = match result {
        Ok(()) => (RunPhase::Completed, None),
        Err(message) => (RunPhase::Failed, Some(message)),
    };
    console.phase(run, phase);
    match &error {
        None => tracing::info!(run = %run, "run completed"),
        Some(message) => tracing::info!(run = %run, "run failed: {message}"),
    }

    let output = RunOutput {
        run,
        logs: log.take(),
        error,
    };
    console.finish(output.clone());
    output
}

fn evaluate(
    inner: &Inner,
    run: RunId,
    log: &Arc<RunLog>,
    source: &str,
    handle: Handle,
) -> Result<(), String> {
    inner.console.phase(run, RunPhase::Constructing);

    let caps = Capabilities {
        log: Arc::clone(log),
        http: Arc::clone(&inner.http),
        modules: inner
            .fetcher
            .as_ref()
            .map(|f| UrlModuleResolver::new(Arc::clone(f), handle.clone())),
        handle: handle.clone(),
        max_operations: inner.max_operations,
    };
    let engine = build_engine(&caps);
    let ast = engine.compile(source).map_err(|e| parse_message(&e))?;
    let entry = entry_arity(&ast)?;

    inner.console.phase(run, RunPhase::Executing);

    let bitable = Bitable::new(Arc::clone(&inner.bridge), handle);
    let mut scope = Scope::new();
    scope.push("bitable", bitable.clone());

    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| error_message(&e))?;

    if let Some(arity) = entry {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = match arity {
            0 => engine.call_fn_with_options::<Dynamic>(options, &mut scope, &ast, ENTRY_POINT, ()),
            _ => engine.call_fn_with_options::<Dynamic>(
                options,
                &mut scope,
                &ast,
                ENTRY_POINT,
                (bitable,),
            ),
        };
        result.map_err(|e| error_message(&e))?;
    }

    Ok(())
}

/// Parameter count of the declared `main`, if any.
///
/// With several overloads the one taking the bridge wins.
fn entry_arity(ast: &AST) -> Result<Option<usize>, String> {
    let arities: Vec<usize> = ast
        .iter_functions()
        .filter(|f| f.name == ENTRY_POINT)
        .map(|f| f.params.len())
        .collect();

    if arities.is_empty() {
        return Ok(None);
    }
    if arities.contains(&1) {
        return Ok(Some(1));
    }
    if arities.contains(&0) {
        return Ok(Some(0));
    }
    Err(format!("{ENTRY_POINT} must take zero or one parameter"))
}
