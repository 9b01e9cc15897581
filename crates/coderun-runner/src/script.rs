//! Engine construction and the capabilities bound into it.
//!
//! A script can reach exactly what is registered here: the `bitable`
//! object, `log` (plus `print`/`debug`), `http`, and module loading when it
//! is enabled. Nothing else of the host is visible.
//!
//! `log` takes up to 16 arguments; more than that fails the call.

use std::sync::Arc;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::packages::{Package, StandardPackage};
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Map, NativeCallContext, ParseError};
use serde::Deserialize;
use tokio::runtime::Handle;

use coderun_relay::RelayCall;

use crate::bridge::{BridgeFuture, HostBridge, RecordFields, TableInfo};
use crate::console::RunLog;
use crate::http::HttpRoute;
use crate::modules::UrlModuleResolver;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// The `bitable` object seen by scripts
#[derive(Clone)]
pub(crate) struct Bitable {
    bridge: Arc<dyn HostBridge>,
    handle: Handle,
}

impl Bitable {
    pub(crate) fn new(bridge: Arc<dyn HostBridge>, handle: Handle) -> Self {
        Self { bridge, handle }
    }

    /// Drive a bridge call from the blocking worker
    fn wait<T>(&self, call: BridgeFuture<'_, T>) -> ScriptResult<T> {
        self.handle.block_on(call).map_err(|e| e.to_string().into())
    }

    fn active_table(&mut self) -> ScriptResult<Table> {
        let info = self.wait(self.bridge.active_table())?;
        Ok(Table {
            bitable: self.clone(),
            info,
        })
    }

    fn language(&mut self) -> ScriptResult<String> {
        self.wait(self.bridge.language())
    }
}

/// A table handle returned by `bitable.active_table()`
#[derive(Clone)]
pub(crate) struct Table {
    bitable: Bitable,
    info: TableInfo,
}

#[derive(Deserialize)]
struct NewRecord {
    #[serde(default)]
    fields: RecordFields,
}

impl Table {
    fn record_ids(&mut self) -> ScriptResult<Dynamic> {
        let ids = self
            .bitable
            .wait(self.bitable.bridge.record_ids(&self.info.id))?;
        to_dynamic(ids)
    }

    fn field_meta_list(&mut self) -> ScriptResult<Dynamic> {
        let fields = self
            .bitable
            .wait(self.bitable.bridge.field_meta_list(&self.info.id))?;
        to_dynamic(fields)
    }

    fn add_record(&mut self, record: Map) -> ScriptResult<String> {
        let record: NewRecord = from_dynamic(&Dynamic::from_map(record))?;
        self.bitable
            .wait(self.bitable.bridge.add_record(&self.info.id, record.fields))
    }
}

/// Everything a single run binds into its engine
pub(crate) struct Capabilities {
    pub log: Arc<RunLog>,
    pub http: Arc<HttpRoute>,
    pub modules: Option<UrlModuleResolver>,
    pub handle: Handle,
    pub max_operations: Option<u64>,
}

pub(crate) fn build_engine(caps: &Capabilities) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(StandardPackage::new().as_shared_module());
    if let Some(max) = caps.max_operations {
        engine.set_max_operations(max);
    }

    engine
        .register_type_with_name::<Bitable>("Bitable")
        .register_fn("active_table", Bitable::active_table)
        .register_fn("language", Bitable::language);

    engine
        .register_type_with_name::<Table>("Table")
        .register_fn("id", |t: &mut Table| t.info.id.clone())
        .register_fn("name", |t: &mut Table| t.info.name.clone())
        .register_get("id", |t: &mut Table| t.info.id.clone())
        .register_get("name", |t: &mut Table| t.info.name.clone())
        .register_fn("record_ids", Table::record_ids)
        .register_fn("field_meta_list", Table::field_meta_list)
        .register_fn("add_record", Table::add_record);

    register_log(&mut engine, &caps.log);

    let http = caps.http.clone();
    let handle = caps.handle.clone();
    engine.register_fn("http", move |request: Map| -> ScriptResult<String> {
        let call: RelayCall = from_dynamic(&Dynamic::from_map(request))?;
        handle
            .block_on(http.call(&call))
            .map_err(|e| e.to_string().into())
    });

    match &caps.modules {
        Some(resolver) => {
            engine.set_module_resolver(resolver.clone());
            let resolver = resolver.clone();
            engine.register_fn(
                "load_module",
                move |ctx: NativeCallContext, url: ImmutableString| -> ScriptResult<Map> {
                    resolver.load_exports(ctx.engine(), &url)
                },
            );
        }
        None => {
            engine.set_module_resolver(DummyModuleResolver::new());
        }
    }

    engine
}

macro_rules! register_log {
    ($engine:expr, $log:expr, $($arg:ident),*) => {{
        let log = Arc::clone($log);
        $engine.register_fn("log", move |$($arg: Dynamic),*| log.push(&concat(&[$($arg),*])));
    }};
}

/// Register `log` for 0 to 16 arguments. `log()` writes an empty line.
fn register_log(engine: &mut Engine, log: &Arc<RunLog>) {
    register_log!(engine, log,);
    register_log!(engine, log, a);
    register_log!(engine, log, a, b);
    register_log!(engine, log, a, b, c);
    register_log!(engine, log, a, b, c, d);
    register_log!(engine, log, a, b, c, d, e);
    register_log!(engine, log, a, b, c, d, e, f);
    register_log!(engine, log, a, b, c, d, e, f, g);
    register_log!(engine, log, a, b, c, d, e, f, g, h);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i, j);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i, j, k);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i, j, k, l);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i, j, k, l, m);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i, j, k, l, m, n);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i, j, k, l, m, n, o);
    register_log!(engine, log, a, b, c, d, e, f, g, h, i, j, k, l, m, n, o, p);

    let printed = Arc::clone(log);
    engine.on_print(move |text| printed.push(text));
    let debugged = Arc::clone(log);
    engine.on_debug(move |text, _source, _pos| debugged.push(text));
}

fn concat(values: &[Dynamic]) -> String {
    values.iter().map(render).collect()
}

/// Log form of a value: maps and arrays as JSON, the rest as displayed
pub(crate) fn render(value: &Dynamic) -> String {
    if (value.is_map() || value.is_array())
        && let Ok(json) = serde_json::to_string(value)
    {
        return json;
    }
    if let Some(table) = value.clone().try_cast::<Table>()
        && let Ok(json) = serde_json::to_string(&table.info)
    {
        return json;
    }
    value.to_string()
}

/// Message text of an evaluation error, without position or call wrapping
pub(crate) fn error_message(err: &EvalAltResult) -> String {
    match err.unwrap_inner() {
        EvalAltResult::ErrorRuntime(value, _) => render(value),
        inner => {
            let text = inner.to_string();
            let pos = inner.position();
            if pos.is_none() {
                return text;
            }
            let suffix = format!(" ({pos})");
            match text.strip_suffix(&suffix) {
                Some(stripped) => stripped.to_string(),
                None => text,
            }
        }
    }
}

pub(crate) fn parse_message(err: &ParseError) -> String {
    err.0.to_string()
}
