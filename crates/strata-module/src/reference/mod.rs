//! In-memory reference engine
//!
//! A complete [`Engine`] over a tiny module language:
//!
//! ```text
//! import { a, b as c } from "dep" with { type: "json" };
//! import "side-effect";
//! let local = 1;
//! export let answer = a;
//! await 0;
//! throw "boom";
//! ```
//!
//! Records live in an index arena behind a `parking_lot` mutex shared by the
//! engine, its namespaces and the futures it hands out.

mod arena;
mod cache;
mod evaluate;
mod lexer;
mod namespace;
mod parser;
mod unit;
mod value;

pub use cache::CACHE_FORMAT_VERSION;
pub use namespace::Namespace;
pub use value::{ErrorKind, Value};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{self, LocalBoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::module::{
    raw, Engine, EngineError, EngineResult, EvaluationSteps, ModuleRequest, RawStatus, SourceText,
};

use arena::{Arena, ModuleRecord, RecordBody};
use evaluate::{evaluate_graph, set_synthetic_export};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a record in a [`ReferenceEngine`].
///
/// Arena slots are reused after [`ReferenceEngine::collect`]; the generation
/// keeps a stale handle from reaching the slot's new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId {
    index: u32,
    generation: u32,
}

impl ModuleId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}.{}", self.index, self.generation)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContextId(u32);

/// Isolated environment modules are compiled into.
///
/// Modules may only import modules of the same context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    engine_id: u64,
    id: ContextId,
    name: String,
}

impl Context {
    /// Name given at creation; the default context is called `default`
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Engine configuration.
///
/// Deserializable so hosts can embed it in their own config files; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Accept and produce cached data
    pub enable_cached_data: bool,
    /// Deepest dependency chain evaluation will follow
    pub max_graph_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enable_cached_data: true,
            max_graph_depth: 1024,
        }
    }
}

/// Counters kept by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Records currently held
    pub modules: usize,
    /// Modules moved to `linked`
    pub instantiations: usize,
    /// Modules that finished evaluating
    pub evaluations: usize,
    /// Compilations skipped thanks to cached data
    pub cache_hits: usize,
}

/// The reference [`Engine`] implementation.
pub struct ReferenceEngine {
    id: u64,
    shared: Arc<Mutex<Arena>>,
    default_context: Context,
}

impl ReferenceEngine {
    /// Engine with default options
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Engine configured by `options`
    pub fn with_options(options: EngineOptions) -> Self {
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let mut arena = Arena::new(options);
        let default_context = Context {
            engine_id: id,
            id: ContextId(0),
            name: "default".to_string(),
        };
        arena
            .contexts
            .insert(default_context.id, default_context.name.clone());
        log::debug!("reference engine {} created", id);
        Self {
            id,
            shared: Arc::new(Mutex::new(arena)),
            default_context,
        }
    }

    /// Create a new isolated context.
    pub fn create_context(&self, name: impl Into<String>) -> Context {
        let name = name.into();
        let mut arena = self.shared.lock();
        let id = ContextId(arena.contexts.len() as u32);
        arena.contexts.insert(id, name.clone());
        log::debug!("engine {}: context '{}' created", self.id, name);
        Context {
            engine_id: self.id,
            id,
            name,
        }
    }

    /// Context used when a module is created without one
    pub fn default_context(&self) -> &Context {
        &self.default_context
    }

    /// Options the engine was created with
    pub fn options(&self) -> EngineOptions {
        self.shared.lock().options.clone()
    }

    /// Snapshot of the engine counters
    pub fn stats(&self) -> EngineStats {
        self.shared.lock().stats
    }

    /// Free released records no live record can reach; returns how many.
    ///
    /// Cycles among released records are freed together.
    pub fn collect(&self) -> usize {
        let collected = self.shared.lock().collect();
        if collected > 0 {
            log::debug!("engine {}: collected {} module(s)", self.id, collected);
        }
        collected
    }

    fn resolve_context(&self, context: Option<&Context>) -> EngineResult<ContextId> {
        let context = context.unwrap_or(&self.default_context);
        if !self.is_context(context) {
            return Err(EngineError::InvalidContext);
        }
        Ok(context.id)
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceEngine")
            .field("id", &self.id)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Engine for ReferenceEngine {
    type Handle = ModuleId;
    type Context = Context;
    type Value = Value;
    type Namespace = Namespace;
    type Evaluation = LocalBoxFuture<'static, Result<(), Value>>;

    fn is_context(&self, context: &Context) -> bool {
        context.engine_id == self.id && self.shared.lock().contexts.contains_key(&context.id)
    }

    fn compile_source(
        &self,
        identifier: &str,
        context: Option<&Context>,
        source: SourceText<'_>,
    ) -> EngineResult<ModuleId> {
        let context = self.resolve_context(context)?;
        let source_hash = cache::source_hash(source.text);

        let unit = match source.cached_data {
            Some(bytes) => {
                if !self.shared.lock().options.enable_cached_data {
                    return Err(EngineError::CachedDataRejected(identifier.to_string()));
                }
                let unit = cache::decode(bytes, &source_hash)
                    .ok_or_else(|| EngineError::CachedDataRejected(identifier.to_string()))?;
                self.shared.lock().stats.cache_hits += 1;
                unit
            }
            None => parser::parse(source.text).map_err(|err| {
                let (line, column) = err.span.position(source.line_offset, source.column_offset);
                EngineError::Syntax {
                    identifier: identifier.to_string(),
                    message: err.message,
                    line,
                    column,
                }
            })?,
        };

        let body = RecordBody::Source {
            unit: Arc::new(unit),
            source_hash,
        };
        let id = self
            .shared
            .lock()
            .insert(ModuleRecord::new(identifier.to_string(), context, body));
        log::trace!("compiled '{}' as {}", identifier, id);
        Ok(id)
    }

    fn create_synthetic(
        &self,
        identifier: &str,
        context: Option<&Context>,
        export_names: &[String],
        steps: EvaluationSteps<Value>,
    ) -> EngineResult<ModuleId> {
        let context = self.resolve_context(context)?;
        for (i, name) in export_names.iter().enumerate() {
            if name.is_empty() || export_names[..i].contains(name) {
                return Err(EngineError::NotModule(format!(
                    "invalid export name '{}' for synthetic module '{}'",
                    name, identifier
                )));
            }
        }

        let body = RecordBody::Synthetic {
            export_names: export_names.to_vec(),
            steps,
        };
        let id = self
            .shared
            .lock()
            .insert(ModuleRecord::new(identifier.to_string(), context, body));
        log::trace!("created synthetic '{}' as {}", identifier, id);
        Ok(id)
    }

    fn release(&self, handle: ModuleId) {
        if let Ok(record) = self.shared.lock().record_mut(handle) {
            record.released = true;
        }
    }

    fn status(&self, handle: ModuleId) -> RawStatus {
        self.shared
            .lock()
            .record(handle)
            .map(|record| record.status.to_raw())
            .unwrap_or(raw::ERRORED)
    }

    fn error(&self, handle: ModuleId) -> Option<Value> {
        self.shared
            .lock()
            .record(handle)
            .ok()
            .and_then(|record| record.error.clone())
    }

    fn is_graph_async(&self, handle: ModuleId) -> bool {
        self.shared
            .lock()
            .record(handle)
            .is_ok_and(|record| record.graph_async)
    }

    fn module_requests(&self, handle: ModuleId) -> Vec<ModuleRequest> {
        self.shared
            .lock()
            .record(handle)
            .map(|record| record.requests().to_vec())
            .unwrap_or_default()
    }

    fn link(&self, handle: ModuleId, names: &[&str], dependencies: &[ModuleId]) -> EngineResult<()> {
        self.shared.lock().link(handle, names, dependencies)
    }

    fn instantiate_sync(&self, handle: ModuleId) -> Result<(), Value> {
        self.shared.lock().instantiate(handle)
    }

    fn evaluate_sync(&self, handle: ModuleId) -> Result<(), Value> {
        if self.is_graph_async(handle) {
            return Err(Value::error(
                ErrorKind::TypeError,
                "Module graph contains top-level await and must be evaluated asynchronously",
            ));
        }
        evaluate_graph(&self.shared, handle)
    }

    fn evaluate(&self, handle: ModuleId) -> Self::Evaluation {
        // Awaited values are already settled, so the graph runs to completion
        // here and the future only reports the outcome
        future::ready(evaluate_graph(&self.shared, handle)).boxed_local()
    }

    fn namespace(&self, handle: ModuleId) -> EngineResult<Namespace> {
        let arena = self.shared.lock();
        let record = arena.record(handle)?;
        if !record.instantiated {
            return Err(EngineError::NamespaceUnavailable(record.identifier.clone()));
        }
        Ok(Namespace::new(Arc::clone(&self.shared), handle))
    }

    fn set_export(&self, handle: ModuleId, name: &str, value: Value) -> EngineResult<()> {
        set_synthetic_export(&mut self.shared.lock(), handle, name, value)
    }

    fn create_cached_data(&self, handle: ModuleId) -> EngineResult<Vec<u8>> {
        let arena = self.shared.lock();
        let record = arena.record(handle)?;
        if !arena.options.enable_cached_data {
            return Err(EngineError::CannotCreateCachedData(record.identifier.clone()));
        }
        match &record.body {
            RecordBody::Source { unit, source_hash } => cache::encode(source_hash, unit)
                .map_err(|err| {
                    log::warn!("serializing '{}' failed: {}", record.identifier, err);
                    EngineError::CannotCreateCachedData(record.identifier.clone())
                }),
            RecordBody::Synthetic { .. } => {
                Err(EngineError::CannotCreateCachedData(record.identifier.clone()))
            }
        }
    }
}
