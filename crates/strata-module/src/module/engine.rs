//! The engine capability a [`super::Module`] drives
//!
//! Everything that touches code lives behind [`Engine`]: compiling source
//! text, discovering requests, walking the graph (cycles, topological order,
//! async taint, dedup of shared dependencies) and running it. The module layer
//! only validates contracts and translates results.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::EngineResult;
use super::status::RawStatus;

/// A dependency declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRequest {
    /// Specifier as written in the source
    pub specifier: String,
    /// Import attributes (`with { type: "json" }`), in source order
    pub attributes: Vec<(String, String)>,
}

impl ModuleRequest {
    /// Request without attributes
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            attributes: Vec::new(),
        }
    }
}

/// Source text plus the compile options that travel with it.
#[derive(Debug, Clone, Copy)]
pub struct SourceText<'a> {
    /// Module source
    pub text: &'a str,
    /// Added to every reported line number
    pub line_offset: i32,
    /// Added to column numbers on the first line
    pub column_offset: i32,
    /// Artifact previously produced by [`Engine::create_cached_data`]
    pub cached_data: Option<&'a [u8]>,
}

impl<'a> SourceText<'a> {
    /// Source with no offsets and no cached data
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            line_offset: 0,
            column_offset: 0,
            cached_data: None,
        }
    }
}

/// Write access to the live export bindings of a synthetic module while its
/// evaluation steps run.
pub trait ExportWriter<V> {
    /// Set export `name` to `value`.
    fn set_export(&self, name: &str, value: V) -> EngineResult<()>;
}

/// Evaluation procedure of a synthetic module.
pub type EvaluationSteps<V> = Arc<dyn Fn(&dyn ExportWriter<V>) -> Result<(), V> + Send + Sync>;

/// The external module-graph engine.
///
/// Handles are cheap, copyable references into the engine's own storage. A
/// handle never owns other handles; dependency edges recorded by [`link`] are
/// engine-side associations, so cyclic graphs are fine.
///
/// [`link`]: Engine::link
pub trait Engine {
    /// Reference to one compiled unit
    type Handle: Copy + Eq + fmt::Debug;
    /// Isolated global environment
    type Context;
    /// Runtime value, also used for thrown errors
    type Value: Clone + fmt::Debug + fmt::Display;
    /// Live namespace object
    type Namespace;
    /// Future returned by asynchronous evaluation
    type Evaluation: Future<Output = Result<(), Self::Value>> + 'static;

    /// Whether `context` is a context of this engine.
    fn is_context(&self, context: &Self::Context) -> bool;

    /// Compile source text into a new module record.
    fn compile_source(
        &self,
        identifier: &str,
        context: Option<&Self::Context>,
        source: SourceText<'_>,
    ) -> EngineResult<Self::Handle>;

    /// Create a synthetic module record exporting `export_names`.
    fn create_synthetic(
        &self,
        identifier: &str,
        context: Option<&Self::Context>,
        export_names: &[String],
        steps: EvaluationSteps<Self::Value>,
    ) -> EngineResult<Self::Handle>;

    /// The owner of `handle` is gone.
    fn release(&self, handle: Self::Handle);

    /// Raw status code, one of [`super::status::raw`].
    fn status(&self, handle: Self::Handle) -> RawStatus;

    /// Error value; only meaningful when errored.
    fn error(&self, handle: Self::Handle) -> Option<Self::Value>;

    /// Whether the reachable graph needs asynchronous evaluation. Only
    /// meaningful once instantiated.
    fn is_graph_async(&self, handle: Self::Handle) -> bool;

    /// Declared requests in source order.
    fn module_requests(&self, handle: Self::Handle) -> Vec<ModuleRequest>;

    /// Record bindings: `names[i]` resolves to `dependencies[i]`.
    fn link(
        &self,
        handle: Self::Handle,
        names: &[&str],
        dependencies: &[Self::Handle],
    ) -> EngineResult<()>;

    /// Instantiate the graph reachable from `handle`.
    fn instantiate_sync(&self, handle: Self::Handle) -> Result<(), Self::Value>;

    /// Evaluate a graph containing no asynchronous module.
    fn evaluate_sync(&self, handle: Self::Handle) -> Result<(), Self::Value>;

    /// Start evaluating a graph asynchronously.
    ///
    /// Evaluation begins inside the call and runs to completion whether or
    /// not the returned future is polled; the future reports the outcome.
    fn evaluate(&self, handle: Self::Handle) -> Self::Evaluation;

    /// Live namespace of an instantiated module.
    fn namespace(&self, handle: Self::Handle) -> EngineResult<Self::Namespace>;

    /// Write into a live synthetic export binding.
    fn set_export(&self, handle: Self::Handle, name: &str, value: Self::Value) -> EngineResult<()>;

    /// Serialize the compiled unit for reuse by a later [`compile_source`].
    ///
    /// [`compile_source`]: Engine::compile_source
    fn create_cached_data(&self, handle: Self::Handle) -> EngineResult<Vec<u8>>;
}

