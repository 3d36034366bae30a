//! Strata module lifecycle
//!
//! This crate wraps a pluggable module-graph engine with a lifecycle-checked
//! module type:
//! - **Module**: construction, linking, evaluation, namespaces and cached
//!   data over any [`Engine`] (`module` module)
//! - **Registry**: owns a set of modules and links/evaluates them as a graph
//!   ([`ModuleRegistry`])
//! - **Reference engine**: an in-memory engine with a small module language
//!   (`reference` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_module::{Module, ReferenceEngine};
//!
//! let engine = Arc::new(ReferenceEngine::new());
//! let dep = Module::source_text(&engine, "dep", "export let x = 42;")?;
//! let main = Module::source_text(&engine, "main", r#"import { x } from "dep"; export let y = x;"#)?;
//!
//! dep.link([])?;
//! main.link([("dep", &dep)])?;
//! main.evaluate()?;
//!
//! assert_eq!(main.namespace()?.get("y"), Some(42.into()));
//! ```

#![warn(rust_2018_idioms)]

pub mod module;
pub mod reference;

pub use module::{
    Engine, EngineError, EngineResult, Evaluation, ExportWriter, Module, ModuleContent,
    ModuleError, ModuleKind, ModuleOptions, ModuleRegistry, ModuleRequest, ModuleResult,
    ModuleStatus,
};
pub use reference::{Context, EngineOptions, EngineStats, ReferenceEngine, Value};
