//! Module lifecycle layer
//!
//! A [`Module`] names one unit of code, owns the engine handle for it and moves
//! it through `unlinked → linking → linked → evaluating → evaluated` (or
//! `errored`). All graph work is delegated to an [`Engine`]; this layer:
//! - validates the link contract (every declared specifier is bound)
//! - maps raw engine status codes onto [`ModuleStatus`]
//! - picks synchronous or asynchronous evaluation from the graph-wide flag
//! - memoizes the declared import specifiers

mod engine;
mod error;
mod evaluation;
mod options;
mod registry;
mod status;

pub use engine::{Engine, EvaluationSteps, ExportWriter, ModuleRequest, SourceText};
pub use error::{EngineError, EngineResult, ModuleError, ModuleResult};
pub use evaluation::Evaluation;
pub use options::{ModuleContent, ModuleOptions};
pub use registry::ModuleRegistry;
pub use status::{raw, ModuleStatus, RawStatus};

use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use once_cell::unsync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};

/// How a module was constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Compiled from source text
    SourceText,
    /// Exports supplied by the host
    Synthetic,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::SourceText => f.write_str("source text"),
            ModuleKind::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// One lifecycle-tracked unit of code.
///
/// Modules never own each other. Dependency edges are recorded inside the
/// engine as handle associations, so circular imports need no special care
/// here; the engine (or whoever owns its arena) manages graph lifetime.
pub struct Module<E: Engine> {
    identifier: String,
    kind: ModuleKind,
    engine: Arc<E>,
    handle: E::Handle,
    import_specifiers: OnceCell<Vec<String>>,
}

impl<E: Engine> Module<E> {
    /// Construct a module from source text or a synthetic specification.
    ///
    /// # Errors
    /// * [`ModuleError::InvalidContext`] if `options.context` is not a context
    ///   of `engine`
    /// * [`ModuleError::InvalidArgument`] for a malformed synthetic spec
    /// * [`ModuleError::Engine`] for compile failures and rejected cached data
    pub fn new(
        engine: &Arc<E>,
        identifier: impl Into<String>,
        content: ModuleContent<'_, E::Value>,
        options: ModuleOptions<'_, E::Context>,
    ) -> ModuleResult<Self> {
        let identifier = identifier.into();

        if let Some(context) = options.context {
            if !engine.is_context(context) {
                return Err(ModuleError::InvalidContext);
            }
        }

        let (kind, handle) = match content {
            ModuleContent::SourceText(text) => {
                let source = SourceText {
                    text,
                    line_offset: options.line_offset,
                    column_offset: options.column_offset,
                    cached_data: options.cached_data,
                };
                let handle = engine.compile_source(&identifier, options.context, source)?;
                (ModuleKind::SourceText, handle)
            }
            ModuleContent::Synthetic {
                export_names,
                evaluation_steps,
            } => {
                if options.cached_data.is_some() {
                    return Err(ModuleError::InvalidArgument {
                        name: "options.cached_data",
                        reason: "synthetic modules cannot be built from cached data".to_string(),
                    });
                }
                validate_export_names(&export_names)?;
                let handle = engine.create_synthetic(
                    &identifier,
                    options.context,
                    &export_names,
                    evaluation_steps,
                )?;
                (ModuleKind::Synthetic, handle)
            }
        };

        log::debug!("created {} module '{}'", kind, identifier);

        Ok(Self {
            identifier,
            kind,
            engine: Arc::clone(engine),
            handle,
            import_specifiers: OnceCell::new(),
        })
    }

    /// Compile `text` with default options.
    pub fn source_text(
        engine: &Arc<E>,
        identifier: impl Into<String>,
        text: &str,
    ) -> ModuleResult<Self> {
        Self::new(
            engine,
            identifier,
            ModuleContent::SourceText(text),
            ModuleOptions::new(),
        )
    }

    /// Build a synthetic module with default options.
    pub fn synthetic<I, S, F>(
        engine: &Arc<E>,
        identifier: impl Into<String>,
        export_names: I,
        evaluation_steps: F,
    ) -> ModuleResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&dyn ExportWriter<E::Value>) -> Result<(), E::Value> + Send + Sync + 'static,
    {
        Self::new(
            engine,
            identifier,
            ModuleContent::synthetic(export_names, evaluation_steps),
            ModuleOptions::new(),
        )
    }

    /// Identifier given at construction.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Source text or synthetic.
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Engine this module was created in.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ModuleStatus {
        let code = self.engine.status(self.handle);
        ModuleStatus::from_raw(code).unwrap_or_else(|| {
            log::warn!(
                "module '{}': engine reported unknown status code {}",
                self.identifier,
                code
            );
            ModuleStatus::Errored
        })
    }

    /// The error that put this module in `errored`, `None` in any other status.
    pub fn error(&self) -> Option<E::Value> {
        if self.status() != ModuleStatus::Errored {
            return None;
        }
        self.engine.error(self.handle)
    }

    /// Whether the reachable graph needs asynchronous evaluation.
    ///
    /// Always false before the graph is instantiated.
    pub fn is_graph_async(&self) -> bool {
        self.status().is_instantiated() && self.engine.is_graph_async(self.handle)
    }

    /// Declared import specifiers in source order.
    ///
    /// Computed from the engine on first access and frozen afterwards.
    pub fn import_specifiers(&self) -> &[String] {
        self.import_specifiers.get_or_init(|| {
            self.engine
                .module_requests(self.handle)
                .into_iter()
                .map(|request| request.specifier)
                .collect()
        })
    }

    /// Live namespace of the module's exports.
    ///
    /// Only valid once linked; the engine enforces that.
    pub fn namespace(&self) -> ModuleResult<E::Namespace> {
        Ok(self.engine.namespace(self.handle)?)
    }

    /// Bind every declared specifier to a module and instantiate the graph.
    ///
    /// `imports` must cover [`import_specifiers`](Self::import_specifiers)
    /// exactly. Validation happens before the engine is touched, so a rejected
    /// call leaves the module `unlinked`.
    ///
    /// # Errors
    /// * [`ModuleError::Status`] unless the module is `unlinked`
    /// * [`ModuleError::MissingImports`] if a declared specifier is not bound
    /// * [`ModuleError::UnexpectedImports`] if a name matches no specifier
    /// * [`ModuleError::ForeignModule`] if a dependency uses another engine
    /// * [`ModuleError::Link`] if instantiation fails; the module is then
    ///   `errored`
    pub fn link<'m, I>(&self, imports: I) -> ModuleResult<()>
    where
        E: 'm,
        I: IntoIterator<Item = (&'m str, &'m Module<E>)>,
    {
        self.expect_status("link", "unlinked", |status| {
            status == ModuleStatus::Unlinked
        })?;

        let imports: FxHashMap<&str, &Module<E>> = imports.into_iter().collect();
        let specifiers = self.import_specifiers();

        let mut names = Vec::with_capacity(specifiers.len());
        let mut dependencies = Vec::with_capacity(specifiers.len());
        let mut missing = Vec::new();
        for specifier in specifiers {
            match imports.get(specifier.as_str()) {
                Some(dependency) => {
                    names.push(specifier.as_str());
                    dependencies.push(*dependency);
                }
                None => missing.push(specifier.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ModuleError::MissingImports {
                identifier: self.identifier.clone(),
                missing,
            });
        }

        let mut unexpected: Vec<String> = imports
            .keys()
            .filter(|name| !specifiers.iter().any(|specifier| specifier.as_str() == **name))
            .map(|name| name.to_string())
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(ModuleError::UnexpectedImports {
                identifier: self.identifier.clone(),
                unexpected,
            });
        }

        let mut handles = Vec::with_capacity(dependencies.len());
        for (name, dependency) in names.iter().zip(&dependencies) {
            if !Arc::ptr_eq(&self.engine, &dependency.engine) {
                return Err(ModuleError::ForeignModule {
                    identifier: self.identifier.clone(),
                    specifier: name.to_string(),
                });
            }
            handles.push(dependency.handle);
        }

        self.engine.link(self.handle, &names, &handles)?;
        log::debug!(
            "module '{}' bound {} import(s), instantiating",
            self.identifier,
            names.len()
        );

        self.engine
            .instantiate_sync(self.handle)
            .map_err(|error| ModuleError::Link {
                identifier: self.identifier.clone(),
                message: error.to_string(),
            })
    }

    /// Evaluate the module and everything reachable from it.
    ///
    /// Returns [`Evaluation::Completed`] when the graph has no asynchronous
    /// module, otherwise [`Evaluation::Pending`] with a future for the whole
    /// graph. Either way evaluation has started when this returns. On failure the module is `errored` and [`error`](Self::error)
    /// holds the thrown value.
    pub fn evaluate(&self) -> ModuleResult<Evaluation>
    where
        E: 'static,
    {
        self.expect_status("evaluate", "linked", |status| {
            status == ModuleStatus::Linked
        })?;

        if !self.is_graph_async() {
            log::debug!("evaluating module '{}' synchronously", self.identifier);
            return match self.engine.evaluate_sync(self.handle) {
                Ok(()) => Ok(Evaluation::Completed),
                Err(error) => Err(ModuleError::Evaluation {
                    identifier: self.identifier.clone(),
                    message: error.to_string(),
                }),
            };
        }

        log::debug!("evaluating module '{}' asynchronously", self.identifier);
        let identifier = self.identifier.clone();
        let evaluation = self.engine.evaluate(self.handle);
        Ok(Evaluation::Pending(
            async move {
                evaluation.await.map_err(|error| ModuleError::Evaluation {
                    identifier,
                    message: error.to_string(),
                })
            }
            .boxed_local(),
        ))
    }

    /// Write a value into a live export binding.
    ///
    /// Allowed only while `evaluating` or once `evaluated`.
    pub fn set_export(&self, name: &str, value: E::Value) -> ModuleResult<()> {
        self.expect_status("set export on", "evaluating or evaluated", |status| {
            matches!(status, ModuleStatus::Evaluating | ModuleStatus::Evaluated)
        })?;
        self.engine.set_export(self.handle, name, value)?;
        log::debug!("module '{}' export '{}' set", self.identifier, name);
        Ok(())
    }

    /// Serialize the compiled unit so a later construction can skip compiling.
    ///
    /// Only source-text modules that finished evaluating produce cached data;
    /// any other request fails and leaves the status untouched.
    pub fn create_cached_data(&self) -> ModuleResult<Vec<u8>> {
        let status = self.status();
        if self.kind != ModuleKind::SourceText || status != ModuleStatus::Evaluated {
            return Err(ModuleError::CannotCreateCachedData {
                identifier: self.identifier.clone(),
                status,
            });
        }
        Ok(self.engine.create_cached_data(self.handle)?)
    }

    fn expect_status(
        &self,
        operation: &'static str,
        expected: &'static str,
        allowed: impl Fn(ModuleStatus) -> bool,
    ) -> ModuleResult<()> {
        let actual = self.status();
        if allowed(actual) {
            Ok(())
        } else {
            Err(ModuleError::Status {
                identifier: self.identifier.clone(),
                operation,
                expected,
                actual,
            })
        }
    }
}

impl<E: Engine> Drop for Module<E> {
    fn drop(&mut self) {
        self.engine.release(self.handle);
    }
}

impl<E: Engine> fmt::Debug for Module<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

fn validate_export_names(export_names: &[String]) -> ModuleResult<()> {
    let mut seen = FxHashSet::default();
    for name in export_names {
        if name.is_empty() {
            return Err(ModuleError::InvalidArgument {
                name: "export_names",
                reason: "export names must not be empty".to_string(),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(ModuleError::InvalidArgument {
                name: "export_names",
                reason: format!("duplicate export name '{}'", name),
            });
        }
    }
    Ok(())
}
