//! Error types for the module layer and the engines behind it

use thiserror::Error;

use super::status::ModuleStatus;

/// Errors reported by an engine implementation.
///
/// These cover construction and contract failures. Failures that happen while
/// instantiating or evaluating a graph are engine *values* and are surfaced
/// through [`super::Module::error`] instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The execution context is not known to this engine
    #[error("Invalid context: not a context of this engine")]
    InvalidContext,

    /// A dependency lives in a different context than the importing module
    #[error("Module '{dependency}' belongs to a different context than '{module}'")]
    DifferentContext {
        /// The importing module
        module: String,
        /// The dependency supplied for it
        dependency: String,
    },

    /// Source text failed to compile
    #[error("SyntaxError: {message} ({identifier}:{line}:{column})")]
    Syntax {
        /// Module identifier
        identifier: String,
        /// Description
        message: String,
        /// 1-based line, offset applied
        line: i64,
        /// 1-based column, offset applied
        column: i64,
    },

    /// Supplied cached data does not match the source or engine version
    #[error("Cannot build module '{0}' from the supplied cached data")]
    CachedDataRejected(String),

    /// Content is neither source text nor a synthetic specification
    #[error("Provided content is not a module: {0}")]
    NotModule(String),

    /// Export name is not declared by the module
    #[error("Export '{name}' is not defined in module '{module}'")]
    UnknownExport {
        /// Module identifier
        module: String,
        /// Export name
        name: String,
    },

    /// Operation only valid for synthetic modules
    #[error("Module '{0}' is not a synthetic module")]
    NotSynthetic(String),

    /// Namespace requested before the module was instantiated
    #[error("Namespace of module '{0}' is not available before linking")]
    NamespaceUnavailable(String),

    /// Engine refuses to produce cached data
    #[error("Cannot create cached data for module '{0}'")]
    CannotCreateCachedData(String),

    /// Handle does not belong to this engine or was collected
    #[error("Unknown module handle: {0}")]
    UnknownHandle(String),
}

/// Errors reported by [`super::Module`] operations.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The supplied context is not recognized by the engine
    #[error("The \"options.context\" argument must be a context of this engine")]
    InvalidContext,

    /// An argument failed validation
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// Argument name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Operation attempted in the wrong lifecycle status
    #[error("Cannot {operation} module '{identifier}': status must be {expected}, found {actual}")]
    Status {
        /// Module identifier
        identifier: String,
        /// Attempted operation
        operation: &'static str,
        /// Allowed status(es)
        expected: &'static str,
        /// Status at the time of the call
        actual: ModuleStatus,
    },

    /// Supplied imports do not cover the declared specifiers
    #[error("Missing required imports for module '{identifier}': {}", .missing.join(", "))]
    MissingImports {
        /// Module identifier
        identifier: String,
        /// Declared specifiers with no binding
        missing: Vec<String>,
    },

    /// Supplied imports name specifiers the module never declared
    #[error("Unexpected imports for module '{identifier}': {}", .unexpected.join(", "))]
    UnexpectedImports {
        /// Module identifier
        identifier: String,
        /// Supplied names with no matching specifier
        unexpected: Vec<String>,
    },

    /// A dependency was created by a different engine instance
    #[error("Import '{specifier}' of module '{identifier}' is not a module of the same engine")]
    ForeignModule {
        /// Module identifier
        identifier: String,
        /// Specifier the foreign module was bound to
        specifier: String,
    },

    /// Instantiation of the reachable graph failed
    #[error("Linking module '{identifier}' failed: {message}")]
    Link {
        /// Module identifier
        identifier: String,
        /// Rendered engine error value
        message: String,
    },

    /// Evaluation of the reachable graph failed
    #[error("Evaluating module '{identifier}' failed: {message}")]
    Evaluation {
        /// Module identifier
        identifier: String,
        /// Rendered engine error value
        message: String,
    },

    /// Cached data was requested from a module that cannot produce it
    #[error("Cannot create cached data for module '{identifier}' in status {status}")]
    CannotCreateCachedData {
        /// Module identifier
        identifier: String,
        /// Status at the time of the call
        status: ModuleStatus,
    },

    /// Identifier already registered in a [`super::ModuleRegistry`]
    #[error("Module '{0}' is already registered")]
    DuplicateModule(String),

    /// Engine-level failure
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
