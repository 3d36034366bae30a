//! Construction options for modules

use std::sync::Arc;

use super::engine::EvaluationSteps;

/// What a module is built from.
pub enum ModuleContent<'a, V> {
    /// Source text compiled by the engine
    SourceText(&'a str),
    /// Host-supplied exports and evaluation procedure
    Synthetic {
        /// Names the module exports
        export_names: Vec<String>,
        /// Runs when the module is evaluated
        evaluation_steps: EvaluationSteps<V>,
    },
}

impl<'a, V> ModuleContent<'a, V> {
    /// Synthetic content from any closure.
    pub fn synthetic<I, S, F>(export_names: I, steps: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&dyn super::engine::ExportWriter<V>) -> Result<(), V> + Send + Sync + 'static,
    {
        ModuleContent::Synthetic {
            export_names: export_names.into_iter().map(Into::into).collect(),
            evaluation_steps: Arc::new(steps),
        }
    }
}

/// Options for [`super::Module::new`].
///
/// ```rust,ignore
/// let options = ModuleOptions::new()
///     .with_context(&context)
///     .with_line_offset(10);
/// ```
#[derive(Debug)]
pub struct ModuleOptions<'a, C> {
    /// Context to compile into; the engine's default when `None`
    pub context: Option<&'a C>,
    /// Line offset for source positions
    pub line_offset: i32,
    /// Column offset for the first line
    pub column_offset: i32,
    /// Cached data from a previous compilation of the same source
    pub cached_data: Option<&'a [u8]>,
}

impl<'a, C> ModuleOptions<'a, C> {
    /// Default options
    pub fn new() -> Self {
        Self {
            context: None,
            line_offset: 0,
            column_offset: 0,
            cached_data: None,
        }
    }

    /// Compile into `context`
    pub fn with_context(mut self, context: &'a C) -> Self {
        self.context = Some(context);
        self
    }

    /// Shift reported line numbers
    pub fn with_line_offset(mut self, line_offset: i32) -> Self {
        self.line_offset = line_offset;
        self
    }

    /// Shift reported columns on the first line
    pub fn with_column_offset(mut self, column_offset: i32) -> Self {
        self.column_offset = column_offset;
        self
    }

    /// Reuse a cached compilation
    pub fn with_cached_data(mut self, cached_data: &'a [u8]) -> Self {
        self.cached_data = Some(cached_data);
        self
    }
}

impl<C> Default for ModuleOptions<'_, C> {
    fn default() -> Self {
        Self::new()
    }
}
