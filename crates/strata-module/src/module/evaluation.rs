//! Outcome of [`super::Module::evaluate`]

use std::fmt;

use futures_util::future::LocalBoxFuture;

use super::error::ModuleResult;

/// Result of starting evaluation.
///
/// A graph with no asynchronous module finishes inside the call and yields
/// [`Evaluation::Completed`]; otherwise the caller gets a future that resolves
/// once the whole graph has been evaluated. Evaluation has already started
/// either way; dropping the future does not cancel it.
pub enum Evaluation {
    /// Evaluated synchronously
    Completed,
    /// Evaluation started; the future resolves with its outcome
    Pending(LocalBoxFuture<'static, ModuleResult<()>>),
}

impl Evaluation {
    /// Whether evaluation already finished.
    pub fn is_completed(&self) -> bool {
        matches!(self, Evaluation::Completed)
    }

    /// Await completion regardless of which arm this is.
    pub async fn finish(self) -> ModuleResult<()> {
        match self {
            Evaluation::Completed => Ok(()),
            Evaluation::Pending(future) => future.await,
        }
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Completed => f.write_str("Completed"),
            Evaluation::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
