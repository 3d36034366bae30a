//! Live module namespace

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::arena::Arena;
use super::value::Value;
use super::ModuleId;

/// Live view of a module's exports.
///
/// Reads go to the engine on every call, so values written during or after
/// evaluation are visible through a namespace taken earlier.
#[derive(Clone)]
pub struct Namespace {
    shared: Arc<Mutex<Arena>>,
    id: ModuleId,
}

impl Namespace {
    pub(crate) fn new(shared: Arc<Mutex<Arena>>, id: ModuleId) -> Self {
        Self { shared, id }
    }

    /// Current value of export `name`; `None` if it is not exported or not
    /// initialized yet.
    pub fn get(&self, name: &str) -> Option<Value> {
        let arena = self.shared.lock();
        let record = arena.record(self.id).ok()?;
        if !record.exports_name(name) {
            return None;
        }
        record.environment.get(name).cloned().flatten()
    }

    /// Export names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let arena = self.shared.lock();
        let Ok(record) = arena.record(self.id) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = record.export_names().into_iter().map(str::to_string).collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, name: &str) -> bool {
        let arena = self.shared.lock();
        arena
            .record(self.id)
            .is_ok_and(|record| record.exports_name(name))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("module", &self.id)
            .field("keys", &self.keys())
            .finish()
    }
}
