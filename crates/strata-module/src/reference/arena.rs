//! Module record storage and graph instantiation
//!
//! Records live in an index arena owned by the engine. Dependency edges are
//! arena indices, so cycles cost nothing and lifetime is decided by
//! [`Arena::collect`], not by whoever happens to hold a record.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::module::{EngineError, EngineResult, EvaluationSteps, ModuleRequest, ModuleStatus};

use super::unit::CompiledUnit;
use super::value::{ErrorKind, Value};
use super::{ContextId, EngineOptions, EngineStats, ModuleId};

/// What a record was built from
pub(crate) enum RecordBody {
    Source {
        unit: Arc<CompiledUnit>,
        source_hash: String,
    },
    Synthetic {
        export_names: Vec<String>,
        steps: EvaluationSteps<Value>,
    },
}

/// Engine-side state of one module
pub(crate) struct ModuleRecord {
    pub identifier: String,
    pub context: ContextId,
    pub body: RecordBody,
    pub status: ModuleStatus,
    /// Specifier → dependency; `None` until linked
    pub bindings: Option<FxHashMap<String, ModuleId>>,
    /// Local import name → (dependency, export name); filled by instantiation
    pub resolved_imports: FxHashMap<String, (ModuleId, String)>,
    /// Declared bindings; `None` means not initialized yet
    pub environment: FxHashMap<String, Option<Value>>,
    pub error: Option<Value>,
    pub graph_async: bool,
    pub instantiated: bool,
    pub released: bool,
}

impl ModuleRecord {
    pub fn new(identifier: String, context: ContextId, body: RecordBody) -> Self {
        let environment = match &body {
            RecordBody::Source { unit, .. } => unit
                .locals
                .iter()
                .map(|name| (name.clone(), None))
                .collect(),
            RecordBody::Synthetic { export_names, .. } => export_names
                .iter()
                .map(|name| (name.clone(), Some(Value::Undefined)))
                .collect(),
        };
        Self {
            identifier,
            context,
            body,
            status: ModuleStatus::Unlinked,
            bindings: None,
            resolved_imports: FxHashMap::default(),
            environment,
            error: None,
            graph_async: false,
            instantiated: false,
            released: false,
        }
    }

    pub fn requests(&self) -> &[ModuleRequest] {
        match &self.body {
            RecordBody::Source { unit, .. } => &unit.requests,
            RecordBody::Synthetic { .. } => &[],
        }
    }

    pub fn export_names(&self) -> Vec<&str> {
        match &self.body {
            RecordBody::Source { unit, .. } => unit.exports.iter().map(String::as_str).collect(),
            RecordBody::Synthetic { export_names, .. } => {
                export_names.iter().map(String::as_str).collect()
            }
        }
    }

    pub fn exports_name(&self, name: &str) -> bool {
        match &self.body {
            RecordBody::Source { unit, .. } => unit.exports_name(name),
            RecordBody::Synthetic { export_names, .. } => {
                export_names.iter().any(|export| export == name)
            }
        }
    }

    pub fn is_async(&self) -> bool {
        match &self.body {
            RecordBody::Source { unit, .. } => unit.has_top_level_await,
            RecordBody::Synthetic { .. } => false,
        }
    }

    /// Linked explicitly, or has nothing to link
    pub fn is_bound(&self) -> bool {
        self.bindings.is_some() || self.requests().is_empty()
    }

    pub fn fail(&mut self, error: Value) {
        self.status = ModuleStatus::Errored;
        self.error = Some(error);
    }
}

/// Arena slot; the generation advances every time the slot is freed
struct Slot {
    generation: u32,
    record: Option<ModuleRecord>,
}

/// Index arena of module records plus engine-wide bookkeeping
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Modules in `linking`, waiting for the rest of their graph to be bound
    pub waiting: FxHashSet<ModuleId>,
    pub contexts: FxHashMap<ContextId, String>,
    pub options: EngineOptions,
    pub stats: EngineStats,
}

impl Arena {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            waiting: FxHashSet::default(),
            contexts: FxHashMap::default(),
            options,
            stats: EngineStats::default(),
        }
    }

    pub fn insert(&mut self, record: ModuleRecord) -> ModuleId {
        self.stats.modules += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return ModuleId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        ModuleId::new(index, 0)
    }

    pub fn record(&self, id: ModuleId) -> EngineResult<&ModuleRecord> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_ref())
            .ok_or_else(|| EngineError::UnknownHandle(id.to_string()))
    }

    pub fn record_mut(&mut self, id: ModuleId) -> EngineResult<&mut ModuleRecord> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_mut())
            .ok_or_else(|| EngineError::UnknownHandle(id.to_string()))
    }

    /// Every live record with its handle
    fn live(&self) -> impl Iterator<Item = (ModuleId, &ModuleRecord)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.record
                .as_ref()
                .map(|record| (ModuleId::new(index as u32, slot.generation), record))
        })
    }

    /// Direct dependencies in request order
    pub fn dependencies(&self, id: ModuleId) -> Vec<ModuleId> {
        let Ok(record) = self.record(id) else {
            return Vec::new();
        };
        let Some(bindings) = &record.bindings else {
            return Vec::new();
        };
        record
            .requests()
            .iter()
            .filter_map(|request| bindings.get(&request.specifier).copied())
            .collect()
    }

    /// `root` and everything reachable from it, breadth first
    pub fn reachable(&self, root: ModuleId) -> Vec<ModuleId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            for dependency in self.dependencies(id) {
                if !visited.contains(&dependency) {
                    queue.push_back(dependency);
                }
            }
        }

        order
    }

    fn status_of(&self, id: ModuleId) -> ModuleStatus {
        self.record(id)
            .map(|record| record.status)
            .unwrap_or(ModuleStatus::Errored)
    }

    /// Record bindings for `id`.
    pub fn link(&mut self, id: ModuleId, names: &[&str], dependencies: &[ModuleId]) -> EngineResult<()> {
        let record = self.record(id)?;
        let context = record.context;
        let identifier = record.identifier.clone();

        let mut bindings = FxHashMap::default();
        for (name, dependency) in names.iter().zip(dependencies) {
            let dependency_record = self.record(*dependency)?;
            if dependency_record.context != context {
                return Err(EngineError::DifferentContext {
                    module: identifier,
                    dependency: dependency_record.identifier.clone(),
                });
            }
            bindings.insert(name.to_string(), *dependency);
        }

        self.record_mut(id)?.bindings = Some(bindings);
        Ok(())
    }

    /// Instantiate the graph reachable from `root`.
    ///
    /// When part of the graph is not bound yet, bound modules move to
    /// `linking` and wait; the call that binds the last module instantiates
    /// the whole set at once, along with any other waiting module whose graph
    /// became complete.
    pub fn instantiate(&mut self, root: ModuleId) -> Result<(), Value> {
        let result = self.instantiate_graph(root);
        if self.status_of(root) != ModuleStatus::Linking {
            self.resume_waiting();
        }
        result
    }

    /// Instantiate every waiting module whose reachable graph is fully bound.
    ///
    /// One walk over the waiting modules' graphs records reverse edges; a
    /// module is still blocked if it reaches an unbound module.
    fn resume_waiting(&mut self) {
        let waiting: Vec<ModuleId> = self
            .waiting
            .iter()
            .copied()
            .filter(|id| self.status_of(*id) == ModuleStatus::Linking)
            .collect();
        if waiting.is_empty() {
            self.waiting.clear();
            return;
        }

        let mut importers: FxHashMap<ModuleId, Vec<ModuleId>> = FxHashMap::default();
        let mut unbound = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = waiting.clone();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if self.record(id).is_ok_and(|record| !record.is_bound()) {
                unbound.push(id);
            }
            for dependency in self.dependencies(id) {
                importers.entry(dependency).or_default().push(id);
                stack.push(dependency);
            }
        }

        let mut blocked = FxHashSet::default();
        while let Some(id) = unbound.pop() {
            if blocked.insert(id) {
                if let Some(list) = importers.get(&id) {
                    unbound.extend(list.iter().copied());
                }
            }
        }

        for id in waiting {
            if blocked.contains(&id) || self.status_of(id) != ModuleStatus::Linking {
                continue;
            }
            log::trace!("resuming deferred instantiation of {}", id);
            // Failures are recorded on the records themselves
            let _ = self.instantiate_graph(id);
        }

        let still_waiting: FxHashSet<ModuleId> = self
            .waiting
            .iter()
            .copied()
            .filter(|id| self.status_of(*id) == ModuleStatus::Linking)
            .collect();
        self.waiting = still_waiting;
    }

    fn instantiate_graph(&mut self, root: ModuleId) -> Result<(), Value> {
        match self.status_of(root) {
            ModuleStatus::Linked | ModuleStatus::Evaluating | ModuleStatus::Evaluated => {
                return Ok(())
            }
            ModuleStatus::Errored => return Err(self.error_of(root)),
            ModuleStatus::Unlinked | ModuleStatus::Linking => {}
        }

        let reachable = self.reachable(root);

        let unbound: Vec<ModuleId> = reachable
            .iter()
            .copied()
            .filter(|id| self.record(*id).is_ok_and(|record| !record.is_bound()))
            .collect();
        if !unbound.is_empty() {
            for id in &reachable {
                let linking = match self.record_mut(*id) {
                    Ok(record) => {
                        if record.status == ModuleStatus::Unlinked && record.is_bound() {
                            record.status = ModuleStatus::Linking;
                        }
                        record.status == ModuleStatus::Linking
                    }
                    Err(_) => false,
                };
                if linking {
                    self.waiting.insert(*id);
                }
            }
            log::trace!(
                "instantiation of {} deferred, {} module(s) not bound yet",
                root,
                unbound.len()
            );
            return Ok(());
        }

        let candidates: Vec<ModuleId> = reachable
            .iter()
            .copied()
            .filter(|id| {
                matches!(
                    self.status_of(*id),
                    ModuleStatus::Unlinked | ModuleStatus::Linking
                )
            })
            .collect();

        let mut failures: Vec<(ModuleId, Value)> = Vec::new();
        let mut resolved = FxHashMap::default();
        for id in &reachable {
            if self.status_of(*id) == ModuleStatus::Errored {
                failures.push((*id, self.error_of(*id)));
            }
        }
        for id in &candidates {
            match self.resolve_imports(*id) {
                Ok(imports) => {
                    resolved.insert(*id, imports);
                }
                Err(error) => failures.push((*id, error)),
            }
        }

        for id in &candidates {
            let reach = self.reachable(*id);
            let failure = failures
                .iter()
                .find(|(failed, _)| reach.contains(failed))
                .map(|(_, error)| error.clone());
            let graph_async = reach
                .iter()
                .any(|member| self.record(*member).is_ok_and(ModuleRecord::is_async));

            let Ok(record) = self.record_mut(*id) else {
                continue;
            };
            match failure {
                Some(error) => {
                    log::trace!("instantiating {} failed: {}", record.identifier, error);
                    record.fail(error);
                }
                None => {
                    record.resolved_imports = resolved.remove(id).unwrap_or_default();
                    record.graph_async = graph_async;
                    record.instantiated = true;
                    record.status = ModuleStatus::Linked;
                }
            }
        }
        self.stats.instantiations += candidates.len();

        match self.status_of(root) {
            ModuleStatus::Errored => Err(self.error_of(root)),
            _ => Ok(()),
        }
    }

    fn resolve_imports(&self, id: ModuleId) -> Result<FxHashMap<String, (ModuleId, String)>, Value> {
        let record = self.record(id).map_err(|err| Value::error(ErrorKind::Error, err.to_string()))?;
        let mut resolved = FxHashMap::default();
        let RecordBody::Source { unit, .. } = &record.body else {
            return Ok(resolved);
        };
        let bindings = record.bindings.as_ref();

        for import in &unit.imports {
            let dependency = bindings
                .and_then(|bindings| bindings.get(&import.specifier))
                .copied()
                .ok_or_else(|| {
                    Value::error(
                        ErrorKind::SyntaxError,
                        format!("Cannot resolve module '{}'", import.specifier),
                    )
                })?;
            let exports = self
                .record(dependency)
                .is_ok_and(|dependency| dependency.exports_name(&import.imported));
            if !exports {
                return Err(Value::error(
                    ErrorKind::SyntaxError,
                    format!(
                        "The requested module '{}' does not provide an export named '{}'",
                        import.specifier, import.imported
                    ),
                ));
            }
            resolved.insert(import.local.clone(), (dependency, import.imported.clone()));
        }

        Ok(resolved)
    }

    pub fn error_of(&self, id: ModuleId) -> Value {
        self.record(id)
            .ok()
            .and_then(|record| record.error.clone())
            .unwrap_or(Value::Undefined)
    }

    pub fn fail(&mut self, id: ModuleId, error: Value) {
        if let Ok(record) = self.record_mut(id) {
            record.fail(error);
        }
    }

    /// Read binding `name` as seen from inside module `id`.
    pub fn lookup(&self, id: ModuleId, name: &str) -> Result<Value, Value> {
        let record = self.record(id).map_err(|err| Value::error(ErrorKind::Error, err.to_string()))?;
        if let Some(slot) = record.environment.get(name) {
            return initialized(slot, name);
        }
        if let Some((dependency, export)) = record.resolved_imports.get(name) {
            let slot = self
                .record(*dependency)
                .ok()
                .and_then(|dependency| dependency.environment.get(export));
            return match slot {
                Some(slot) => initialized(slot, name),
                None => Err(Value::error(
                    ErrorKind::ReferenceError,
                    format!("{} is not defined", name),
                )),
            };
        }
        Err(Value::error(
            ErrorKind::ReferenceError,
            format!("{} is not defined", name),
        ))
    }

    /// Free released records that no live record can reach.
    pub fn collect(&mut self) -> usize {
        let mut marked = FxHashSet::default();
        let mut stack: Vec<ModuleId> = self
            .live()
            .filter(|(_, record)| !record.released)
            .map(|(id, _)| id)
            .collect();

        while let Some(id) = stack.pop() {
            if !marked.insert(id) {
                continue;
            }
            stack.extend(self.dependencies(id));
            if let Ok(record) = self.record(id) {
                stack.extend(record.resolved_imports.values().map(|(dependency, _)| *dependency));
            }
        }

        let mut collected = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let id = ModuleId::new(index as u32, slot.generation);
            if slot.record.is_some() && !marked.contains(&id) {
                slot.record = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                self.waiting.remove(&id);
                collected += 1;
            }
        }
        self.stats.modules -= collected;
        collected
    }
}

fn initialized(slot: &Option<Value>, name: &str) -> Result<Value, Value> {
    slot.clone().ok_or_else(|| {
        Value::error(
            ErrorKind::ReferenceError,
            format!("Cannot access '{}' before initialization", name),
        )
    })
}
