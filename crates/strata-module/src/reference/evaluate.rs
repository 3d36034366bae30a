//! Graph evaluation
//!
//! Post-order walk from the root: dependencies first, each module at most
//! once. Modules of one import cycle form a component that finishes
//! together: members stay `evaluating` until the component's first visited
//! module completes, and a failure anywhere in it errors every member.
//! Synthetic evaluation steps run with the arena unlocked so they can write
//! their exports.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::module::{EngineError, EngineResult, EvaluationSteps, ExportWriter, ModuleStatus};

use super::arena::{Arena, RecordBody};
use super::unit::{CompiledUnit, Expr, Stmt};
use super::value::{ErrorKind, Value};
use super::ModuleId;

enum Body {
    Source(Arc<CompiledUnit>),
    Synthetic(EvaluationSteps<Value>),
}

/// Evaluate `root` and everything it reaches.
pub(crate) fn evaluate_graph(shared: &Arc<Mutex<Arena>>, root: ModuleId) -> Result<(), Value> {
    let mut walk = GraphWalk {
        shared,
        pending: Vec::new(),
        indices: FxHashMap::default(),
    };
    walk.visit(root, 0).map(|_| ())
}

/// One depth-first evaluation pass, tracking cycle components by low-link
struct GraphWalk<'a> {
    shared: &'a Arc<Mutex<Arena>>,
    /// Visited modules whose component has not completed, in visit order
    pending: Vec<ModuleId>,
    /// Visit index of every module entered by this walk
    indices: FxHashMap<ModuleId, usize>,
}

impl GraphWalk<'_> {
    /// Evaluate `id` and return the lowest visit index it reaches.
    fn visit(&mut self, id: ModuleId, depth: usize) -> Result<usize, Value> {
        let (dependencies, body) = {
            let mut arena = self.shared.lock();
            let max_depth = arena.options.max_graph_depth;
            let record = arena
                .record_mut(id)
                .map_err(|err| Value::error(ErrorKind::Error, err.to_string()))?;

            match record.status {
                ModuleStatus::Evaluated => return Ok(usize::MAX),
                // Still pending in this walk: a back edge of a cycle
                ModuleStatus::Evaluating => {
                    return Ok(self.indices.get(&id).copied().unwrap_or(usize::MAX))
                }
                ModuleStatus::Errored => {
                    return Err(record.error.clone().unwrap_or(Value::Undefined))
                }
                ModuleStatus::Unlinked | ModuleStatus::Linking => {
                    return Err(Value::error(
                        ErrorKind::Error,
                        format!("Module '{}' is not linked", record.identifier),
                    ))
                }
                ModuleStatus::Linked => {}
            }

            if depth > max_depth {
                let error = Value::error(
                    ErrorKind::RangeError,
                    format!("Maximum module graph depth of {} exceeded", max_depth),
                );
                record.fail(error.clone());
                return Err(error);
            }

            record.status = ModuleStatus::Evaluating;
            let body = match &record.body {
                RecordBody::Source { unit, .. } => Body::Source(Arc::clone(unit)),
                RecordBody::Synthetic { steps, .. } => Body::Synthetic(Arc::clone(steps)),
            };
            log::trace!("evaluating {} ({})", record.identifier, id);
            (arena.dependencies(id), body)
        };

        let index = self.indices.len();
        self.indices.insert(id, index);
        self.pending.push(id);
        let mut low_link = index;

        for dependency in dependencies {
            match self.visit(dependency, depth + 1) {
                Ok(reached) => low_link = low_link.min(reached),
                Err(error) => {
                    self.fail_pending(&error);
                    return Err(error);
                }
            }
        }

        let result = match body {
            Body::Source(unit) => run_source(&mut self.shared.lock(), id, &unit),
            Body::Synthetic(steps) => {
                let writer = SyntheticExports {
                    shared: Arc::clone(self.shared),
                    id,
                };
                steps(&writer as &dyn ExportWriter<Value>)
            }
        };
        if let Err(error) = result {
            self.fail_pending(&error);
            return Err(error);
        }

        if low_link == index {
            self.complete_component(id);
        }
        Ok(low_link)
    }

    /// Mark `root` and every pending module visited after it `evaluated`.
    fn complete_component(&mut self, root: ModuleId) {
        let Some(start) = self.pending.iter().rposition(|id| *id == root) else {
            return;
        };
        let mut arena = self.shared.lock();
        for id in self.pending.drain(start..) {
            if let Ok(record) = arena.record_mut(id) {
                record.status = ModuleStatus::Evaluated;
            }
            arena.stats.evaluations += 1;
        }
    }

    /// Error every pending module; each of them reaches the failure.
    fn fail_pending(&mut self, error: &Value) {
        let mut arena = self.shared.lock();
        for id in self.pending.drain(..) {
            arena.fail(id, error.clone());
        }
    }
}

fn run_source(arena: &mut Arena, id: ModuleId, unit: &CompiledUnit) -> Result<(), Value> {
    for stmt in &unit.body {
        match stmt {
            Stmt::Let { name, init } => {
                let value = eval_expr(arena, id, init)?;
                if let Ok(record) = arena.record_mut(id) {
                    record.environment.insert(name.clone(), Some(value));
                }
            }
            Stmt::Throw(expr) => return Err(eval_expr(arena, id, expr)?),
            Stmt::Expr(expr) => {
                eval_expr(arena, id, expr)?;
            }
        }
    }
    Ok(())
}

fn eval_expr(arena: &Arena, id: ModuleId, expr: &Expr) -> Result<Value, Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Identifier(name) => arena.lookup(id, name),
        // Awaited values are already settled in this engine
        Expr::Await(inner) => eval_expr(arena, id, inner),
    }
}

/// Write access handed to synthetic evaluation steps
pub(crate) struct SyntheticExports {
    shared: Arc<Mutex<Arena>>,
    id: ModuleId,
}

impl ExportWriter<Value> for SyntheticExports {
    fn set_export(&self, name: &str, value: Value) -> EngineResult<()> {
        set_synthetic_export(&mut self.shared.lock(), self.id, name, value)
    }
}

/// Store `value` in export `name` of synthetic module `id`.
pub(crate) fn set_synthetic_export(
    arena: &mut Arena,
    id: ModuleId,
    name: &str,
    value: Value,
) -> EngineResult<()> {
    let record = arena.record_mut(id)?;
    if !matches!(record.body, RecordBody::Synthetic { .. }) {
        return Err(EngineError::NotSynthetic(record.identifier.clone()));
    }
    if !record.exports_name(name) {
        return Err(EngineError::UnknownExport {
            module: record.identifier.clone(),
            name: name.to_string(),
        });
    }
    record.environment.insert(name.to_string(), Some(value));
    Ok(())
}
