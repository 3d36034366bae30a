//! Module registry
//!
//! Owns a set of modules keyed by identifier and drives them as one graph:
//! - Specifier resolution through a host callback
//! - Linking every unlinked module
//! - Entry point tracking
//! - Joint evaluation of synchronous and asynchronous graphs

use futures_util::future::join_all;
use rustc_hash::FxHashMap;

use super::error::{ModuleError, ModuleResult};
use super::evaluation::Evaluation;
use super::status::ModuleStatus;
use super::{Engine, Module};

/// A registered module plus the edges resolved for it
struct RegistryNode<E: Engine> {
    module: Module<E>,
    /// Identifiers this module imports
    imports: Vec<String>,
    /// Identifiers of registered modules importing this one
    imported_by: Vec<String>,
}

/// Graph owner for a set of modules.
///
/// Edges are only known after [`link_all`](ModuleRegistry::link_all) resolved
/// them; before that every module is an entry point.
pub struct ModuleRegistry<E: Engine> {
    nodes: FxHashMap<String, RegistryNode<E>>,
    /// Insertion order, used for deterministic iteration
    order: Vec<String>,
}

impl<E: Engine> ModuleRegistry<E> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Register a module under its identifier
    pub fn insert(&mut self, module: Module<E>) -> ModuleResult<()> {
        let identifier = module.identifier().to_string();
        if self.nodes.contains_key(&identifier) {
            return Err(ModuleError::DuplicateModule(identifier));
        }
        self.order.push(identifier.clone());
        self.nodes.insert(
            identifier,
            RegistryNode {
                module,
                imports: Vec::new(),
                imported_by: Vec::new(),
            },
        );
        Ok(())
    }

    /// Remove a module, dropping it unless the caller keeps it
    pub fn remove(&mut self, identifier: &str) -> Option<Module<E>> {
        let node = self.nodes.remove(identifier)?;
        self.order.retain(|id| id != identifier);
        for other in self.nodes.values_mut() {
            other.imported_by.retain(|id| id != identifier);
        }
        Some(node.module)
    }

    /// Look up a module by identifier
    pub fn get(&self, identifier: &str) -> Option<&Module<E>> {
        self.nodes.get(identifier).map(|node| &node.module)
    }

    /// Identifiers in insertion order
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identifiers of modules no other registered module imports
    pub fn entry_points(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| {
                self.nodes
                    .get(id.as_str())
                    .is_some_and(|node| node.imported_by.is_empty())
            })
            .map(String::as_str)
            .collect()
    }

    /// Identifiers `identifier` was linked against
    pub fn imports_of(&self, identifier: &str) -> Option<&[String]> {
        self.nodes.get(identifier).map(|node| node.imports.as_slice())
    }

    /// Link every `unlinked` module.
    ///
    /// `resolve(referrer, specifier)` returns the identifier of the registered
    /// module a specifier refers to. Modules are linked in insertion order;
    /// the first failure stops the walk, edges of modules linked before it are
    /// kept.
    pub fn link_all<F>(&mut self, mut resolve: F) -> ModuleResult<()>
    where
        F: FnMut(&str, &str) -> Option<String>,
    {
        let mut edges: Vec<(String, Vec<String>)> = Vec::new();
        let mut failure = None;

        for identifier in &self.order {
            let Some(node) = self.nodes.get(identifier) else {
                continue;
            };
            if node.module.status() != ModuleStatus::Unlinked {
                continue;
            }

            let mut imports = Vec::new();
            let mut targets = Vec::new();
            let mut missing = Vec::new();
            for specifier in node.module.import_specifiers() {
                match resolve(identifier.as_str(), specifier.as_str())
                    .and_then(|target| self.nodes.get_key_value(target.as_str()))
                {
                    Some((target, dependency)) => {
                        imports.push((specifier.as_str(), &dependency.module));
                        targets.push(target.clone());
                    }
                    None => missing.push(specifier.clone()),
                }
            }
            if !missing.is_empty() {
                failure = Some(ModuleError::MissingImports {
                    identifier: identifier.clone(),
                    missing,
                });
                break;
            }

            if let Err(error) = node.module.link(imports) {
                failure = Some(error);
                break;
            }
            log::trace!("registry linked '{}' -> {:?}", identifier, targets);
            edges.push((identifier.clone(), targets));
        }

        for (identifier, targets) in edges {
            for target in &targets {
                if let Some(dependency) = self.nodes.get_mut(target) {
                    if !dependency.imported_by.contains(&identifier) {
                        dependency.imported_by.push(identifier.clone());
                    }
                }
            }
            if let Some(node) = self.nodes.get_mut(&identifier) {
                node.imports = targets;
            }
        }

        failure.map_or(Ok(()), Err)
    }

    /// Evaluate every module still `linked`, in insertion order.
    ///
    /// Synchronous graphs finish inline; pending evaluations are joined. The
    /// engine guarantees shared dependencies run once.
    pub async fn evaluate_all(&self) -> ModuleResult<()>
    where
        E: 'static,
    {
        let mut pending = Vec::new();
        for identifier in &self.order {
            let Some(node) = self.nodes.get(identifier) else {
                continue;
            };
            if node.module.status() != ModuleStatus::Linked {
                continue;
            }
            match node.module.evaluate()? {
                Evaluation::Completed => {}
                Evaluation::Pending(future) => pending.push(future),
            }
        }

        for result in join_all(pending).await {
            result?;
        }
        Ok(())
    }
}

impl<E: Engine> Default for ModuleRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
