//! Compiled representation of a source-text module

use serde::{Deserialize, Serialize};

use crate::module::ModuleRequest;

use super::value::Value;

/// Named import: `import { imported as local } from "specifier"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub local: String,
    pub imported: String,
    pub specifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Await(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `let name = init;`, exported or not
    Let { name: String, init: Expr },
    Throw(Expr),
    Expr(Expr),
}

/// Output of compiling one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// Unique by specifier, in order of first appearance
    pub requests: Vec<ModuleRequest>,
    pub imports: Vec<ImportBinding>,
    pub exports: Vec<String>,
    /// Every `let` binding, exported or not
    pub locals: Vec<String>,
    pub body: Vec<Stmt>,
    pub has_top_level_await: bool,
}

impl CompiledUnit {
    /// Add a request unless the specifier was already requested
    pub fn add_request(&mut self, request: ModuleRequest) {
        if !self
            .requests
            .iter()
            .any(|existing| existing.specifier == request.specifier)
        {
            self.requests.push(request);
        }
    }

    pub fn exports_name(&self, name: &str) -> bool {
        self.exports.iter().any(|export| export == name)
    }
}
