//! Debug info records.
//!
//! Emission only collects what a downstream debug-info writer needs:
//! imported modules, the functions and globals it created and the
//! declarations they came from. Functions erased after the fact (an elided
//! module initializer) are dropped here too so no record outlives its
//! object.

use kiln_ir::DeclId;

use crate::native::GlobalId;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DebugFunction {
    pub function: GlobalId,
    pub name: String,
    pub decl: Option<DeclId>,
    /// Compiler-synthesized, with no source location.
    pub artificial: bool,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DebugGlobal {
    pub name: String,
    pub decl: DeclId,
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct DebugInfo {
    /// Access paths of imported modules, in import order.
    imports: Vec<Vec<String>>,
    functions: Vec<DebugFunction>,
    globals: Vec<DebugGlobal>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an import. Repeated imports of one path are recorded once.
    pub fn emit_import(&mut self, path: Vec<String>) {
        if !self.imports.contains(&path) {
            self.imports.push(path);
        }
    }

    pub fn emit_function(&mut self, function: GlobalId, name: &str, decl: Option<DeclId>) {
        self.functions.push(DebugFunction {
            function,
            name: name.to_string(),
            decl,
            artificial: false,
        });
    }

    pub fn emit_artificial_function(&mut self, function: GlobalId, name: &str) {
        self.functions.push(DebugFunction {
            function,
            name: name.to_string(),
            decl: None,
            artificial: true,
        });
    }

    pub fn emit_global_variable(&mut self, name: &str, decl: DeclId) {
        self.globals.push(DebugGlobal {
            name: name.to_string(),
            decl,
        });
    }

    pub fn erase_function(&mut self, function: GlobalId) {
        self.functions.retain(|f| f.function != function);
    }

    pub fn imports(&self) -> &[Vec<String>] {
        &self.imports
    }

    pub fn functions(&self) -> &[DebugFunction] {
        &self.functions
    }

    pub fn globals(&self) -> &[DebugGlobal] {
        &self.globals
    }
}
