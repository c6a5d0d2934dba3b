//! Modules and source files.

use crate::{DeclId, Name};

/// Index of a module in the [`DeclTable`](crate::DeclTable).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleId(u32);

impl ModuleId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        ModuleId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a module's declarations come from.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleKind {
    /// Compiled from Kiln source (possibly in an earlier compilation).
    Source,
    /// Imported from the foreign object runtime's headers.
    Foreign,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ModuleInfo {
    pub name: Name,
    pub kind: ModuleKind,
}

impl ModuleInfo {
    #[inline]
    pub fn is_foreign(&self) -> bool {
        matches!(self.kind, ModuleKind::Foreign)
    }
}

/// How a source file's top-level code is run.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SourceFileKind {
    /// A library file; top-level code runs from a module initializer.
    Library,
    /// The script-mode main file; top-level code runs from `main`.
    Main,
    /// Interactive input; top-level code runs from `main`.
    Repl,
}

/// One compilation unit handed to the emitter.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SourceFile {
    pub module: ModuleId,
    /// Path as given on the command line; only the final component is used
    /// for naming.
    pub filename: String,
    pub kind: SourceFileKind,
    pub decls: Vec<DeclId>,
}

impl SourceFile {
    pub fn new(module: ModuleId, filename: impl Into<String>, kind: SourceFileKind) -> Self {
        SourceFile {
            module,
            filename: filename.into(),
            kind,
            decls: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_decls(mut self, decls: Vec<DeclId>) -> Self {
        self.decls = decls;
        self
    }

    pub fn is_script_mode(&self) -> bool {
        matches!(self.kind, SourceFileKind::Main | SourceFileKind::Repl)
    }

    /// The final path component of `filename`.
    pub fn file_name(&self) -> &str {
        self.filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename)
    }
}
