//! Emission options.

/// Module-wide switches for one emission run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitOptions {
    /// Interoperate with the foreign object runtime: emit class and
    /// category registration lists and metaclass stubs.
    pub foreign_interop: bool,
    /// Code is loaded by a JIT rather than a static linker. Together with
    /// `foreign_interop`, script entry points register classes and
    /// categories themselves.
    pub use_jit: bool,
    /// Emit the optimizer's protocol witness tables.
    pub emit_witness_tables: bool,
    /// Record debug info for imports, functions and globals.
    pub debug_info: bool,
    /// Alignment in bytes of pointer-sized globals.
    pub pointer_align: u32,
    /// Module providing the process-argument globals and implicitly
    /// imported by every module.
    pub stdlib_module: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            foreign_interop: false,
            use_jit: false,
            emit_witness_tables: true,
            debug_info: false,
            pointer_align: 8,
            stdlib_module: "core".to_string(),
        }
    }
}

impl EmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_foreign_interop(mut self, enabled: bool) -> Self {
        self.foreign_interop = enabled;
        self
    }

    #[must_use]
    pub fn with_jit(mut self, enabled: bool) -> Self {
        self.use_jit = enabled;
        self
    }

    #[must_use]
    pub fn with_witness_tables(mut self, enabled: bool) -> Self {
        self.emit_witness_tables = enabled;
        self
    }

    #[must_use]
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    #[must_use]
    pub fn with_pointer_align(mut self, align: u32) -> Self {
        self.pointer_align = align;
        self
    }

    #[must_use]
    pub fn with_stdlib_module(mut self, name: impl Into<String>) -> Self {
        self.stdlib_module = name.into();
        self
    }
}
