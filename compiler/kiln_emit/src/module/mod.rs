//! Module emission driver.
//!
//! [`emit_module`] runs the whole pipeline for one module: every source
//! file's declarations, then everything the lowered module holds, then
//! each file's entry point, and finally the side-table lists. The result
//! is a finished [`NativeModule`] plus its symbol table.
//!
//! Script files (the main file and interactive input) get a C `main` that
//! publishes `argc`/`argv` to the standard library and runs the top-level
//! code. Library files get `<module>.init.<file>`, registered as a global
//! constructor, unless the top-level code does nothing, in which case
//! both are dropped.

use tracing::{debug, instrument};

use kiln_diagnostic::Diagnostic;
use kiln_ir::lowered::{CallConv, FnType, LoweredModule, NativeType, Signature};
use kiln_ir::{DeclTable, SourceFile};
use kiln_request::Evaluator;

use crate::cache::{ObjectCache, SymbolEntry};
use crate::debug::DebugInfo;
use crate::decl::EmitCx;
use crate::error::EmitError;
use crate::linkage::{LinkInfo, LinkagePolicy, Linker};
use crate::mangle::{addressor_symbol, ExtensionBindings, Mangler};
use crate::native::{BodyBuilder, Constant, FnBody, GlobalId, GlobalValue, NativeModule, Value};
use crate::options::EmitOptions;

/// Priority of module initializers in the global constructor list.
pub const MODULE_INIT_PRIORITY: u32 = 1;

/// Standard library globals `main` stores its arguments into, in
/// parameter order.
const PROCESS_ARGUMENTS: [(u32, &str); 2] = [(0, "C_ARGC"), (1, "C_ARGV")];

/// Everything emission reads.
#[derive(Copy, Clone)]
pub struct EmitInput<'a> {
    pub decls: &'a DeclTable,
    pub lowered: &'a LoweredModule,
    pub files: &'a [SourceFile],
}

impl<'a> EmitInput<'a> {
    pub fn new(decls: &'a DeclTable, lowered: &'a LoweredModule, files: &'a [SourceFile]) -> Self {
        EmitInput {
            decls,
            lowered,
            files,
        }
    }

    /// Name of the module being emitted, taken from its first file.
    pub fn module_name(&self) -> &'a str {
        self.files.first().map_or("main", |file| {
            self.decls.name(self.decls.module(file.module).name)
        })
    }
}

/// A finished module.
#[derive(Debug)]
pub struct EmitOutput {
    pub module: NativeModule,
    /// Every object emission created that still has a name, in creation
    /// order.
    pub symbols: Vec<SymbolEntry>,
    /// Recoverable problems: symbol collisions and request cycles.
    pub diagnostics: Vec<Diagnostic>,
    pub debug: Option<DebugInfo>,
}

impl EmitOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Emit one module.
///
/// # Errors
///
/// Returns an [`EmitError`] when a declaration appears somewhere earlier
/// phases should have ruled out. Recoverable problems end up in
/// [`EmitOutput::diagnostics`] instead.
#[instrument(skip_all, fields(module = input.module_name(), files = input.files.len()), level = "debug")]
pub fn emit_module(input: &EmitInput<'_>, options: &EmitOptions) -> Result<EmitOutput, EmitError> {
    let evaluator = Evaluator::new(input.decls);
    let extensions = ExtensionBindings::resolve(&evaluator);
    let linker = Linker::new(
        Mangler::new(input.decls, input.lowered, &extensions),
        LinkagePolicy::new(input.decls, input.lowered),
    );
    let cache = ObjectCache::new(linker, NativeModule::new(input.module_name()));
    let mut cx = EmitCx::new(&evaluator, input.lowered, options, cache);

    for file in input.files {
        for &decl in &file.decls {
            cx.emit_global_decl(decl)?;
        }
    }
    cx.emit_global_top_level()?;

    let mut top_level = input
        .lowered
        .top_level_code
        .map(|id| cx.emit_lowered_function(id));
    for file in input.files {
        if file.is_script_mode() {
            emit_main(&mut cx, top_level);
        } else {
            emit_library_init(&mut cx, file, &mut top_level);
        }
    }

    let (mut cache, lists, debug) = cx.into_parts();
    lists.flush(&mut cache, options.pointer_align);
    let (module, symbols, sink) = cache.finish();
    let mut diagnostics = evaluator.take_diagnostics();
    diagnostics.extend(sink);
    debug!(
        objects = module.len(),
        diagnostics = diagnostics.len(),
        "finished module"
    );

    Ok(EmitOutput {
        module,
        symbols,
        diagnostics: diagnostics.into_diagnostics(),
        debug,
    })
}

/// `i32 main(i32 argc, ptr argv)` for a script file.
fn emit_main(cx: &mut EmitCx<'_>, top_level: Option<GlobalId>) -> GlobalId {
    let sig = Signature::new(
        FnType::new(vec![NativeType::Int(32), NativeType::Ptr], NativeType::Int(32)),
        CallConv::C,
    );
    let main = cx.cache.create_function(&LinkInfo::external("main"), &sig);
    if let Some(debug) = &mut cx.debug {
        debug.emit_artificial_function(main, "main");
    }

    let mut body = BodyBuilder::new();
    let accessor_sig = Signature::native(FnType::new(Vec::new(), NativeType::Ptr));
    for (param, global) in PROCESS_ARGUMENTS {
        let symbol = addressor_symbol(&cx.options.stdlib_module, global);
        let accessor = cx
            .cache
            .create_function(&LinkInfo::external(symbol), &accessor_sig);
        let address = body.call(Constant::Global(accessor), Vec::new());
        body.store(Value::Param(param), address);
    }

    // Nothing reads the registration sections of JIT-loaded code.
    if cx.options.foreign_interop && cx.options.use_jit {
        if let Some(init) = cx.emit_class_initializer() {
            body.call(Constant::Global(init), Vec::new());
        }
        if let Some(init) = cx.emit_category_initializer() {
            body.call(Constant::Global(init), Vec::new());
        }
    }

    if let Some(top) = top_level {
        body.call(Constant::Global(top), Vec::new());
    }
    let body = body.ret(Some(Constant::i32(0).into()));
    cx.cache.module_mut().set_body(main, body);
    debug!("emitted main");
    main
}

/// The module initializer for a library file, or nothing when the
/// top-level code is trivial. Trivial top-level code is erased.
fn emit_library_init(cx: &mut EmitCx<'_>, file: &SourceFile, top_level: &mut Option<GlobalId>) {
    let Some(top) = *top_level else {
        return;
    };
    let trivial = cx
        .cache
        .module()
        .get(top)
        .and_then(GlobalValue::body)
        .is_some_and(FnBody::is_trivial);
    if trivial {
        debug!(file = file.file_name(), "eliding trivial module initializer");
        cx.cache.erase(top);
        if let Some(debug) = &mut cx.debug {
            debug.erase_function(top);
        }
        *top_level = None;
        return;
    }

    let module_name = cx.decls.name(cx.decls.module(file.module).name);
    let name = format!("{module_name}.init.{}", file.file_name());
    let init = cx
        .cache
        .create_function(&LinkInfo::external(name.as_str()), &Signature::native(FnType::void()));
    if let Some(debug) = &mut cx.debug {
        debug.emit_artificial_function(init, &name);
    }
    let mut body = BodyBuilder::new();
    body.call(Constant::Global(top), Vec::new());
    cx.cache.module_mut().set_body(init, body.ret(None));
    cx.lists.add_ctor(MODULE_INIT_PRIORITY, init);
    debug!(%name, "emitted module initializer");
}
