//! Shared test utilities for emission tests. Only compiled in test builds.

use kiln_ir::lowered::{
    Body, CodeKind, FnType, FunctionId, LoweredFunction, LoweredModule, LoweredOrigin, NativeType,
    Signature,
};
use kiln_ir::{
    BuiltinTy, Decl, DeclContext, DeclFlags, DeclId, DeclKind, DeclTable, ExtensionDecl, FuncDecl,
    ModuleId, ModuleKind, NominalDecl, Provenance, StorageDecl, Ty, TypeRepr,
};

use kiln_request::Evaluator;

use crate::cache::ObjectCache;
use crate::decl::EmitCx;
use crate::linkage::{LinkagePolicy, Linker};
use crate::mangle::{ExtensionBindings, Mangler};
use crate::native::NativeModule;
use crate::options::EmitOptions;

/// A declaration table with a source module `app` and a foreign module
/// `Foundation`, plus an empty lowered module.
pub(crate) struct Fixture {
    pub decls: DeclTable,
    pub lowered: LoweredModule,
    pub module: ModuleId,
    pub foreign: ModuleId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut decls = DeclTable::new();
        let module = decls.add_module("app", ModuleKind::Source);
        let foreign = decls.add_module("Foundation", ModuleKind::Foreign);
        Fixture {
            decls,
            lowered: LoweredModule::default(),
            module,
            foreign,
        }
    }

    pub fn top(&self) -> DeclContext {
        DeclContext::Module(self.module)
    }

    pub fn add(&mut self, name: &str, kind: DeclKind) -> DeclId {
        self.add_in(self.top(), name, kind)
    }

    pub fn add_in(&mut self, context: DeclContext, name: &str, kind: DeclKind) -> DeclId {
        let name = self.decls.intern(name);
        self.decls.alloc(Decl::new(name, context, kind))
    }

    pub fn build(&mut self, context: DeclContext, name: &str, kind: DeclKind) -> Decl {
        let name = self.decls.intern(name);
        Decl::new(name, context, kind)
    }

    pub fn alloc(&mut self, decl: Decl) -> DeclId {
        self.decls.alloc(decl)
    }

    pub fn int() -> Ty {
        Ty::Builtin(BuiltinTy::Int(64))
    }

    pub fn unit_fn() -> Ty {
        Ty::function(Ty::unit(), Ty::unit())
    }

    pub fn func(&mut self, name: &str, ty: Ty) -> DeclId {
        self.add(name, DeclKind::Func(FuncDecl::new(ty)))
    }

    pub fn func_in(&mut self, context: DeclContext, name: &str, ty: Ty) -> DeclId {
        self.add_in(context, name, DeclKind::Func(FuncDecl::new(ty)))
    }

    pub fn strukt(&mut self, name: &str) -> DeclId {
        self.add(name, DeclKind::Struct(NominalDecl::default()))
    }

    pub fn class(&mut self, name: &str) -> DeclId {
        self.add(name, DeclKind::Class(NominalDecl::default()))
    }

    pub fn protocol(&mut self, name: &str) -> DeclId {
        self.add(name, DeclKind::Protocol(NominalDecl::default()))
    }

    /// A class imported from the foreign module.
    pub fn foreign_class(&mut self, name: &str) -> DeclId {
        let decl = self
            .build(
                DeclContext::Module(self.foreign),
                name,
                DeclKind::Class(NominalDecl::default()),
            )
            .with_provenance(Provenance::ForeignImported);
        self.alloc(decl)
    }

    pub fn stored_var(&mut self, context: DeclContext, name: &str) -> DeclId {
        self.add_in(
            context,
            name,
            DeclKind::Var(StorageDecl::new(Self::int(), NativeType::Int(64))),
        )
    }

    pub fn computed_var(&mut self, context: DeclContext, name: &str, flags: DeclFlags) -> DeclId {
        let decl = self
            .build(
                context,
                name,
                DeclKind::Var(StorageDecl::new(Self::int(), NativeType::Int(64))),
            )
            .with_flags(DeclFlags::COMPUTED | flags);
        self.alloc(decl)
    }

    /// An extension of the top-level type `target`.
    pub fn extension(&mut self, target: &str) -> DeclId {
        let path = vec![self.decls.intern(target)];
        let extended = TypeRepr::new(path, kiln_ir::Span::default());
        self.add("", DeclKind::Extension(ExtensionDecl::new(extended)))
    }

    /// Lower `decl` to a function named `name` returning immediately.
    pub fn lower(&mut self, decl: DeclId, name: &str) -> FunctionId {
        self.lower_as(LoweredOrigin::func(decl, 0), name)
    }

    pub fn lower_as(&mut self, origin: LoweredOrigin, name: &str) -> FunctionId {
        self.lowered.add_function(
            LoweredFunction::new(name, Signature::native(FnType::void()))
                .with_origin(origin)
                .with_body(Body::empty_return()),
        )
    }

    /// A foreign entry point of `decl` with the given accessor kind.
    pub fn lower_foreign(&mut self, decl: DeclId, kind: CodeKind, name: &str) -> FunctionId {
        let origin = LoweredOrigin {
            decl,
            kind,
            uncurry_level: 1,
            foreign: true,
        };
        let sig = Signature::native(FnType::new(vec![NativeType::Ptr, NativeType::Ptr], NativeType::Ptr));
        self.lowered.add_function(
            LoweredFunction::new(name, sig)
                .with_origin(origin)
                .with_body(Body::empty_return()),
        )
    }

    pub fn mangler<'a>(&'a self, extensions: &'a ExtensionBindings) -> Mangler<'a> {
        Mangler::new(&self.decls, &self.lowered, extensions)
    }

    pub fn linker<'a>(&'a self, extensions: &'a ExtensionBindings) -> Linker<'a> {
        Linker::new(
            self.mangler(extensions),
            LinkagePolicy::new(&self.decls, &self.lowered),
        )
    }

    pub fn cache<'a>(&'a self, extensions: &'a ExtensionBindings) -> ObjectCache<'a> {
        ObjectCache::new(self.linker(extensions), NativeModule::new("app"))
    }

    /// Run `f` against a fresh emission context over this fixture.
    pub fn with_cx<R>(&self, options: &EmitOptions, f: impl FnOnce(&mut EmitCx<'_>) -> R) -> R {
        let evaluator = Evaluator::new(&self.decls);
        let extensions = ExtensionBindings::resolve(&evaluator);
        let cache = self.cache(&extensions);
        let mut cx = EmitCx::new(&evaluator, &self.lowered, options, cache);
        f(&mut cx)
    }
}
