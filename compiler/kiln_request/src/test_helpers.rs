//! Shared test utilities for request tests. Only compiled in test builds.

use kiln_ir::{
    Decl, DeclContext, DeclId, DeclKind, DeclTable, ExtensionDecl, ModuleId, ModuleKind,
    NominalDecl, Requirement, Span, TypeRepr,
};

/// A declaration table with one source module, `app`.
///
/// Every declaration gets a distinct span so diagnostics can be checked
/// against the declaration they point at.
pub(crate) struct Fixture {
    pub decls: DeclTable,
    pub module: ModuleId,
    next_offset: u32,
}

impl Fixture {
    pub fn new() -> Self {
        let mut decls = DeclTable::new();
        let module = decls.add_module("app", ModuleKind::Source);
        Fixture {
            decls,
            module,
            next_offset: 0,
        }
    }

    pub fn span(&mut self) -> Span {
        let start = self.next_offset;
        self.next_offset += 10;
        Span::new(start, start + 5)
    }

    /// A dotted type reference such as `"Outer.Inner"`.
    pub fn repr(&mut self, path: &str) -> TypeRepr {
        let path = path.split('.').map(|c| self.decls.intern(c)).collect();
        let span = self.span();
        TypeRepr::new(path, span)
    }

    pub fn add(&mut self, name: &str, kind: DeclKind) -> DeclId {
        self.add_in(DeclContext::Module(self.module), name, kind)
    }

    pub fn add_in(&mut self, context: DeclContext, name: &str, kind: DeclKind) -> DeclId {
        let name = self.decls.intern(name);
        let span = self.span();
        self.decls
            .alloc(Decl::new(name, context, kind).with_span(span))
    }

    pub fn class(&mut self, name: &str, inherited: &[&str]) -> DeclId {
        let inherited = inherited.iter().map(|p| self.repr(p)).collect();
        self.add(
            name,
            DeclKind::Class(NominalDecl::default().with_inherited(inherited)),
        )
    }

    pub fn protocol(&mut self, name: &str, inherited: &[&str], self_bounds: &[&str]) -> DeclId {
        let inherited = inherited.iter().map(|p| self.repr(p)).collect();
        let where_clause = self_bounds
            .iter()
            .map(|b| Requirement {
                subject: self.repr("Self"),
                constraint: self.repr(b),
            })
            .collect();
        self.add(
            name,
            DeclKind::Protocol(
                NominalDecl::default()
                    .with_inherited(inherited)
                    .with_where_clause(where_clause),
            ),
        )
    }

    pub fn strukt(&mut self, name: &str) -> DeclId {
        self.add(name, DeclKind::Struct(NominalDecl::default()))
    }

    pub fn alias(&mut self, name: &str, target: &str) -> DeclId {
        let underlying = self.repr(target);
        self.add(name, DeclKind::TypeAlias { underlying })
    }

    pub fn extension(&mut self, target: &str) -> DeclId {
        let extended = self.repr(target);
        self.add("", DeclKind::Extension(ExtensionDecl::new(extended)))
    }
}
