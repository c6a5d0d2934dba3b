//! Declaration arena.

use std::ops::Index;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::{Conformance, ConformanceId, Decl, DeclContext, DeclId, DeclKind};
use crate::{ModuleId, ModuleInfo, ModuleKind, Name, StringInterner, Ty};

/// Arena owning every declaration, module and conformance of a compilation.
///
/// Allocation registers a declaration with its parent: members are appended
/// to their nominal type or extension, locals to their function, and named
/// module-scope declarations become visible to top-level lookup. A parent
/// must be allocated before its children, so every context chain strictly
/// descends in `DeclId` and walking it terminates.
pub struct DeclTable {
    interner: StringInterner,
    modules: Vec<ModuleInfo>,
    module_names: FxHashMap<Name, ModuleId>,
    decls: Vec<Decl>,
    conformances: Vec<Conformance>,
    top_level: FxHashMap<(ModuleId, Name), SmallVec<[DeclId; 2]>>,
}

impl DeclTable {
    pub fn new() -> Self {
        DeclTable {
            interner: StringInterner::new(),
            modules: Vec::new(),
            module_names: FxHashMap::default(),
            decls: Vec::new(),
            conformances: Vec::new(),
            top_level: FxHashMap::default(),
        }
    }

    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    #[inline]
    pub fn intern(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    /// The string for an interned name.
    #[inline]
    pub fn name(&self, name: Name) -> &'static str {
        self.interner.lookup(name)
    }

    pub fn add_module(&mut self, name: &str, kind: ModuleKind) -> ModuleId {
        let name = self.interner.intern(name);
        if let Some(&existing) = self.module_names.get(&name) {
            return existing;
        }
        let id = ModuleId::new(to_u32(self.modules.len()));
        self.modules.push(ModuleInfo { name, kind });
        self.module_names.insert(name, id);
        id
    }

    #[inline]
    pub fn module(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.index()]
    }

    pub fn module_by_name(&self, name: Name) -> Option<ModuleId> {
        self.module_names.get(&name).copied()
    }

    pub fn modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        (0..self.modules.len()).map(|i| ModuleId::new(to_u32(i)))
    }

    /// Allocate a declaration and register it with its parent.
    pub fn alloc(&mut self, decl: Decl) -> DeclId {
        let id = DeclId::new(to_u32(self.decls.len()));
        let name = decl.name;
        let registers_top_level = !name.is_empty()
            && !matches!(
                decl.kind,
                DeclKind::Extension(_)
                    | DeclKind::Import { .. }
                    | DeclKind::TopLevelCode
                    | DeclKind::PatternBinding { .. }
            );

        match decl.context {
            DeclContext::Module(module) => {
                if registers_top_level {
                    self.top_level.entry((module, name)).or_default().push(id);
                }
            }
            DeclContext::Nominal(parent) | DeclContext::Extension(parent) => {
                debug_assert!(parent < id, "parent must be allocated first");
                if let Some(parent) = self.decls.get_mut(parent.index()) {
                    match &mut parent.kind {
                        DeclKind::Protocol(n)
                        | DeclKind::Enum(n)
                        | DeclKind::Struct(n)
                        | DeclKind::Class(n) => n.members.push(id),
                        DeclKind::Extension(e) => e.members.push(id),
                        _ => {}
                    }
                }
            }
            DeclContext::Local { parent, .. } => {
                debug_assert!(parent < id, "parent must be allocated first");
                if let Some(parent) = self.decls.get_mut(parent.index()) {
                    if let DeclKind::Func(f) | DeclKind::Constructor(f) = &mut parent.kind {
                        f.locals.push(id);
                    }
                }
            }
        }

        self.decls.push(decl);
        id
    }

    #[inline]
    pub fn get(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (DeclId::new(to_u32(i)), d))
    }

    /// Record a conformance declared by `owner` (a nominal type or
    /// extension).
    pub fn add_conformance(&mut self, owner: DeclId, conformance: Conformance) -> ConformanceId {
        let id = ConformanceId::new(to_u32(self.conformances.len()));
        self.conformances.push(conformance);
        if let Some(owner) = self.decls.get_mut(owner.index()) {
            match &mut owner.kind {
                DeclKind::Protocol(n) | DeclKind::Enum(n) | DeclKind::Struct(n) | DeclKind::Class(n) => {
                    n.conformances.push(id);
                }
                DeclKind::Extension(e) => e.conformances.push(id),
                _ => {}
            }
        }
        id
    }

    #[inline]
    pub fn conformance(&self, id: ConformanceId) -> &Conformance {
        &self.conformances[id.index()]
    }

    /// Named module-scope declarations of `module`.
    pub fn lookup_top_level(&self, module: ModuleId, name: Name) -> &[DeclId] {
        self.top_level
            .get(&(module, name))
            .map(SmallVec::as_slice)
            .unwrap_or(&[])
    }

    /// Direct members of a nominal type or extension named `name`.
    pub fn lookup_member(&self, owner: DeclId, name: Name) -> impl Iterator<Item = DeclId> + '_ {
        self.get(owner)
            .members()
            .iter()
            .copied()
            .filter(move |&m| self.get(m).name == name)
    }

    /// The declaration a context belongs to, if it is not a module.
    pub fn context_decl(context: DeclContext) -> Option<DeclId> {
        match context {
            DeclContext::Module(_) => None,
            DeclContext::Nominal(d) | DeclContext::Extension(d) => Some(d),
            DeclContext::Local { parent, .. } => Some(parent),
        }
    }

    /// The module a declaration belongs to.
    pub fn module_of(&self, id: DeclId) -> ModuleId {
        let mut context = self.get(id).context;
        loop {
            match context {
                DeclContext::Module(m) => return m,
                DeclContext::Nominal(d) | DeclContext::Extension(d) => context = self.get(d).context,
                DeclContext::Local { parent, .. } => context = self.get(parent).context,
            }
        }
    }

    /// Whether the declaration is nested, at any depth, in a function body.
    pub fn is_in_local_context(&self, id: DeclId) -> bool {
        let mut context = self.get(id).context;
        loop {
            match context {
                DeclContext::Module(_) => return false,
                DeclContext::Local { .. } => return true,
                DeclContext::Nominal(d) | DeclContext::Extension(d) => context = self.get(d).context,
            }
        }
    }

    pub fn is_foreign_module(&self, id: DeclId) -> bool {
        self.module(self.module_of(id)).is_foreign()
    }

    /// The unbound declared type of a nominal declaration.
    pub fn declared_type(&self, id: DeclId) -> Ty {
        Ty::nominal(id)
    }

    /// Dotted path from the module to the declaration, for logs.
    pub fn qualified_name(&self, id: DeclId) -> String {
        let mut parts = vec![self.name(self.get(id).name)];
        let mut context = self.get(id).context;
        loop {
            match context {
                DeclContext::Module(m) => {
                    parts.push(self.name(self.module(m).name));
                    break;
                }
                DeclContext::Nominal(d) | DeclContext::Local { parent: d, .. } => {
                    parts.push(self.name(self.get(d).name));
                    context = self.get(d).context;
                }
                DeclContext::Extension(d) => context = self.get(d).context,
            }
        }
        parts.reverse();
        parts.join(".")
    }
}

impl Default for DeclTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<DeclId> for DeclTable {
    type Output = Decl;

    fn index(&self, id: DeclId) -> &Decl {
        self.get(id)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "arena sizes are bounded far below u32::MAX"
)]
fn to_u32(index: usize) -> u32 {
    index as u32
}
