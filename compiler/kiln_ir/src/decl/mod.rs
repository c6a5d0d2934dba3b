//! Resolved declarations.
//!
//! Declarations live in the [`DeclTable`] arena and refer to each other by
//! [`DeclId`]. The set of declaration kinds is closed: every consumer matches
//! on [`DeclKind`] exhaustively.

mod table;

use bitflags::bitflags;

use crate::lowered::NativeType;
use crate::{GenericParam, ModuleId, Name, Span, Ty};

pub use table::DeclTable;

/// Index of a declaration in the [`DeclTable`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct DeclId(u32);

impl DeclId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        DeclId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a protocol conformance in the [`DeclTable`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ConformanceId(u32);

impl ConformanceId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        ConformanceId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The lexical parent of a declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DeclContext {
    Module(ModuleId),
    /// Member of a struct, enum, class or protocol.
    Nominal(DeclId),
    /// Member of an extension.
    Extension(DeclId),
    /// Declared inside the body of a function or constructor.
    Local { parent: DeclId, discriminator: u32 },
}

/// Where a declaration came from.
///
/// Thunk and deserialized linkage are both derived from this, so it is
/// recorded by the frontend rather than recomputed.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Provenance {
    /// Written in a source file of this compilation.
    #[default]
    Source,
    /// Synthesized while importing a foreign runtime header.
    ForeignImported,
    /// Read back from a prebuilt module.
    Deserialized,
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct DeclFlags: u8 {
        /// Type member rather than instance member.
        const STATIC = 1 << 0;
        /// Exposed to the foreign object runtime.
        const FOREIGN = 1 << 1;
        /// Property without storage; accessed through getter and setter.
        const COMPUTED = 1 << 2;
        /// Property or subscript with a setter.
        const SETTABLE = 1 << 3;
    }
}

/// An unresolved syntactic type reference such as `Outer.Inner`.
///
/// Name lookup turns these into declarations; see `kiln_request`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TypeRepr {
    pub path: Vec<Name>,
    pub span: Span,
}

impl TypeRepr {
    pub fn new(path: Vec<Name>, span: Span) -> Self {
        TypeRepr { path, span }
    }

    pub fn simple(name: Name, span: Span) -> Self {
        TypeRepr {
            path: vec![name],
            span,
        }
    }
}

/// A `where` clause requirement `subject: constraint`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Requirement {
    pub subject: TypeRepr,
    pub constraint: TypeRepr,
}

/// A struct, enum, class or protocol body.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct NominalDecl {
    pub generic_params: Vec<GenericParam>,
    /// Inheritance clause, in source order.
    pub inherited: Vec<TypeRepr>,
    pub conformances: Vec<ConformanceId>,
    pub members: Vec<DeclId>,
    pub where_clause: Vec<Requirement>,
}

impl NominalDecl {
    #[must_use]
    pub fn with_generic_params(mut self, params: Vec<GenericParam>) -> Self {
        self.generic_params = params;
        self
    }

    #[must_use]
    pub fn with_inherited(mut self, inherited: Vec<TypeRepr>) -> Self {
        self.inherited = inherited;
        self
    }

    #[must_use]
    pub fn with_where_clause(mut self, where_clause: Vec<Requirement>) -> Self {
        self.where_clause = where_clause;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ExtensionDecl {
    pub extended: TypeRepr,
    pub inherited: Vec<TypeRepr>,
    pub conformances: Vec<ConformanceId>,
    pub members: Vec<DeclId>,
    pub where_clause: Vec<Requirement>,
}

impl ExtensionDecl {
    pub fn new(extended: TypeRepr) -> Self {
        ExtensionDecl {
            extended,
            inherited: Vec::new(),
            conformances: Vec::new(),
            members: Vec::new(),
            where_clause: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_inherited(mut self, inherited: Vec<TypeRepr>) -> Self {
        self.inherited = inherited;
        self
    }

    #[must_use]
    pub fn with_where_clause(mut self, where_clause: Vec<Requirement>) -> Self {
        self.where_clause = where_clause;
        self
    }
}

/// A function, method or constructor.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FuncDecl {
    /// Formal type; `Ty::Polymorphic` when the function has a generic clause.
    pub ty: Ty,
    /// Argument labels, used to derive foreign selectors.
    pub params: Vec<Name>,
    /// Declarations nested in the body.
    pub locals: Vec<DeclId>,
    /// Selector given explicitly in source, if any.
    pub foreign_selector: Option<Name>,
}

impl FuncDecl {
    pub fn new(ty: Ty) -> Self {
        FuncDecl {
            ty,
            params: Vec::new(),
            locals: Vec::new(),
            foreign_selector: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<Name>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Name) -> Self {
        self.foreign_selector = Some(selector);
        self
    }
}

/// A variable, property or subscript.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StorageDecl {
    /// Value type (element type for subscripts).
    pub ty: Ty,
    /// Index type for subscripts.
    pub indices: Option<Ty>,
    /// Lowered storage for stored properties and globals.
    pub storage: NativeType,
    pub foreign_selector: Option<Name>,
}

impl StorageDecl {
    pub fn new(ty: Ty, storage: NativeType) -> Self {
        StorageDecl {
            ty,
            indices: None,
            storage,
            foreign_selector: None,
        }
    }

    #[must_use]
    pub fn with_indices(mut self, indices: Ty) -> Self {
        self.indices = Some(indices);
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Name) -> Self {
        self.foreign_selector = Some(selector);
        self
    }
}

/// Declaration kinds.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum DeclKind {
    Import { path: Vec<Name> },
    Extension(ExtensionDecl),
    PatternBinding { vars: Vec<DeclId> },
    EnumCase { elements: Vec<DeclId> },
    EnumElement { payload: Option<Ty> },
    TopLevelCode,
    TypeAlias { underlying: TypeRepr },
    GenericTypeParam { inherited: Vec<TypeRepr> },
    AssociatedType { inherited: Vec<TypeRepr> },
    Subscript(StorageDecl),
    Constructor(FuncDecl),
    Destructor,
    Var(StorageDecl),
    Func(FuncDecl),
    Protocol(NominalDecl),
    Enum(NominalDecl),
    Struct(NominalDecl),
    Class(NominalDecl),
    InfixOperator,
    PrefixOperator,
    PostfixOperator,
}

impl DeclKind {
    /// Short lowercase name for diagnostics and logs.
    pub fn describe(&self) -> &'static str {
        match self {
            DeclKind::Import { .. } => "import",
            DeclKind::Extension(_) => "extension",
            DeclKind::PatternBinding { .. } => "pattern binding",
            DeclKind::EnumCase { .. } => "enum case",
            DeclKind::EnumElement { .. } => "enum element",
            DeclKind::TopLevelCode => "top-level code",
            DeclKind::TypeAlias { .. } => "typealias",
            DeclKind::GenericTypeParam { .. } => "generic parameter",
            DeclKind::AssociatedType { .. } => "associated type",
            DeclKind::Subscript(_) => "subscript",
            DeclKind::Constructor(_) => "constructor",
            DeclKind::Destructor => "destructor",
            DeclKind::Var(_) => "var",
            DeclKind::Func(_) => "func",
            DeclKind::Protocol(_) => "protocol",
            DeclKind::Enum(_) => "enum",
            DeclKind::Struct(_) => "struct",
            DeclKind::Class(_) => "class",
            DeclKind::InfixOperator => "infix operator",
            DeclKind::PrefixOperator => "prefix operator",
            DeclKind::PostfixOperator => "postfix operator",
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Decl {
    pub name: Name,
    pub span: Span,
    pub context: DeclContext,
    pub provenance: Provenance,
    pub flags: DeclFlags,
    pub kind: DeclKind,
}

impl Decl {
    pub fn new(name: Name, context: DeclContext, kind: DeclKind) -> Self {
        Decl {
            name,
            span: Span::DUMMY,
            context,
            provenance: Provenance::Source,
            flags: DeclFlags::empty(),
            kind,
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: DeclFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(DeclFlags::STATIC)
    }

    /// Exposed to the foreign object runtime, either explicitly or because
    /// it was imported from it.
    #[inline]
    pub fn is_foreign(&self) -> bool {
        self.flags.contains(DeclFlags::FOREIGN) || self.is_foreign_imported()
    }

    #[inline]
    pub fn is_foreign_imported(&self) -> bool {
        matches!(self.provenance, Provenance::ForeignImported)
    }

    #[inline]
    pub fn is_computed(&self) -> bool {
        self.flags.contains(DeclFlags::COMPUTED)
    }

    #[inline]
    pub fn is_settable(&self) -> bool {
        self.flags.contains(DeclFlags::SETTABLE)
    }

    /// The nominal body of a struct, enum, class or protocol.
    pub fn as_nominal(&self) -> Option<&NominalDecl> {
        match &self.kind {
            DeclKind::Protocol(n) | DeclKind::Enum(n) | DeclKind::Struct(n) | DeclKind::Class(n) => {
                Some(n)
            }
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncDecl> {
        match &self.kind {
            DeclKind::Func(f) | DeclKind::Constructor(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageDecl> {
        match &self.kind {
            DeclKind::Var(s) | DeclKind::Subscript(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_extension(&self) -> Option<&ExtensionDecl> {
        match &self.kind {
            DeclKind::Extension(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, DeclKind::Class(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self.kind, DeclKind::Protocol(_))
    }

    /// Inheritance clause of a type or extension declaration.
    pub fn inherited(&self) -> &[TypeRepr] {
        match &self.kind {
            DeclKind::Protocol(n) | DeclKind::Enum(n) | DeclKind::Struct(n) | DeclKind::Class(n) => {
                &n.inherited
            }
            DeclKind::Extension(e) => &e.inherited,
            DeclKind::GenericTypeParam { inherited } | DeclKind::AssociatedType { inherited } => {
                inherited
            }
            _ => &[],
        }
    }

    /// `where` clause of a type or extension declaration.
    pub fn where_clause(&self) -> &[Requirement] {
        match &self.kind {
            DeclKind::Protocol(n) | DeclKind::Enum(n) | DeclKind::Struct(n) | DeclKind::Class(n) => {
                &n.where_clause
            }
            DeclKind::Extension(e) => &e.where_clause,
            _ => &[],
        }
    }

    /// Members of a nominal type or extension.
    pub fn members(&self) -> &[DeclId] {
        match &self.kind {
            DeclKind::Protocol(n) | DeclKind::Enum(n) | DeclKind::Struct(n) | DeclKind::Class(n) => {
                &n.members
            }
            DeclKind::Extension(e) => &e.members,
            _ => &[],
        }
    }

    /// Conformances declared by a nominal type or extension.
    pub fn conformances(&self) -> &[ConformanceId] {
        match &self.kind {
            DeclKind::Protocol(n) | DeclKind::Enum(n) | DeclKind::Struct(n) | DeclKind::Class(n) => {
                &n.conformances
            }
            DeclKind::Extension(e) => &e.conformances,
            _ => &[],
        }
    }
}

/// A protocol conformance and the conformances it implies.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Conformance {
    pub protocol: DeclId,
    /// The conforming type.
    pub ty: Ty,
    /// Conformances to the protocols `protocol` inherits from.
    pub inherited: Vec<ConformanceId>,
}

impl Conformance {
    pub fn new(protocol: DeclId, ty: Ty) -> Self {
        Conformance {
            protocol,
            ty,
            inherited: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_inherited(mut self, inherited: Vec<ConformanceId>) -> Self {
        self.inherited = inherited;
        self
    }
}
