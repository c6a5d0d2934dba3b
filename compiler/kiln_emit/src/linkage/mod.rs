//! Linkage and visibility classification.
//!
//! Classification is a pure function of an [`EntityKey`] and static facts
//! about the declarations it refers to. It never fails and never mutates,
//! so it can be recomputed freely.

use std::fmt;

use rustc_hash::FxHashSet;

use kiln_ir::lowered::{LoweredLinkage, LoweredModule};
use kiln_ir::{DeclId, DeclKind, DeclTable, GenericParam, Provenance, Ty};

use crate::entity::{CodeRef, EntityKey};
use crate::mangle::Mangler;

/// How a symbol binds across object files.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Linkage {
    External,
    Internal,
    /// Internal and left out of the symbol table.
    Private,
    /// Weak; identical definitions from several objects are merged.
    LinkOnceOdr,
    /// Arrays concatenated by the linker.
    Appending,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Linkage::External => "external",
            Linkage::Internal => "internal",
            Linkage::Private => "private",
            Linkage::LinkOnceOdr => "linkonce_odr",
            Linkage::Appending => "appending",
        })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Visibility {
    #[default]
    Default,
    Hidden,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Default => "default",
            Visibility::Hidden => "hidden",
        })
    }
}

/// Name, linkage and visibility of one entity.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct LinkInfo {
    pub name: String,
    pub linkage: Linkage,
    pub visibility: Visibility,
}

impl LinkInfo {
    pub fn new(name: impl Into<String>, linkage: Linkage, visibility: Visibility) -> Self {
        LinkInfo {
            name: name.into(),
            linkage,
            visibility,
        }
    }

    /// An exported symbol with default visibility.
    pub fn external(name: impl Into<String>) -> Self {
        Self::new(name, Linkage::External, Visibility::Default)
    }

    pub fn internal(name: impl Into<String>) -> Self {
        Self::new(name, Linkage::Internal, Visibility::Default)
    }
}

/// The facts linkage is decided from.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct EntityFacts {
    /// Only reachable from inside this module.
    pub local: bool,
    pub value_witness: bool,
    /// Synthesized for a foreign-imported declaration.
    pub thunk: bool,
    /// Copied from a prebuilt module.
    pub deserialized: bool,
}

#[derive(Copy, Clone)]
pub struct LinkagePolicy<'a> {
    decls: &'a DeclTable,
    lowered: &'a LoweredModule,
}

impl<'a> LinkagePolicy<'a> {
    pub fn new(decls: &'a DeclTable, lowered: &'a LoweredModule) -> Self {
        LinkagePolicy { decls, lowered }
    }

    /// Decide linkage and visibility. The first matching rule wins, so a
    /// local thunk stays internal.
    pub fn classify(facts: EntityFacts) -> (Linkage, Visibility) {
        if facts.local {
            (Linkage::Internal, Visibility::Default)
        } else if facts.value_witness || facts.thunk || facts.deserialized {
            (Linkage::LinkOnceOdr, Visibility::Hidden)
        } else {
            (Linkage::External, Visibility::Default)
        }
    }

    pub fn facts(&self, key: &EntityKey) -> EntityFacts {
        EntityFacts {
            local: self.is_local(key),
            value_witness: key.is_value_witness(),
            thunk: self.is_thunk(key),
            deserialized: self.is_deserialized(key),
        }
    }

    fn is_local(&self, key: &EntityKey) -> bool {
        match key {
            EntityKey::LoweredFunction(id) => {
                self.lowered.function(*id).linkage == LoweredLinkage::Internal
            }
            EntityKey::LoweredGlobal(id) => {
                self.lowered.global(*id).linkage == LoweredLinkage::Internal
            }
            EntityKey::WitnessTable(_) => false,
            _ => {
                if let Some(ty) = key.ty() {
                    self.is_local_type(ty)
                } else if let Some(decl) = key.decl() {
                    self.is_local_decl(decl)
                } else {
                    false
                }
            }
        }
    }

    /// Whether a declaration is only reachable from inside this module:
    /// it sits in a function body, or one of its generic parameters is
    /// bounded by a type that does.
    pub fn is_local_decl(&self, decl: DeclId) -> bool {
        self.decl_is_local(decl, &mut FxHashSet::default())
    }

    /// Whether a type mentions a local declaration, directly or through
    /// the bounds of a generic parameter.
    pub fn is_local_type(&self, ty: &Ty) -> bool {
        self.type_is_local(ty, &mut FxHashSet::default())
    }

    fn decl_is_local(&self, decl: DeclId, visited: &mut FxHashSet<DeclId>) -> bool {
        // Bounds may refer back to the declaration being checked.
        if !visited.insert(decl) {
            return false;
        }
        if self.decls.is_in_local_context(decl) {
            return true;
        }
        match self.decls.get(decl).as_nominal() {
            Some(nominal) => nominal
                .generic_params
                .iter()
                .any(|param| self.param_is_local(param, visited)),
            None => false,
        }
    }

    fn param_is_local(&self, param: &GenericParam, visited: &mut FxHashSet<DeclId>) -> bool {
        param
            .protocols
            .iter()
            .any(|&protocol| self.decl_is_local(protocol, visited))
            || param
                .superclass
                .as_ref()
                .is_some_and(|superclass| self.type_is_local(superclass, visited))
    }

    fn type_is_local(&self, ty: &Ty, visited: &mut FxHashSet<DeclId>) -> bool {
        ty.any(&mut |t| match t {
            Ty::Nominal { decl, .. } => self.decl_is_local(*decl, visited),
            Ty::Polymorphic { params, .. } => params
                .iter()
                .any(|param| self.param_is_local(param, visited)),
            _ => false,
        })
    }

    fn is_imported(&self, decl: DeclId) -> bool {
        self.decls.get(decl).is_foreign_imported() || self.decls.is_foreign_module(decl)
    }

    fn is_thunk(&self, key: &EntityKey) -> bool {
        match key {
            EntityKey::LoweredFunction(id) => {
                self.lowered.function(*id).linkage == LoweredLinkage::Thunk
            }
            EntityKey::LoweredGlobal(id) => self.lowered.global(*id).linkage == LoweredLinkage::Thunk,
            EntityKey::NominalTypeDescriptor(decl)
            | EntityKey::ProtocolDescriptor(decl)
            | EntityKey::Constructor(CodeRef { decl, .. }, _) => {
                self.is_imported(*decl)
            }
            _ => {
                if let Some(ty) = key.ty() {
                    return ty.nominal_decl().is_some_and(|decl| self.is_imported(decl));
                }
                let Some(decl) = key.decl() else {
                    return false;
                };
                let d = self.decls.get(decl);
                let synthesized = match d.kind {
                    DeclKind::Subscript(_) => true,
                    DeclKind::Var(_) => d.is_computed(),
                    _ => false,
                };
                synthesized && self.is_imported(decl)
            }
        }
    }

    fn is_deserialized(&self, key: &EntityKey) -> bool {
        match key {
            EntityKey::LoweredFunction(id) => {
                self.lowered.function(*id).linkage == LoweredLinkage::Deserialized
            }
            EntityKey::LoweredGlobal(id) => {
                self.lowered.global(*id).linkage == LoweredLinkage::Deserialized
            }
            _ => key
                .decl()
                .is_some_and(|decl| self.decls.get(decl).provenance == Provenance::Deserialized),
        }
    }
}

/// Computes full [`LinkInfo`] for entity keys.
#[derive(Copy, Clone)]
pub struct Linker<'a> {
    mangler: Mangler<'a>,
    policy: LinkagePolicy<'a>,
}

impl<'a> Linker<'a> {
    pub fn new(mangler: Mangler<'a>, policy: LinkagePolicy<'a>) -> Self {
        Linker { mangler, policy }
    }

    pub fn link_info(&self, key: &EntityKey) -> LinkInfo {
        let (linkage, visibility) = LinkagePolicy::classify(self.policy.facts(key));
        LinkInfo {
            name: self.mangler.mangle(key),
            linkage,
            visibility,
        }
    }

    pub fn mangler(&self) -> &Mangler<'a> {
        &self.mangler
    }

    pub fn policy(&self) -> &LinkagePolicy<'a> {
        &self.policy
    }
}
