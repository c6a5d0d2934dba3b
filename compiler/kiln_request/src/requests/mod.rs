//! Name-lookup requests.
//!
//! Each request answers one question about how syntactic type references
//! in a declaration resolve. They are cheap to construct and only do work
//! the first time they are asked through an [`Evaluator`].

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use kiln_ir::{DeclId, DeclKind};

use crate::evaluator::{ActiveRequest, Evaluator, Request, RequestCaches};
use crate::resolve::{direct_references, push_unique, resolve_to_nominal};

/// Declarations referenced by entry `index` of a type's or extension's
/// inheritance clause.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct InheritedDeclsRequest {
    pub decl: DeclId,
    pub index: usize,
}

impl Request for InheritedDeclsRequest {
    type Output = Vec<DeclId>;

    fn evaluate(&self, evaluator: &Evaluator<'_>) -> Vec<DeclId> {
        let decls = evaluator.decls();
        let Some(repr) = decls.get(self.decl).inherited().get(self.index) else {
            return Vec::new();
        };
        direct_references(evaluator, decls.module_of(self.decl), repr)
    }

    fn cycle_result(&self) -> Vec<DeclId> {
        Vec::new()
    }

    fn active(&self) -> ActiveRequest {
        ActiveRequest::InheritedDecls(*self)
    }

    fn cache(caches: &RequestCaches) -> &RefCell<FxHashMap<Self, Vec<DeclId>>> {
        &caches.inherited_decls
    }
}

/// Nominal declarations a typealias ultimately denotes.
///
/// Looks through chains of aliases, so `typealias A = B; typealias B = A`
/// is a cycle.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct UnderlyingTypeDeclsRequest {
    pub alias: DeclId,
}

impl Request for UnderlyingTypeDeclsRequest {
    type Output = Vec<DeclId>;

    fn evaluate(&self, evaluator: &Evaluator<'_>) -> Vec<DeclId> {
        let decls = evaluator.decls();
        let DeclKind::TypeAlias { underlying } = &decls.get(self.alias).kind else {
            return Vec::new();
        };
        let found = direct_references(evaluator, decls.module_of(self.alias), underlying);
        resolve_to_nominal(evaluator, &found)
    }

    fn cycle_result(&self) -> Vec<DeclId> {
        Vec::new()
    }

    fn active(&self) -> ActiveRequest {
        ActiveRequest::UnderlyingTypeDecls(*self)
    }

    fn cache(caches: &RequestCaches) -> &RefCell<FxHashMap<Self, Vec<DeclId>>> {
        &caches.underlying_type_decls
    }
}

/// The superclass declaration of a class, or the class bound of a protocol.
///
/// Answers `None` when there is none, and on a cycle.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SuperclassDeclRequest {
    pub decl: DeclId,
}

impl Request for SuperclassDeclRequest {
    type Output = Option<DeclId>;

    fn evaluate(&self, evaluator: &Evaluator<'_>) -> Option<DeclId> {
        let decls = evaluator.decls();
        let decl = decls.get(self.decl);
        if !decl.is_class() && !decl.is_protocol() {
            return None;
        }

        for index in 0..decl.inherited().len() {
            let found = evaluator.get(InheritedDeclsRequest {
                decl: self.decl,
                index,
            });
            let nominals = resolve_to_nominal(evaluator, &found);
            if let Some(&class) = nominals.iter().find(|&&n| decls.get(n).is_class()) {
                return Some(class);
            }
        }

        if decl.is_protocol() {
            let bounds = evaluator.get(SelfBoundsRequest { decl: self.decl });
            return bounds.into_iter().find(|&n| decls.get(n).is_class());
        }
        None
    }

    fn cycle_result(&self) -> Option<DeclId> {
        None
    }

    fn active(&self) -> ActiveRequest {
        ActiveRequest::SuperclassDecl(*self)
    }

    fn cache(caches: &RequestCaches) -> &RefCell<FxHashMap<Self, Option<DeclId>>> {
        &caches.superclass_decl
    }
}

/// The nominal type an extension extends.
///
/// A `None` answer is never cached: extensions may be bound again once more
/// declarations are known.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExtendedNominalRequest {
    pub ext: DeclId,
}

impl Request for ExtendedNominalRequest {
    type Output = Option<DeclId>;

    fn evaluate(&self, evaluator: &Evaluator<'_>) -> Option<DeclId> {
        let decls = evaluator.decls();
        let ext = decls.get(self.ext).as_extension()?;
        let found = direct_references(evaluator, decls.module_of(self.ext), &ext.extended);
        resolve_to_nominal(evaluator, &found).first().copied()
    }

    fn cycle_result(&self) -> Option<DeclId> {
        None
    }

    fn caches_result(&self, output: &Option<DeclId>) -> bool {
        output.is_some()
    }

    fn active(&self) -> ActiveRequest {
        ActiveRequest::ExtendedNominal(*self)
    }

    fn cache(caches: &RequestCaches) -> &RefCell<FxHashMap<Self, Option<DeclId>>> {
        &caches.extended_nominal
    }
}

/// Nominal bounds placed on `Self` by a protocol's or extension's `where`
/// clause.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SelfBoundsRequest {
    pub decl: DeclId,
}

impl Request for SelfBoundsRequest {
    type Output = Vec<DeclId>;

    fn evaluate(&self, evaluator: &Evaluator<'_>) -> Vec<DeclId> {
        let decls = evaluator.decls();
        let Some(self_name) = decls.interner().get("Self") else {
            return Vec::new();
        };
        let module = decls.module_of(self.decl);

        let mut result = Vec::new();
        for req in decls.get(self.decl).where_clause() {
            if req.subject.path.as_slice() != [self_name] {
                continue;
            }
            let found = direct_references(evaluator, module, &req.constraint);
            for nominal in resolve_to_nominal(evaluator, &found) {
                push_unique(&mut result, nominal);
            }
        }
        result
    }

    fn cycle_result(&self) -> Vec<DeclId> {
        Vec::new()
    }

    fn active(&self) -> ActiveRequest {
        ActiveRequest::SelfBounds(*self)
    }

    fn cache(caches: &RequestCaches) -> &RefCell<FxHashMap<Self, Vec<DeclId>>> {
        &caches.self_bounds
    }
}

/// Every type declaration referenced from a `where` clause, other than
/// `Self`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct WhereClauseTypeDeclsRequest {
    pub decl: DeclId,
}

impl Request for WhereClauseTypeDeclsRequest {
    type Output = Vec<DeclId>;

    fn evaluate(&self, evaluator: &Evaluator<'_>) -> Vec<DeclId> {
        let decls = evaluator.decls();
        let self_name = decls.interner().get("Self");
        let module = decls.module_of(self.decl);

        let mut result = Vec::new();
        for req in decls.get(self.decl).where_clause() {
            for repr in [&req.subject, &req.constraint] {
                if self_name.is_some_and(|s| repr.path.as_slice() == [s]) {
                    continue;
                }
                for decl in direct_references(evaluator, module, repr) {
                    push_unique(&mut result, decl);
                }
            }
        }
        result
    }

    fn cycle_result(&self) -> Vec<DeclId> {
        Vec::new()
    }

    fn active(&self) -> ActiveRequest {
        ActiveRequest::WhereClauseTypeDecls(*self)
    }

    fn cache(caches: &RequestCaches) -> &RefCell<FxHashMap<Self, Vec<DeclId>>> {
        &caches.where_clause_type_decls
    }
}

#[cfg(test)]
mod tests;
