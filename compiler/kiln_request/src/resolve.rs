//! Resolution of syntactic type references to declarations.

use kiln_ir::{DeclId, DeclKind, ModuleId, Name, TypeRepr};

use crate::{Evaluator, UnderlyingTypeDeclsRequest};

/// Declarations named by `repr` when looked up from `from`, without looking
/// through typealiases at the final component.
///
/// The first component is looked up among `from`'s top-level declarations,
/// then among every other module's. A first component naming a module
/// qualifies the second. Later components are members of the nominal types
/// the prefix resolves to, looking through typealiases.
pub fn direct_references(evaluator: &Evaluator<'_>, from: ModuleId, repr: &TypeRepr) -> Vec<DeclId> {
    let decls = evaluator.decls();
    let Some((&first, mut rest)) = repr.path.split_first() else {
        return Vec::new();
    };

    let mut current = lookup_unqualified(evaluator, from, first);
    if current.is_empty() {
        if let (Some(module), Some((&second, tail))) = (decls.module_by_name(first), rest.split_first())
        {
            current = decls.lookup_top_level(module, second).to_vec();
            rest = tail;
        }
    }

    for &component in rest {
        if current.is_empty() {
            break;
        }
        let owners = resolve_to_nominal(evaluator, &current);
        current = owners
            .iter()
            .flat_map(|&owner| decls.lookup_member(owner, component))
            .collect();
    }
    current
}

fn lookup_unqualified(evaluator: &Evaluator<'_>, from: ModuleId, name: Name) -> Vec<DeclId> {
    let decls = evaluator.decls();
    let local = decls.lookup_top_level(from, name);
    if !local.is_empty() {
        return local.to_vec();
    }
    decls
        .modules()
        .filter(|&m| m != from)
        .map(|m| decls.lookup_top_level(m, name))
        .find(|found| !found.is_empty())
        .map(<[DeclId]>::to_vec)
        .unwrap_or_default()
}

/// The nominal declarations denoted by `found`, looking through
/// typealiases. Non-type declarations are dropped.
pub fn resolve_to_nominal(evaluator: &Evaluator<'_>, found: &[DeclId]) -> Vec<DeclId> {
    let decls = evaluator.decls();
    let mut result = Vec::new();
    for &decl in found {
        match decls.get(decl).kind {
            DeclKind::Protocol(_) | DeclKind::Enum(_) | DeclKind::Struct(_) | DeclKind::Class(_) => {
                push_unique(&mut result, decl);
            }
            DeclKind::TypeAlias { .. } => {
                for nominal in evaluator.get(UnderlyingTypeDeclsRequest { alias: decl }) {
                    push_unique(&mut result, nominal);
                }
            }
            _ => {}
        }
    }
    result
}

pub(crate) fn push_unique(vec: &mut Vec<DeclId>, decl: DeclId) {
    if !vec.contains(&decl) {
        vec.push(decl);
    }
}
