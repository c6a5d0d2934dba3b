use pretty_assertions::assert_eq;

use kiln_ir::{DeclKind, NominalDecl, Requirement};

use super::*;
use crate::test_helpers::Fixture;

#[test]
fn test_inherited_decls() {
    let mut fx = Fixture::new();
    let base = fx.class("Base", &[]);
    let proto = fx.protocol("Drawable", &[], &[]);
    let derived = fx.class("Derived", &["Drawable", "Base"]);

    let evaluator = Evaluator::new(&fx.decls);
    let entry = |index| evaluator.get(InheritedDeclsRequest { decl: derived, index });
    assert_eq!(entry(0), vec![proto]);
    assert_eq!(entry(1), vec![base]);
    assert!(entry(2).is_empty());
}

#[test]
fn test_superclass_through_alias() {
    let mut fx = Fixture::new();
    let base = fx.class("Base", &[]);
    fx.protocol("Drawable", &[], &[]);
    fx.alias("BaseAlias", "Base");
    let derived = fx.class("Derived", &["Drawable", "BaseAlias"]);

    let evaluator = Evaluator::new(&fx.decls);
    assert_eq!(evaluator.get(SuperclassDeclRequest { decl: derived }), Some(base));
    assert_eq!(evaluator.get(SuperclassDeclRequest { decl: base }), None);
}

#[test]
fn test_superclass_of_struct_is_none() {
    let mut fx = Fixture::new();
    fx.class("Base", &[]);
    let inherited = vec![fx.repr("Base")];
    let point = fx.add(
        "Point",
        DeclKind::Struct(NominalDecl::default().with_inherited(inherited)),
    );

    let evaluator = Evaluator::new(&fx.decls);
    assert_eq!(evaluator.get(SuperclassDeclRequest { decl: point }), None);
}

#[test]
fn test_protocol_class_bound() {
    let mut fx = Fixture::new();
    let base = fx.class("Base", &[]);
    let inherits = fx.protocol("Inherits", &["Base"], &[]);
    let bounded = fx.protocol("Bounded", &[], &["Base"]);
    let plain = fx.protocol("Plain", &[], &[]);

    let evaluator = Evaluator::new(&fx.decls);
    assert_eq!(evaluator.get(SuperclassDeclRequest { decl: inherits }), Some(base));
    assert_eq!(evaluator.get(SuperclassDeclRequest { decl: bounded }), Some(base));
    assert_eq!(evaluator.get(SuperclassDeclRequest { decl: plain }), None);
}

#[test]
fn test_extended_nominal() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");
    fx.alias("P", "Point");
    let direct = fx.extension("Point");
    let aliased = fx.extension("P");

    let evaluator = Evaluator::new(&fx.decls);
    assert_eq!(evaluator.get(ExtendedNominalRequest { ext: direct }), Some(point));
    assert_eq!(evaluator.get(ExtendedNominalRequest { ext: aliased }), Some(point));
    assert_eq!(evaluator.get(ExtendedNominalRequest { ext: point }), None);
}

#[test]
fn test_self_bounds_ignore_other_subjects() {
    let mut fx = Fixture::new();
    let base = fx.class("Base", &[]);
    let hashable = fx.protocol("Hashable", &[], &[]);
    fx.strukt("Item");
    let where_clause = vec![
        Requirement {
            subject: fx.repr("Self"),
            constraint: fx.repr("Base"),
        },
        Requirement {
            subject: fx.repr("Item"),
            constraint: fx.repr("Hashable"),
        },
        Requirement {
            subject: fx.repr("Self"),
            constraint: fx.repr("Hashable"),
        },
    ];
    let proto = fx.add(
        "Keyed",
        DeclKind::Protocol(NominalDecl::default().with_where_clause(where_clause)),
    );

    let evaluator = Evaluator::new(&fx.decls);
    assert_eq!(
        evaluator.get(SelfBoundsRequest { decl: proto }),
        vec![base, hashable]
    );
}

#[test]
fn test_where_clause_type_decls_skip_self() {
    let mut fx = Fixture::new();
    let base = fx.class("Base", &[]);
    let hashable = fx.protocol("Hashable", &[], &[]);
    let item = fx.strukt("Item");
    let where_clause = vec![
        Requirement {
            subject: fx.repr("Self"),
            constraint: fx.repr("Base"),
        },
        Requirement {
            subject: fx.repr("Item"),
            constraint: fx.repr("Hashable"),
        },
        Requirement {
            subject: fx.repr("Item"),
            constraint: fx.repr("Base"),
        },
    ];
    let proto = fx.add(
        "Keyed",
        DeclKind::Protocol(NominalDecl::default().with_where_clause(where_clause)),
    );

    let evaluator = Evaluator::new(&fx.decls);
    assert_eq!(
        evaluator.get(WhereClauseTypeDeclsRequest { decl: proto }),
        vec![base, item, hashable]
    );
}

#[test]
fn test_self_bounds_without_self_interned() {
    let mut fx = Fixture::new();
    let proto = fx.protocol("Plain", &[], &[]);

    let evaluator = Evaluator::new(&fx.decls);
    assert!(evaluator.get(SelfBoundsRequest { decl: proto }).is_empty());
}
