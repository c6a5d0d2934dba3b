use pretty_assertions::assert_eq;

use kiln_diagnostic::ErrorCode;

use super::*;
use crate::test_helpers::Fixture;

#[test]
fn test_answers_are_cached() {
    let mut fx = Fixture::new();
    let base = fx.class("Base", &[]);
    let derived = fx.class("Derived", &["Base"]);

    let evaluator = Evaluator::new(&fx.decls);
    let request = SuperclassDeclRequest { decl: derived };
    assert_eq!(evaluator.get(request), Some(base));
    let after_first = evaluator.stats();
    assert_eq!(after_first.evaluations, 2);
    assert_eq!(after_first.cache_hits, 0);

    assert_eq!(evaluator.get(request), Some(base));
    let after_second = evaluator.stats();
    assert_eq!(after_second.evaluations, 2);
    assert_eq!(after_second.cache_hits, 1);
    assert_eq!(evaluator.diagnostic_count(), 0);
}

#[test]
fn test_refused_answers_are_recomputed() {
    let mut fx = Fixture::new();
    let ext = fx.extension("Missing");

    let evaluator = Evaluator::new(&fx.decls);
    assert_eq!(evaluator.get(ExtendedNominalRequest { ext }), None);
    assert_eq!(evaluator.get(ExtendedNominalRequest { ext }), None);

    let stats = evaluator.stats();
    assert_eq!(stats.evaluations, 2);
    assert_eq!(stats.cache_hits, 0);
}

#[test]
fn test_alias_cycle_reports_one_error() {
    let mut fx = Fixture::new();
    let x = fx.alias("X", "Y");
    let y = fx.alias("Y", "X");

    let evaluator = Evaluator::new(&fx.decls);
    assert!(evaluator.get(UnderlyingTypeDeclsRequest { alias: x }).is_empty());
    assert!(evaluator.get(UnderlyingTypeDeclsRequest { alias: y }).is_empty());
    assert_eq!(evaluator.stats().cycles, 1);

    let diagnostics = evaluator.take_diagnostics().into_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    let diag = &diagnostics[0];
    assert_eq!(diag.code, ErrorCode::E2101);
    assert_eq!(diag.message, "circular reference");
    assert_eq!(diag.primary_span(), Some(fx.decls.get(x).span));

    let through: Vec<_> = diag.secondary_labels().collect();
    assert_eq!(through.len(), 1);
    assert_eq!(through[0].span, fx.decls.get(y).span);
    assert_eq!(through[0].message, "through reference here");
}

#[test]
fn test_self_referential_alias() {
    let mut fx = Fixture::new();
    let x = fx.alias("X", "X");

    let evaluator = Evaluator::new(&fx.decls);
    assert!(evaluator.get(UnderlyingTypeDeclsRequest { alias: x }).is_empty());

    let diagnostics = evaluator.take_diagnostics().into_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].primary_span(), Some(fx.decls.get(x).span));
    assert_eq!(diagnostics[0].secondary_labels().count(), 0);
}

#[test]
fn test_cycle_result_is_cached() {
    let mut fx = Fixture::new();
    let x = fx.alias("X", "Y");
    fx.alias("Y", "X");

    let evaluator = Evaluator::new(&fx.decls);
    evaluator.get(UnderlyingTypeDeclsRequest { alias: x });
    let evaluations = evaluator.stats().evaluations;

    assert!(evaluator.get(UnderlyingTypeDeclsRequest { alias: x }).is_empty());
    assert_eq!(evaluator.stats().evaluations, evaluations);
    assert_eq!(evaluator.diagnostic_count(), 1);
}

#[test]
fn test_take_diagnostics_drains() {
    let mut fx = Fixture::new();
    let x = fx.alias("X", "X");

    let evaluator = Evaluator::new(&fx.decls);
    evaluator.get(UnderlyingTypeDeclsRequest { alias: x });
    assert_eq!(evaluator.take_diagnostics().error_count(), 1);
    assert_eq!(evaluator.diagnostic_count(), 0);
}

#[test]
fn test_inherited_span_points_at_clause_entry() {
    let mut fx = Fixture::new();
    fx.class("Base", &[]);
    let derived = fx.class("Derived", &["Base"]);

    let entry = fx.decls.get(derived).inherited()[0].span;
    let active = ActiveRequest::InheritedDecls(InheritedDeclsRequest {
        decl: derived,
        index: 0,
    });
    assert_eq!(active.span(&fx.decls), entry);

    let out_of_range = ActiveRequest::InheritedDecls(InheritedDeclsRequest {
        decl: derived,
        index: 3,
    });
    assert_eq!(out_of_range.span(&fx.decls), fx.decls.get(derived).span);
}
