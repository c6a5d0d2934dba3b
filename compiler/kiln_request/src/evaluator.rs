//! Request evaluator with memoization and cycle detection.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use kiln_diagnostic::{Diagnostic, DiagnosticSink, ErrorCode};
use kiln_ir::{DeclId, DeclTable, Span};

use crate::requests::{
    ExtendedNominalRequest, InheritedDeclsRequest, SelfBoundsRequest, SuperclassDeclRequest,
    UnderlyingTypeDeclsRequest, WhereClauseTypeDeclsRequest,
};

/// A memoizable semantic query.
///
/// Implemented only by the request types of this crate: each one owns a
/// typed cache in [`RequestCaches`] and a variant of [`ActiveRequest`].
pub trait Request: Copy + Eq + Hash + fmt::Debug {
    type Output: Clone;

    /// Compute the answer, consulting other requests through `evaluator`.
    fn evaluate(&self, evaluator: &Evaluator<'_>) -> Self::Output;

    /// The answer substituted for every request on a cycle.
    fn cycle_result(&self) -> Self::Output;

    /// Whether `output` may be cached. Answers that are refused here are
    /// recomputed on every `get`.
    fn caches_result(&self, _output: &Self::Output) -> bool {
        true
    }

    /// In-flight identity of this request.
    fn active(&self) -> ActiveRequest;

    /// This request's typed cache.
    fn cache(caches: &RequestCaches) -> &RefCell<FxHashMap<Self, Self::Output>>;
}

/// Identity of an in-flight request, used for cycle detection and
/// diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ActiveRequest {
    InheritedDecls(InheritedDeclsRequest),
    UnderlyingTypeDecls(UnderlyingTypeDeclsRequest),
    SuperclassDecl(SuperclassDeclRequest),
    ExtendedNominal(ExtendedNominalRequest),
    SelfBounds(SelfBoundsRequest),
    WhereClauseTypeDecls(WhereClauseTypeDeclsRequest),
}

impl ActiveRequest {
    /// Where diagnostics about this request point.
    pub fn span(&self, decls: &DeclTable) -> Span {
        match self {
            ActiveRequest::InheritedDecls(r) => decls
                .get(r.decl)
                .inherited()
                .get(r.index)
                .map_or(decls.get(r.decl).span, |repr| repr.span),
            ActiveRequest::UnderlyingTypeDecls(r) => decls.get(r.alias).span,
            ActiveRequest::SuperclassDecl(r) => decls.get(r.decl).span,
            ActiveRequest::ExtendedNominal(r) => decls.get(r.ext).span,
            ActiveRequest::SelfBounds(r) => decls.get(r.decl).span,
            ActiveRequest::WhereClauseTypeDecls(r) => decls.get(r.decl).span,
        }
    }
}

/// One typed cache per request kind.
#[derive(Default)]
pub struct RequestCaches {
    pub(crate) inherited_decls: RefCell<FxHashMap<InheritedDeclsRequest, Vec<DeclId>>>,
    pub(crate) underlying_type_decls:
        RefCell<FxHashMap<UnderlyingTypeDeclsRequest, Vec<DeclId>>>,
    pub(crate) superclass_decl: RefCell<FxHashMap<SuperclassDeclRequest, Option<DeclId>>>,
    pub(crate) extended_nominal:
        RefCell<FxHashMap<ExtendedNominalRequest, Option<DeclId>>>,
    pub(crate) self_bounds: RefCell<FxHashMap<SelfBoundsRequest, Vec<DeclId>>>,
    pub(crate) where_clause_type_decls:
        RefCell<FxHashMap<WhereClauseTypeDeclsRequest, Vec<DeclId>>>,
}

/// Counters for one evaluator's lifetime.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct EvaluatorStats {
    pub evaluations: usize,
    pub cache_hits: usize,
    pub cycles: usize,
}

/// Memoizing request evaluator.
///
/// # Interior Mutability
///
/// Requests evaluate through `&Evaluator` and re-enter `get` on the same
/// call stack, so all state sits behind `RefCell`/`Cell`. No borrow is held
/// across a call to [`Request::evaluate`].
pub struct Evaluator<'db> {
    decls: &'db DeclTable,
    caches: RequestCaches,
    /// In-flight requests, outermost first.
    stack: RefCell<Vec<ActiveRequest>>,
    /// Same contents as `stack`, for O(1) membership.
    active: RefCell<FxHashSet<ActiveRequest>>,
    /// In-flight requests found to be on a cycle; they finish with their
    /// cycle result.
    poisoned: RefCell<FxHashSet<ActiveRequest>>,
    diagnostics: RefCell<DiagnosticSink>,
    stats: Cell<EvaluatorStats>,
}

impl<'db> Evaluator<'db> {
    pub fn new(decls: &'db DeclTable) -> Self {
        Evaluator {
            decls,
            caches: RequestCaches::default(),
            stack: RefCell::new(Vec::new()),
            active: RefCell::new(FxHashSet::default()),
            poisoned: RefCell::new(FxHashSet::default()),
            diagnostics: RefCell::new(DiagnosticSink::new()),
            stats: Cell::new(EvaluatorStats::default()),
        }
    }

    pub fn decls(&self) -> &'db DeclTable {
        self.decls
    }

    /// Answer `request`, evaluating it at most once.
    pub fn get<R: Request>(&self, request: R) -> R::Output {
        if let Some(cached) = R::cache(&self.caches).borrow().get(&request) {
            self.bump(|s| s.cache_hits += 1);
            return cached.clone();
        }

        let key = request.active();
        if self.active.borrow().contains(&key) {
            self.diagnose_cycle(key);
            return request.cycle_result();
        }

        trace!(?request, depth = self.stack.borrow().len(), "evaluating request");
        self.active.borrow_mut().insert(key);
        self.stack.borrow_mut().push(key);
        self.bump(|s| s.evaluations += 1);

        let mut output = ensure_sufficient_stack(|| request.evaluate(self));

        self.stack.borrow_mut().pop();
        self.active.borrow_mut().remove(&key);
        if self.poisoned.borrow_mut().remove(&key) {
            output = request.cycle_result();
        }

        if request.caches_result(&output) {
            R::cache(&self.caches)
                .borrow_mut()
                .insert(request, output.clone());
        }
        output
    }

    /// Report the cycle closed by re-entering `key` and poison every request
    /// on it.
    fn diagnose_cycle(&self, key: ActiveRequest) {
        let stack = self.stack.borrow();
        let Some(start) = stack.iter().position(|r| *r == key) else {
            return;
        };
        let cycle = &stack[start..];
        debug!(?key, length = cycle.len(), "request cycle");

        let mut diag = Diagnostic::error(ErrorCode::E2101)
            .with_message("circular reference")
            .with_label(key.span(self.decls), "circular reference");
        for step in &cycle[1..] {
            diag = diag.with_secondary_label(step.span(self.decls), "through reference here");
        }

        self.poisoned.borrow_mut().extend(cycle.iter().copied());
        self.bump(|s| s.cycles += 1);
        let _ = self.diagnostics.borrow_mut().emit_error(diag);
    }

    fn bump(&self, f: impl FnOnce(&mut EvaluatorStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    pub fn stats(&self) -> EvaluatorStats {
        self.stats.get()
    }

    /// Number of diagnostics reported so far.
    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.borrow().len()
    }

    /// Take every diagnostic reported so far.
    pub fn take_diagnostics(&self) -> DiagnosticSink {
        std::mem::take(&mut *self.diagnostics.borrow_mut())
    }
}

/// Minimum stack space to keep available before evaluating a request.
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests;
