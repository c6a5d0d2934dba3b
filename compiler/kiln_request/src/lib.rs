//! Memoized semantic requests.
//!
//! A request is a small `Copy` key ("what does this extension extend?")
//! whose answer is computed at most once per [`Evaluator`]. Requests may
//! depend on other requests; the evaluator tracks which ones are in flight
//! so that a request that transitively depends on itself is reported as a
//! circular reference and answered with a conservative default instead of
//! recursing forever.
//!
//! ```text
//! let evaluator = Evaluator::new(&decls);
//! let nominal = evaluator.get(ExtendedNominalRequest { ext });
//! let diagnostics = evaluator.take_diagnostics();
//! ```

mod evaluator;
mod requests;
mod resolve;

#[cfg(test)]
mod test_helpers;

pub use evaluator::{ActiveRequest, Evaluator, EvaluatorStats, Request, RequestCaches};
pub use requests::{
    ExtendedNominalRequest, InheritedDeclsRequest, SelfBoundsRequest, SuperclassDeclRequest,
    UnderlyingTypeDeclsRequest, WhereClauseTypeDeclsRequest,
};
pub use resolve::{direct_references, resolve_to_nominal};
