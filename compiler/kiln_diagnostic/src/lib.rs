//! Diagnostic system for the Kiln backend.
//!
//! Every user-visible problem found after type checking is a [`Diagnostic`]:
//! - Error codes for searchability
//! - Clear messages (what went wrong)
//! - Primary span (where it went wrong)
//! - Secondary labels (how we got there)
//!
//! # Error Guarantees
//!
//! [`DiagnosticSink::emit_error`] is the only way to obtain an
//! [`ErrorGuaranteed`], so a recovered failure always carries proof that it
//! was reported.
//!
//! ```text
//! let guarantee = sink.emit_error(diagnostic);
//! ```

mod diagnostic;
mod error_code;
mod guarantee;
mod sink;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use guarantee::ErrorGuaranteed;
pub use sink::DiagnosticSink;
