//! Fatal emission errors.
//!
//! Everything recoverable (symbol collisions, request cycles) is reported
//! as a [`kiln_diagnostic::Diagnostic`] and emission continues. An
//! [`EmitError`] means the declarations handed to emission broke a
//! contract with the earlier phases.

use std::fmt;

use thiserror::Error;

/// Where a declaration was found when it broke an invariant.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DeclSite {
    ModuleScope,
    TypeMember,
    Extension,
    ExternalDefinition,
    GlobalStorage,
}

impl fmt::Display for DeclSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclSite::ModuleScope => write!(f, "at module scope"),
            DeclSite::TypeMember => write!(f, "as a type member"),
            DeclSite::Extension => write!(f, "inside an extension"),
            DeclSite::ExternalDefinition => write!(f, "as an external definition"),
            DeclSite::GlobalStorage => write!(f, "as global storage"),
        }
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EmitError {
    #[error("internal invariant violated: {kind} `{name}` cannot be emitted {site}")]
    InvariantViolation {
        kind: &'static str,
        name: String,
        site: DeclSite,
    },
}

impl EmitError {
    pub fn invariant(kind: &'static str, name: impl Into<String>, site: DeclSite) -> Self {
        EmitError::InvariantViolation {
            kind,
            name: name.into(),
            site,
        }
    }
}
