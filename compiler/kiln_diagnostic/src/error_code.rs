use std::fmt;

/// Error codes for backend diagnostics.
///
/// Format: E#### where the first digit indicates phase:
/// - E2xxx: Semantic queries (name lookup requests)
/// - E4xxx: Declaration emission
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Semantic queries (E2xxx)
    /// Circular reference between requests
    E2101,

    // Emission (E4xxx)
    /// Function symbol collides with an unrelated existing symbol
    E4001,
    /// Variable symbol collides with an unrelated existing symbol
    E4002,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E2101 => "E2101",
            ErrorCode::E4001 => "E4001",
            ErrorCode::E4002 => "E4002",
        }
    }

    /// One-line description for `--explain` style listings.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::E2101 => "circular reference",
            ErrorCode::E4001 => "function collides with existing symbol",
            ErrorCode::E4002 => "variable collides with existing symbol",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
