//! Anti-prompt-injection scanning.
//!
//! Submodules: [`normalization`] (Unicode confusable folding),
//! [`patterns`] (the built-in pattern dictionary), [`scanner`]
//! (normalize → detect → sanitize → strict-mode gate orchestration), and
//! [`path`] (filesystem path traversal prevention, used by the document
//! loader rather than the scanner itself).

pub mod normalization;
pub mod path;
pub mod patterns;
pub mod scanner;

use serde::{Deserialize, Serialize};

/// Severity of a single matched injection pattern, or the aggregate risk
/// level of a scan. Ordered so `>=` comparisons against a strict-mode
/// threshold work directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// No patterns matched.
    Clean,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Clean => "CLEAN",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Clean < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }
}
