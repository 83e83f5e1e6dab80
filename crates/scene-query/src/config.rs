//! Evaluation settings.

use serde::{Deserialize, Serialize};

/// Configuration for an [`Evaluator`](crate::Evaluator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Merge runs of type filters into single provider calls (default: true)
    pub fusion: bool,
    /// Ask the provider for fully-qualified identifiers in relation calls (default: true)
    pub full_paths: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            fusion: true,
            full_paths: true,
        }
    }
}

impl EvalConfig {
    /// Settings with fusion turned off; every type filter issues its own call.
    #[must_use]
    pub fn unfused() -> Self {
        Self {
            fusion: false,
            ..Self::default()
        }
    }
}
