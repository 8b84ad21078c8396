//! Error taxonomy for collaboration setup and cross-workbook lookup.
//!
//! Every failure here is caller misuse detected synchronously: nothing is
//! retried and nothing is fatal to the process.

use thiserror::Error;

/// Rejections raised while building a new collaboration.
///
/// All of these are detected before any evaluator is touched, so a failed
/// setup leaves prior environments exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("invalid collaboration setup: {reason}")]
    InvalidCollaborationSetup { reason: String },

    #[error("Duplicate workbook name '{name}'")]
    DuplicateWorkbookName { name: String },

    #[error("Attempted to register same workbook under names '{first}' and '{second}'")]
    DuplicateEvaluatorRegistration { first: String, second: String },

    #[error(
        "Workbook evaluators must all have the same evaluation listener \
         ('{offending}' differs from '{first}')"
    )]
    InconsistentListeners { first: String, offending: String },

    #[error("Formula evaluator {facade} for workbook '{name}' provides no WorkbookEvaluator access")]
    UnsupportedEvaluatorFacade { name: String, facade: String },
}

impl SetupError {
    pub(crate) fn invalid<S: Into<String>>(reason: S) -> Self {
        SetupError::InvalidCollaborationSetup {
            reason: reason.into(),
        }
    }
}

/// Failures resolving an external workbook through an environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("This environment has been unhooked")]
    EnvironmentUnhooked,

    /// Carries the full list of valid names so callers can render an
    /// actionable message to whoever authored the formula.
    #[error("{}", describe_missing(.requested, .valid_names))]
    WorkbookNotFound {
        requested: String,
        valid_names: Vec<String>,
    },

    /// The name is registered but its evaluator has been dropped by its
    /// owner without being torn down first.
    #[error("Workbook '{name}' was released while still collaborating")]
    WorkbookReleased { name: String },

    #[error("Malformed external sheet key '{key}' (expected \"[Book]Sheet\")")]
    MalformedExternalKey { key: String },
}

impl LookupError {
    /// Spreadsheet error code a formula evaluator should surface for this
    /// failure. Every lookup failure is an unresolvable reference.
    pub fn excel_code(&self) -> &'static str {
        "#REF!"
    }

    /// True when the environment had no members at all.
    pub fn is_unconfigured(&self) -> bool {
        matches!(self, LookupError::WorkbookNotFound { valid_names, .. } if valid_names.is_empty())
    }
}

fn describe_missing(requested: &str, valid_names: &[String]) -> String {
    let mut msg = String::with_capacity(64 + valid_names.len() * 16);
    msg.push_str("Could not resolve external workbook name '");
    msg.push_str(requested);
    msg.push_str("'.");
    if valid_names.is_empty() {
        msg.push_str(" Workbook environment has not been set up.");
        return msg;
    }
    msg.push_str(" The following workbook names are valid: (");
    for (i, name) in valid_names.iter().enumerate() {
        if i > 0 {
            msg.push_str(", ");
        }
        msg.push('\'');
        msg.push_str(name);
        msg.push('\'');
    }
    msg.push(')');
    msg
}
