//! Collaborating-workbook environments for Formualizer.
//!
//! Formulas such as `=[Budget.xlsx]Sheet1!A1` need the evaluator of another,
//! independently loaded workbook. A [`CollaborationEnvironment`] binds a named
//! set of [`WorkbookEvaluator`]s together, hands all of them one shared
//! [`EvaluationCache`], and resolves workbook names for them.
//!
//! ```
//! use std::sync::Arc;
//! use formualizer_collab::{CollaborationContext, EvaluatorRef, LinkedEvaluator};
//!
//! let ctx = CollaborationContext::new();
//! let sales: EvaluatorRef = Arc::new(LinkedEvaluator::new("sales"));
//! let budget: EvaluatorRef = Arc::new(LinkedEvaluator::new("budget"));
//! let env = ctx.setup(&["Sales.xlsx", "Budget.xlsx"], &[sales.clone(), budget.clone()]).unwrap();
//!
//! assert!(env.resolve("Budget.xlsx").is_ok());
//! let err = env.resolve("Missing.xlsx").err().unwrap();
//! assert!(err.to_string().contains("'Sales.xlsx', 'Budget.xlsx'"));
//! ```

pub mod cache;
pub mod config;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod external;
pub mod listener;
pub mod registry;
pub mod telemetry;

pub use cache::{CacheKey, CachedValue, EvaluationCache};
pub use config::CollabConfig;
pub use environment::{CollaborationContext, CollaborationEnvironment};
pub use error::{LookupError, SetupError};
pub use evaluator::{
    EnvironmentLink, EvaluatorFacade, EvaluatorRef, FacadeRef, LinkedEvaluator,
    WorkbookEvaluator, same_evaluator,
};
pub use external::{
    parse_external_sheet_key, parse_external_workbook_key, split_external_reference,
};
pub use listener::{EvaluationListener, ListenerRef, same_listener};
pub use registry::WorkbookRegistry;
pub use telemetry::init_tracing;
