//! Capability surface the collaboration layer needs from per-workbook
//! evaluators, plus reusable attachment state for implementors.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::cache::EvaluationCache;
use crate::environment::CollaborationEnvironment;
use crate::error::LookupError;
use crate::listener::ListenerRef;

/// What the environment requires from a workbook evaluator.
///
/// An attached evaluator keeps its environment and cache alive until it is
/// detached; the environment only refers back to its members weakly.
/// `attach_to_environment` and `detach_from_environment` are invoked while
/// the environment's reconfiguration gate is held for writing, so they must
/// not resolve workbooks through any environment.
pub trait WorkbookEvaluator: Send + Sync {
    /// Listener fixed when the evaluator was built. Never changed by the
    /// environment.
    fn listener(&self) -> Option<ListenerRef>;

    fn environment(&self) -> Option<Arc<CollaborationEnvironment>>;

    fn attach_to_environment(
        &self,
        env: &Arc<CollaborationEnvironment>,
        cache: &Arc<EvaluationCache>,
        index: usize,
    );

    fn detach_from_environment(&self);
}

pub type EvaluatorRef = Arc<dyn WorkbookEvaluator>;

/// Identity comparison: two evaluators are the same only if they are the
/// same object.
pub fn same_evaluator(a: &EvaluatorRef, b: &EvaluatorRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn evaluator_addr(e: &EvaluatorRef) -> usize {
    Arc::as_ptr(e) as *const () as usize
}

/// Higher-level evaluation facade that may or may not expose the workbook
/// evaluator underneath it.
pub trait EvaluatorFacade: fmt::Debug + Send + Sync {
    fn workbook_evaluator(&self) -> Option<EvaluatorRef> {
        None
    }
}

pub type FacadeRef = Arc<dyn EvaluatorFacade>;

struct Attachment {
    env: Arc<CollaborationEnvironment>,
    cache: Weak<EvaluationCache>,
    index: usize,
}

/// Attachment state an evaluator embeds.
///
/// Owns the environment while attached, so a collaboration lives on after
/// the handle returned by setup is dropped. The cache is reached weakly
/// through the environment that owns it. Detaching releases both.
#[derive(Default)]
pub struct EnvironmentLink {
    state: Mutex<Option<Attachment>>,
}

impl EnvironmentLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(
        &self,
        env: &Arc<CollaborationEnvironment>,
        cache: &Arc<EvaluationCache>,
        index: usize,
    ) {
        let previous = self.state.lock().replace(Attachment {
            env: env.clone(),
            cache: Arc::downgrade(cache),
            index,
        });
        // Release outside the lock; it may be the last handle.
        drop(previous);
    }

    /// Returns whether the link was attached.
    pub fn detach(&self) -> bool {
        let previous = self.state.lock().take();
        previous.is_some()
    }

    pub fn environment(&self) -> Option<Arc<CollaborationEnvironment>> {
        self.state.lock().as_ref().map(|a| a.env.clone())
    }

    pub fn cache(&self) -> Option<Arc<EvaluationCache>> {
        self.state.lock().as_ref().and_then(|a| a.cache.upgrade())
    }

    pub fn index(&self) -> Option<usize> {
        self.state.lock().as_ref().map(|a| a.index)
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().is_some()
    }
}

impl fmt::Debug for EnvironmentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        match state.as_ref() {
            None => f.write_str("EnvironmentLink(detached)"),
            Some(a) => f
                .debug_struct("EnvironmentLink")
                .field("index", &a.index)
                .field("generation", &a.env.generation())
                .finish(),
        }
    }
}

/// Ready-made evaluator that only carries a label, a listener and its
/// environment link. Engines with their own evaluator type embed an
/// [`EnvironmentLink`] instead.
pub struct LinkedEvaluator {
    label: String,
    listener: Option<ListenerRef>,
    link: EnvironmentLink,
}

impl LinkedEvaluator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            listener: None,
            link: EnvironmentLink::new(),
        }
    }

    pub fn with_listener(label: impl Into<String>, listener: ListenerRef) -> Self {
        Self {
            label: label.into(),
            listener: Some(listener),
            link: EnvironmentLink::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn link(&self) -> &EnvironmentLink {
        &self.link
    }

    pub fn index(&self) -> Option<usize> {
        self.link.index()
    }

    pub fn cache(&self) -> Option<Arc<EvaluationCache>> {
        self.link.cache()
    }

    /// Resolve another workbook of the collaboration by name.
    ///
    /// A solo evaluator, including one whose collaboration was torn down,
    /// answers through the empty environment.
    pub fn resolve_external(&self, workbook: &str) -> Result<EvaluatorRef, LookupError> {
        // Clone the handle out first; resolution takes the environment gate.
        let env = self
            .link
            .environment()
            .unwrap_or_else(CollaborationEnvironment::empty);
        env.resolve(workbook)
    }
}

impl fmt::Debug for LinkedEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedEvaluator")
            .field("label", &self.label)
            .field("has_listener", &self.listener.is_some())
            .field("link", &self.link)
            .finish()
    }
}

impl WorkbookEvaluator for LinkedEvaluator {
    fn listener(&self) -> Option<ListenerRef> {
        self.listener.clone()
    }

    fn environment(&self) -> Option<Arc<CollaborationEnvironment>> {
        self.link.environment()
    }

    fn attach_to_environment(
        &self,
        env: &Arc<CollaborationEnvironment>,
        cache: &Arc<EvaluationCache>,
        index: usize,
    ) {
        self.link.attach(env, cache, index);
    }

    fn detach_from_environment(&self) {
        self.link.detach();
    }
}
