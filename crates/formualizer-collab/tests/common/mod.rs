#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use formualizer_collab::{
    CollaborationEnvironment, EnvironmentLink, EvaluationCache, EvaluatorRef, ListenerRef,
    WorkbookEvaluator,
};

/// Evaluator that counts attach/detach calls.
#[derive(Default)]
pub struct CountingEvaluator {
    listener: Option<ListenerRef>,
    link: EnvironmentLink,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl std::fmt::Debug for CountingEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingEvaluator")
            .field("has_listener", &self.listener.is_some())
            .field("link", &self.link)
            .field("attaches", &self.attaches)
            .field("detaches", &self.detaches)
            .finish()
    }
}

impl CountingEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_listener(listener: ListenerRef) -> Arc<Self> {
        Arc::new(Self {
            listener: Some(listener),
            ..Default::default()
        })
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn index(&self) -> Option<usize> {
        self.link.index()
    }

    pub fn is_attached(&self) -> bool {
        self.link.is_attached()
    }

    pub fn cache(&self) -> Option<Arc<EvaluationCache>> {
        self.link.cache()
    }
}

impl WorkbookEvaluator for CountingEvaluator {
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
        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.link.attach(env, cache, index);
    }

    fn detach_from_environment(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        self.link.detach();
    }
}

pub fn dyn_ref(e: &Arc<CountingEvaluator>) -> EvaluatorRef {
    e.clone()
}
