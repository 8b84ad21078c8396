//! Collaboration environments: binding a named set of workbook evaluators
//! to one shared evaluation cache, and resolving external workbook names.
//!
//! An environment is built in one step by [`CollaborationContext`]; there is
//! no empty-then-fill state. Setting up a new collaboration tears down, in
//! full, every environment any of its members previously belonged to.

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::EvaluationCache;
use crate::config::CollabConfig;
use crate::error::{LookupError, SetupError};
use crate::evaluator::{EvaluatorRef, FacadeRef, WorkbookEvaluator, evaluator_addr};
use crate::external::parse_external_sheet_key;
use crate::listener::{ListenerRef, same_listener};
use crate::registry::WorkbookRegistry;

/// Serializes reconfiguration against lookups. Setup and teardown hold it
/// for writing; lookups hold it for reading only long enough to read the
/// membership.
type Gate = Arc<RwLock<()>>;

static EMPTY: Lazy<Arc<CollaborationEnvironment>> =
    Lazy::new(|| Arc::new(CollaborationEnvironment::unconfigured()));

/// One collaboration generation.
///
/// Kept alive by its attached members and by any handle returned from
/// setup. Members are referenced weakly, so there is no ownership cycle.
pub struct CollaborationEnvironment {
    generation: u64,
    registry: WorkbookRegistry,
    members: Vec<Weak<dyn WorkbookEvaluator>>,
    cache: Option<Arc<EvaluationCache>>,
    active: AtomicBool,
    gate: Gate,
}

impl CollaborationEnvironment {
    /// The shared "no collaboration configured" environment.
    pub fn empty() -> Arc<CollaborationEnvironment> {
        EMPTY.clone()
    }

    fn unconfigured() -> Self {
        Self {
            generation: 0,
            registry: WorkbookRegistry::new(),
            members: Vec::new(),
            cache: None,
            active: AtomicBool::new(true),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn resolve(&self, workbook: &str) -> Result<EvaluatorRef, LookupError> {
        let _read = self.gate.read();
        if !self.active.load(Ordering::Acquire) {
            return Err(LookupError::EnvironmentUnhooked);
        }
        let Some(index) = self.registry.get_index(workbook) else {
            return Err(LookupError::WorkbookNotFound {
                requested: workbook.to_string(),
                valid_names: self.registry.names().to_vec(),
            });
        };
        self.members[index]
            .upgrade()
            .ok_or_else(|| LookupError::WorkbookReleased {
                name: workbook.to_string(),
            })
    }

    /// Resolve a canonical `"[Book]Sheet"` key to the owning evaluator and
    /// the sheet part of the key.
    pub fn resolve_sheet_key<'k>(
        &self,
        key: &'k str,
    ) -> Result<(EvaluatorRef, &'k str), LookupError> {
        let (book, sheet) =
            parse_external_sheet_key(key).ok_or_else(|| LookupError::MalformedExternalKey {
                key: key.to_string(),
            })?;
        Ok((self.resolve(book)?, sheet))
    }

    /// Member at a collaborator index.
    pub fn member(&self, index: usize) -> Option<EvaluatorRef> {
        let _read = self.gate.read();
        if !self.active.load(Ordering::Acquire) {
            return None;
        }
        self.members.get(index).and_then(Weak::upgrade)
    }

    /// Membership as fixed at setup. Unlike [`resolve`](Self::resolve) this
    /// still answers after teardown.
    pub fn index_of(&self, workbook: &str) -> Option<usize> {
        self.registry.get_index(workbook)
    }

    /// Names in collaborator order, as fixed at setup. Still answers after
    /// teardown.
    pub fn workbook_names(&self) -> &[String] {
        self.registry.names()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// 0 for the empty environment, then increasing per context.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Shared cache, or `None` for the empty environment.
    pub fn cache(&self) -> Option<&Arc<EvaluationCache>> {
        self.cache.as_ref()
    }

    /// Detach every member and deactivate. Further calls are no-ops.
    pub fn teardown(&self) {
        let _write = self.gate.write();
        self.unhook();
    }

    // Caller holds the gate for writing.
    fn unhook(&self) {
        if self.members.is_empty() {
            return;
        }
        // Deactivate first so a lookup never sees a half-detached membership.
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            generation = self.generation,
            members = self.members.len(),
            "unhooking collaboration environment"
        );
        // Members dropped by their owners have nothing left to detach.
        for member in self.members.iter().filter_map(Weak::upgrade) {
            member.detach_from_environment();
        }
    }

    fn hook(self: &Arc<Self>, members: &[EvaluatorRef], cache: &Arc<EvaluationCache>) {
        for (index, member) in members.iter().enumerate() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                generation = self.generation,
                index,
                workbook = self.registry.name(index).unwrap_or_default(),
                "attaching evaluator"
            );
            member.attach_to_environment(self, cache, index);
        }
        self.active.store(true, Ordering::Release);
    }
}

impl fmt::Debug for CollaborationEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaborationEnvironment")
            .field("generation", &self.generation)
            .field("workbooks", &self.registry.names())
            .field("active", &self.is_active())
            .finish()
    }
}

struct ContextInner {
    gate: Gate,
    config: CollabConfig,
    generations: AtomicU64,
}

/// Entry point for building collaborations.
///
/// Every environment created through one context shares its gate, so setups
/// through the same context are serialized against each other and against
/// lookups on any of its environments. Clones share that state.
#[derive(Clone)]
pub struct CollaborationContext {
    inner: Arc<ContextInner>,
}

impl Default for CollaborationContext {
    fn default() -> Self {
        Self::from_config(CollabConfig::default())
    }
}

impl fmt::Debug for CollaborationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaborationContext")
            .field("config", &self.inner.config)
            .field("generations", &self.inner.generations.load(Ordering::Relaxed))
            .finish()
    }
}

/// Members that passed validation, in collaborator order.
struct Validated {
    registry: WorkbookRegistry,
    members: Vec<EvaluatorRef>,
    listener: Option<ListenerRef>,
}

impl CollaborationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CollabConfig) -> Result<Self, SetupError> {
        if config.cache_capacity == 0 {
            return Err(SetupError::invalid("cache capacity must be at least 1"));
        }
        Ok(Self::from_config(config))
    }

    fn from_config(config: CollabConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                gate: Arc::new(RwLock::new(())),
                config,
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CollabConfig {
        &self.inner.config
    }

    /// Collaborate `evaluators[i]` under `names[i]`.
    pub fn setup<S: AsRef<str>>(
        &self,
        names: &[S],
        evaluators: &[EvaluatorRef],
    ) -> Result<Arc<CollaborationEnvironment>, SetupError> {
        if names.len() != evaluators.len() {
            return Err(SetupError::invalid(format!(
                "Number of workbook names is {} but number of evaluators is {}",
                names.len(),
                evaluators.len()
            )));
        }
        let pairs: Vec<(String, EvaluatorRef)> = names
            .iter()
            .map(|n| n.as_ref().to_string())
            .zip(evaluators.iter().cloned())
            .collect();
        self.setup_pairs(pairs)
    }

    /// Collaborate every `(name, evaluator)` entry of a mapping. Members are
    /// indexed in iteration order.
    pub fn setup_by_name<I, K>(
        &self,
        by_name: I,
    ) -> Result<Arc<CollaborationEnvironment>, SetupError>
    where
        I: IntoIterator<Item = (K, EvaluatorRef)>,
        K: Into<String>,
    {
        let pairs: Vec<(String, EvaluatorRef)> =
            by_name.into_iter().map(|(k, e)| (k.into(), e)).collect();
        self.setup_pairs(pairs)
    }

    /// Unwrap each facade to its workbook evaluator, then set up as
    /// [`setup_by_name`](Self::setup_by_name) does.
    pub fn setup_from_facades<I, K>(
        &self,
        facades: I,
    ) -> Result<Arc<CollaborationEnvironment>, SetupError>
    where
        I: IntoIterator<Item = (K, FacadeRef)>,
        K: Into<String>,
    {
        let mut pairs = Vec::new();
        for (name, facade) in facades {
            let name = name.into();
            match facade.workbook_evaluator() {
                Some(evaluator) => pairs.push((name, evaluator)),
                None => {
                    return Err(SetupError::UnsupportedEvaluatorFacade {
                        name,
                        facade: format!("{facade:?}"),
                    });
                }
            }
        }
        self.setup_by_name(pairs)
    }

    fn setup_pairs(
        &self,
        pairs: Vec<(String, EvaluatorRef)>,
    ) -> Result<Arc<CollaborationEnvironment>, SetupError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("collab_setup", workbooks = pairs.len()).entered();

        let validated = match validate(pairs) {
            Ok(v) => v,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "rejected collaboration setup");
                return Err(err);
            }
        };

        let members = validated.members.clone();
        let mut pending = Some(validated);
        let env = loop {
            let gates = gates_to_hold(&members, &self.inner.gate);
            let installed = with_gates_held(&gates, || {
                let previous = previous_environments(&members);
                // A member moved to a context whose gate is not held.
                if previous
                    .iter()
                    .any(|env| !gates.iter().any(|g| Arc::ptr_eq(g, &env.gate)))
                {
                    return None;
                }
                for env in &previous {
                    env.unhook();
                }
                pending.take().map(|validated| self.install(validated))
            });
            match installed {
                Some(env) => break env,
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("collaborators moved during setup, retrying");
                }
            }
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            generation = env.generation,
            workbooks = ?env.workbook_names(),
            "collaboration environment ready"
        );
        Ok(env)
    }

    // Caller holds every gate involved in the reconfiguration.
    fn install(&self, validated: Validated) -> Arc<CollaborationEnvironment> {
        let cache = Arc::new(EvaluationCache::new(
            validated.listener,
            self.inner.config.cache_capacity,
        ));
        let env = Arc::new(CollaborationEnvironment {
            generation: self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1,
            registry: validated.registry,
            members: validated.members.iter().map(Arc::downgrade).collect(),
            cache: Some(cache.clone()),
            active: AtomicBool::new(false),
            gate: self.inner.gate.clone(),
        });
        env.hook(&validated.members, &cache);
        env
    }
}

fn validate(pairs: Vec<(String, EvaluatorRef)>) -> Result<Validated, SetupError> {
    if pairs.is_empty() {
        return Err(SetupError::invalid(
            "Must provide at least one collaborating workbook",
        ));
    }

    let mut registry = WorkbookRegistry::with_capacity(pairs.len());
    for (name, _) in &pairs {
        registry.try_register(name)?;
    }

    let mut seen: FxHashMap<usize, usize> = FxHashMap::default();
    for (index, (name, evaluator)) in pairs.iter().enumerate() {
        if let Some(&first) = seen.get(&evaluator_addr(evaluator)) {
            return Err(SetupError::DuplicateEvaluatorRegistration {
                first: pairs[first].0.clone(),
                second: name.clone(),
            });
        }
        seen.insert(evaluator_addr(evaluator), index);
    }

    // One cache per collaboration, and a cache takes a single listener.
    let listener = pairs[0].1.listener();
    for (name, evaluator) in &pairs[1..] {
        if !same_listener(listener.as_ref(), evaluator.listener().as_ref()) {
            return Err(SetupError::InconsistentListeners {
                first: pairs[0].0.clone(),
                offending: name.clone(),
            });
        }
    }

    Ok(Validated {
        registry,
        members: pairs.into_iter().map(|(_, e)| e).collect(),
        listener,
    })
}

/// Distinct environments the members currently belong to.
fn previous_environments(members: &[EvaluatorRef]) -> Vec<Arc<CollaborationEnvironment>> {
    let mut seen = FxHashSet::default();
    let mut previous = Vec::new();
    for member in members {
        if let Some(env) = member.environment()
            && seen.insert(Arc::as_ptr(&env) as usize)
        {
            previous.push(env);
        }
    }
    previous
}

/// Own gate plus the gates of every prior environment, deduplicated and in
/// address order. Every setup locks in this order, so setups through
/// different contexts cannot deadlock on each other.
fn gates_to_hold(members: &[EvaluatorRef], own: &Gate) -> Vec<Gate> {
    let mut gates = vec![own.clone()];
    gates.extend(
        previous_environments(members)
            .into_iter()
            .map(|env| env.gate.clone()),
    );
    gates.sort_by_key(|g| Arc::as_ptr(g) as usize);
    gates.dedup_by(|a, b| Arc::ptr_eq(a, b));
    gates
}

fn with_gates_held<R>(gates: &[Gate], f: impl FnOnce() -> R) -> R {
    match gates.split_first() {
        None => f(),
        Some((gate, rest)) => {
            let _write = gate.write();
            with_gates_held(rest, f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::LinkedEvaluator;

    fn book(label: &str) -> EvaluatorRef {
        Arc::new(LinkedEvaluator::new(label))
    }

    #[test]
    fn empty_environment_reports_missing_setup() {
        let env = CollaborationEnvironment::empty();
        assert!(env.is_empty());
        assert!(env.is_active());
        assert_eq!(env.generation(), 0);
        let err = env.resolve("Book1").err().unwrap();
        assert!(err.is_unconfigured());
        env.teardown();
        assert!(env.is_active());
    }

    #[test]
    fn generations_increase_per_context() {
        let ctx = CollaborationContext::new();
        let a = ctx.setup(&["A"], &[book("a")]).unwrap();
        let b = ctx.setup(&["B"], &[book("b")]).unwrap();
        assert_eq!(a.generation(), 1);
        assert_eq!(b.generation(), 2);
    }

    #[test]
    fn zero_capacity_config_is_rejected() {
        let err = CollaborationContext::with_config(CollabConfig::bounded(0)).unwrap_err();
        assert!(matches!(err, SetupError::InvalidCollaborationSetup { .. }));
    }

    #[test]
    fn cache_capacity_comes_from_config() {
        let ctx = CollaborationContext::with_config(CollabConfig::bounded(8)).unwrap();
        let env = ctx.setup(&["A"], &[book("a")]).unwrap();
        assert_eq!(env.cache().map(|c| c.capacity()), Some(8));
    }

    #[test]
    fn member_and_index_lookups_agree() {
        let ctx = CollaborationContext::new();
        let a = book("a");
        let b = book("b");
        let env = ctx.setup(&["A", "B"], &[a.clone(), b.clone()]).unwrap();
        assert_eq!(env.index_of("B"), Some(1));
        let m = env.member(1).unwrap();
        assert!(crate::evaluator::same_evaluator(&m, &b));
        assert!(env.member(2).is_none());
        env.teardown();
        assert!(env.member(0).is_none());
    }

    #[test]
    fn gates_are_deduplicated_and_address_ordered() {
        let here = CollaborationContext::new();
        let there = CollaborationContext::new();
        let a = book("a");
        let b = book("b");
        let c = book("c");
        here.setup(&["A"], &[a.clone()]).unwrap();
        there.setup(&["B", "C"], &[b.clone(), c.clone()]).unwrap();

        let gates = gates_to_hold(&[a, b, c], &here.inner.gate);
        assert_eq!(gates.len(), 2);
        assert!(Arc::as_ptr(&gates[0]) < Arc::as_ptr(&gates[1]));
        assert!(gates.iter().any(|g| Arc::ptr_eq(g, &there.inner.gate)));
    }
}
