mod common;

use std::fmt;
use std::sync::Arc;

use common::{CountingEvaluator, dyn_ref};
use formualizer_collab::{
    CollaborationContext, EvaluatorFacade, EvaluatorRef, FacadeRef, SetupError, same_evaluator,
};

#[derive(Debug)]
struct Sheets {
    inner: Option<Arc<CountingEvaluator>>,
}

impl EvaluatorFacade for Sheets {
    fn workbook_evaluator(&self) -> Option<EvaluatorRef> {
        self.inner.as_ref().map(dyn_ref)
    }
}

/// Facade built on something that is not a workbook evaluator at all.
struct RemoteEvaluator {
    endpoint: &'static str,
}

impl fmt::Debug for RemoteEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteEvaluator({})", self.endpoint)
    }
}

impl EvaluatorFacade for RemoteEvaluator {}

fn facade(inner: &Arc<CountingEvaluator>) -> FacadeRef {
    Arc::new(Sheets {
        inner: Some(inner.clone()),
    })
}

#[test]
fn facades_are_unwrapped_to_their_evaluators() {
    let ctx = CollaborationContext::new();
    let a = CountingEvaluator::new();
    let b = CountingEvaluator::new();
    let env = ctx
        .setup_from_facades(vec![("A.xlsx", facade(&a)), ("B.xlsx", facade(&b))])
        .expect("facades expose evaluators");

    assert!(same_evaluator(&env.resolve("A.xlsx").unwrap(), &dyn_ref(&a)));
    assert!(same_evaluator(&env.resolve("B.xlsx").unwrap(), &dyn_ref(&b)));
    assert_eq!(a.attaches(), 1);
}

#[test]
fn facade_without_evaluator_access_is_named_in_the_error() {
    let ctx = CollaborationContext::new();
    let a = CountingEvaluator::new();
    let remote: FacadeRef = Arc::new(RemoteEvaluator {
        endpoint: "https://calc.invalid",
    });

    let err = ctx
        .setup_from_facades(vec![("A.xlsx", facade(&a)), ("Remote.xlsx", remote)])
        .unwrap_err();
    match &err {
        SetupError::UnsupportedEvaluatorFacade { name, facade } => {
            assert_eq!(name, "Remote.xlsx");
            assert!(facade.contains("RemoteEvaluator"), "{facade}");
            assert!(facade.contains("calc.invalid"), "{facade}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("provides no WorkbookEvaluator access"));
    // Nothing was attached, including the facade that did unwrap.
    assert_eq!(a.attaches(), 0);
}

#[test]
fn facade_setup_revalidates_identity() {
    let ctx = CollaborationContext::new();
    let a = CountingEvaluator::new();
    let err = ctx
        .setup_from_facades(vec![("One", facade(&a)), ("Two", facade(&a))])
        .unwrap_err();
    assert_eq!(
        err,
        SetupError::DuplicateEvaluatorRegistration {
            first: "One".into(),
            second: "Two".into(),
        }
    );
}

#[test]
fn empty_facade_mapping_is_invalid() {
    let ctx = CollaborationContext::new();
    let err = ctx
        .setup_from_facades(Vec::<(String, FacadeRef)>::new())
        .unwrap_err();
    assert!(matches!(err, SetupError::InvalidCollaborationSetup { .. }));
}

#[test]
fn facade_without_inner_evaluator_is_unsupported() {
    let ctx = CollaborationContext::new();
    let hollow: FacadeRef = Arc::new(Sheets { inner: None });
    let err = ctx
        .setup_from_facades(vec![("Hollow.xlsx", hollow)])
        .unwrap_err();
    assert!(matches!(
        err,
        SetupError::UnsupportedEvaluatorFacade { ref name, .. } if name == "Hollow.xlsx"
    ));
}
