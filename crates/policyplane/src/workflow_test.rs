use std::sync::Mutex;

use crate::controller::workflow::{
	Errors, EventMatcher, Reconcile, ReconcileRequest, SharedState, Subscription, Workflow, trace,
};
use crate::controller::{EventType, ResourceEvent};
use crate::topology::Topology;
use crate::types::gateway;
use crate::*;

fn empty_request() -> ReconcileRequest {
	ReconcileRequest::new(Vec::new(), Topology::gateway_api().build())
}

fn request_with_event(kind: crate::types::Kind, event_type: EventType) -> ReconcileRequest {
	let event = ResourceEvent {
		kind,
		event_type,
		old: None,
		new: None,
	};
	ReconcileRequest::new(vec![event], Topology::gateway_api().build())
}

fn recorder(
	log: Arc<Mutex<Vec<&'static str>>>,
	name: &'static str,
) -> impl Reconcile + 'static {
	move |_req: ReconcileRequest| {
		let log = log.clone();
		async move {
			log.lock().expect("log lock").push(name);
			anyhow::Ok(())
		}
	}
}

fn failing(name: &'static str) -> impl Reconcile + 'static {
	move |_req: ReconcileRequest| async move {
		let result: anyhow::Result<()> = Err(anyhow::anyhow!("{name} failed"));
		result
	}
}

#[tokio::test]
async fn workflow_runs_stages_in_order() {
	let log = Arc::new(Mutex::new(Vec::new()));
	let workflow = Workflow::new()
		.precondition(recorder(log.clone(), "pre"))
		.task(recorder(log.clone(), "one"))
		.task(recorder(log.clone(), "two"))
		.postcondition(recorder(log.clone(), "post"));
	workflow.reconcile(empty_request()).await.expect("workflow");
	assert_eq!(*log.lock().expect("log lock"), vec!["pre", "one", "two", "post"]);
}

#[tokio::test]
async fn task_errors_accumulate_without_aborting() {
	let log = Arc::new(Mutex::new(Vec::new()));
	let seen_by_post: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));
	let seen = seen_by_post.clone();
	let workflow = Workflow::new()
		.task(failing("first"))
		.task(recorder(log.clone(), "second"))
		.task(failing("third"))
		.postcondition(move |req: ReconcileRequest| {
			let seen = seen.clone();
			async move {
				*seen.lock().expect("seen lock") = req.error.as_ref().map(Errors::len);
				Ok(())
			}
		});
	let result = workflow.reconcile(empty_request()).await;
	assert!(result.is_err());
	// The middle task still ran, and the postcondition saw both failures joined.
	assert_eq!(*log.lock().expect("log lock"), vec!["second"]);
	assert_eq!(*seen_by_post.lock().expect("seen lock"), Some(2));
}

#[tokio::test]
async fn tasks_see_precondition_error() {
	let observed = Arc::new(Mutex::new(false));
	let obs = observed.clone();
	let workflow = Workflow::new()
		.precondition(failing("pre"))
		.task(move |req: ReconcileRequest| {
			let obs = obs.clone();
			async move {
				*obs.lock().expect("observed lock") = req.error.is_some();
				Ok(())
			}
		});
	assert!(workflow.reconcile(empty_request()).await.is_err());
	assert!(*observed.lock().expect("observed lock"));
}

#[tokio::test]
async fn postcondition_sees_no_error_when_tasks_succeed() {
	let seen = Arc::new(Mutex::new(true));
	let s = seen.clone();
	let workflow = Workflow::new()
		.task(recorder(Arc::new(Mutex::new(Vec::new())), "ok"))
		.postcondition(move |req: ReconcileRequest| {
			let s = s.clone();
			async move {
				*s.lock().expect("seen lock") = req.error.is_some();
				Ok(())
			}
		});
	workflow.reconcile(empty_request()).await.expect("workflow");
	assert!(!*seen.lock().expect("seen lock"));
}

#[tokio::test]
async fn subscription_fires_only_on_matching_events() {
	let log = Arc::new(Mutex::new(Vec::new()));
	let sub = Subscription::new(
		recorder(log.clone(), "fired"),
		vec![EventMatcher::of_kind(gateway::kind::gateway()).with_type(EventType::Delete)],
	);

	sub
		.reconcile(request_with_event(gateway::kind::gateway(), EventType::Create))
		.await
		.expect("subscription");
	assert!(log.lock().expect("log lock").is_empty());

	sub
		.reconcile(request_with_event(gateway::kind::http_route(), EventType::Delete))
		.await
		.expect("subscription");
	assert!(log.lock().expect("log lock").is_empty());

	sub
		.reconcile(request_with_event(gateway::kind::gateway(), EventType::Delete))
		.await
		.expect("subscription");
	assert_eq!(*log.lock().expect("log lock"), vec!["fired"]);
}

#[tokio::test]
async fn wildcard_matcher_fires_on_anything() {
	let log = Arc::new(Mutex::new(Vec::new()));
	let sub = Subscription::new(recorder(log.clone(), "fired"), vec![EventMatcher::any()]);
	sub
		.reconcile(request_with_event(gateway::kind::service(), EventType::Update))
		.await
		.expect("subscription");
	assert_eq!(*log.lock().expect("log lock"), vec!["fired"]);
}

#[tokio::test]
async fn shared_state_hands_values_between_tasks() {
	let workflow = Workflow::new()
		.task(|req: ReconcileRequest| async move {
			req.state.insert("paths", vec![1usize, 2, 3]);
			Ok(())
		})
		.task(|req: ReconcileRequest| async move {
			let paths = req.state.get::<Vec<usize>>("paths").expect("state value");
			assert_eq!(*paths, vec![1, 2, 3]);
			Ok(())
		});
	workflow.reconcile(empty_request()).await.expect("workflow");
}

#[test]
fn shared_state_typed_access() {
	let state = SharedState::default();
	state.insert("count", 7usize);
	assert_eq!(state.get::<usize>("count").as_deref(), Some(&7));
	// A type mismatch is simply absent.
	assert!(state.get::<String>("count").is_none());
	assert!(state.remove("count"));
	assert!(state.get::<usize>("count").is_none());
}

#[test]
fn shared_state_get_or_insert_is_first_writer_wins() {
	let state = SharedState::default();
	let first = state.get_or_insert_with("key", || strng::new("one"));
	let second = state.get_or_insert_with("key", || strng::new("two"));
	assert_eq!(first, second);
	assert_eq!(*first, strng::new("one"));
}

#[tokio::test]
async fn traced_task_passes_results_through() {
	let ok = trace("paint", |_req: ReconcileRequest| async move { Ok(()) });
	ok.reconcile(empty_request()).await.expect("traced ok");

	let err = trace("paint", failing("inner"));
	let result = err.reconcile(empty_request()).await;
	assert!(result.is_err());
	assert!(result.unwrap_err().to_string().contains("inner failed"));
}

#[test]
fn errors_join_for_display() {
	let mut errors = Errors::default();
	assert!(errors.is_empty());
	errors.push(anyhow::anyhow!("first"));
	errors.push(anyhow::anyhow!("second"));
	let rendered = errors.to_string();
	assert!(rendered.contains("2 error(s)"));
	assert!(rendered.contains("first"));
	assert!(rendered.contains("second"));
	assert!(errors.into_result().is_err());
}
