//! Composite reconcile functions: precondition + ordered tasks +
//! postcondition, topic subscriptions, per-invocation shared state, and span
//! wrapping.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;

use async_trait::async_trait;
use opentelemetry::trace::Span as _;
use plane_core::trcng;
use tokio::sync::watch;

use super::{EventType, ResourceEvent};
use crate::topology::Topology;
use crate::types::Kind;
use crate::*;

/// One reconcile invocation's inputs. Cheap to clone; every task gets its own
/// copy of the same snapshot.
#[derive(Clone)]
pub struct ReconcileRequest {
	pub events: Arc<Vec<ResourceEvent>>,
	pub topology: Arc<Topology>,
	/// Failures carried over from earlier stages of the enclosing workflow.
	pub error: Option<Errors>,
	pub state: SharedState,
	pub cancel: watch::Receiver<bool>,
}

impl ReconcileRequest {
	pub fn new(events: Vec<ResourceEvent>, topology: Topology) -> ReconcileRequest {
		let (_, cancel) = watch::channel(false);
		ReconcileRequest {
			events: Arc::new(events),
			topology: Arc::new(topology),
			error: None,
			state: SharedState::default(),
			cancel,
		}
	}

	pub fn cancelled(&self) -> bool {
		*self.cancel.borrow()
	}

	fn with_error(&self, error: Option<Errors>) -> ReconcileRequest {
		ReconcileRequest {
			error,
			..self.clone()
		}
	}
}

/// Failures accumulated across reconcile stages. The cycle never aborts on
/// data errors; they collect here and surface to the postcondition.
#[derive(Debug, Clone, Default)]
pub struct Errors(Vec<Arc<anyhow::Error>>);

impl Errors {
	pub fn push(&mut self, err: anyhow::Error) {
		self.0.push(Arc::new(err));
	}

	pub fn extend(&mut self, other: &Errors) {
		self.0.extend(other.0.iter().cloned());
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arc<anyhow::Error>> {
		self.0.iter()
	}

	pub fn into_result(self) -> anyhow::Result<()> {
		if self.is_empty() {
			Ok(())
		} else {
			Err(anyhow::Error::new(self))
		}
	}
}

impl Display for Errors {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.0.is_empty() {
			return write!(f, "no errors");
		}
		write!(f, "{} error(s): ", self.0.len())?;
		for (i, err) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, "; ")?;
			}
			write!(f, "{err}")?;
		}
		Ok(())
	}
}

impl std::error::Error for Errors {}

/// A reconcile function. Implemented by [`Workflow`], [`Subscription`],
/// [`Traced`] and any `Fn(ReconcileRequest) -> impl Future<Output =
/// anyhow::Result<()>>` closure.
#[async_trait]
pub trait Reconcile: Send + Sync {
	async fn reconcile(&self, req: ReconcileRequest) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Reconcile for F
where
	F: Fn(ReconcileRequest) -> Fut + Send + Sync,
	Fut: Future<Output = anyhow::Result<()>> + Send,
{
	async fn reconcile(&self, req: ReconcileRequest) -> anyhow::Result<()> {
		self(req).await
	}
}

/// Precondition, then every task in order, then the postcondition. Tasks all
/// see the precondition's error and the same topology snapshot; their own
/// failures accumulate rather than aborting, and the joined result reaches
/// the postcondition. The batch fails iff any stage failed.
#[derive(Default)]
pub struct Workflow {
	precondition: Option<Box<dyn Reconcile>>,
	tasks: Vec<Box<dyn Reconcile>>,
	postcondition: Option<Box<dyn Reconcile>>,
}

impl Workflow {
	pub fn new() -> Workflow {
		Workflow::default()
	}

	pub fn precondition(mut self, task: impl Reconcile + 'static) -> Self {
		self.precondition = Some(Box::new(task));
		self
	}

	pub fn task(mut self, task: impl Reconcile + 'static) -> Self {
		self.tasks.push(Box::new(task));
		self
	}

	pub fn postcondition(mut self, task: impl Reconcile + 'static) -> Self {
		self.postcondition = Some(Box::new(task));
		self
	}
}

#[async_trait]
impl Reconcile for Workflow {
	async fn reconcile(&self, req: ReconcileRequest) -> anyhow::Result<()> {
		let mut pre_errors = Errors::default();
		if let Some(pre) = &self.precondition
			&& let Err(err) = pre.reconcile(req.clone()).await
		{
			debug!("workflow precondition failed: {err}");
			pre_errors.push(err);
		}
		let pre_errors = (!pre_errors.is_empty()).then_some(pre_errors);

		let mut task_errors = Errors::default();
		for task in &self.tasks {
			if let Err(err) = task.reconcile(req.with_error(pre_errors.clone())).await {
				debug!("workflow task failed: {err}");
				task_errors.push(err);
			}
		}
		let joined = (!task_errors.is_empty()).then_some(task_errors.clone());

		let mut all = pre_errors.unwrap_or_default();
		all.extend(&task_errors);
		if let Some(post) = &self.postcondition
			&& let Err(err) = post.reconcile(req.with_error(joined)).await
		{
			debug!("workflow postcondition failed: {err}");
			all.push(err);
		}
		all.into_result()
	}
}

/// Matches events by kind and/or type; a `None` field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMatcher {
	pub kind: Option<Kind>,
	pub event_type: Option<EventType>,
}

impl EventMatcher {
	pub fn any() -> EventMatcher {
		EventMatcher::default()
	}

	pub fn of_kind(kind: Kind) -> EventMatcher {
		EventMatcher {
			kind: Some(kind),
			event_type: None,
		}
	}

	pub fn with_type(mut self, event_type: EventType) -> EventMatcher {
		self.event_type = Some(event_type);
		self
	}

	pub fn matches(&self, event: &ResourceEvent) -> bool {
		self.kind.as_ref().is_none_or(|k| *k == event.kind)
			&& self.event_type.is_none_or(|t| t == event.event_type)
	}
}

/// Adapts a task so it only fires when the batch contains at least one event
/// matching any of its matchers. A subscription with no matchers never fires.
pub struct Subscription {
	matchers: Vec<EventMatcher>,
	task: Box<dyn Reconcile>,
}

impl Subscription {
	pub fn new(task: impl Reconcile + 'static, matchers: Vec<EventMatcher>) -> Subscription {
		Subscription {
			matchers,
			task: Box::new(task),
		}
	}
}

#[async_trait]
impl Reconcile for Subscription {
	async fn reconcile(&self, req: ReconcileRequest) -> anyhow::Result<()> {
		let fires = req
			.events
			.iter()
			.any(|e| self.matchers.iter().any(|m| m.matches(e)));
		if !fires {
			return Ok(());
		}
		self.task.reconcile(req).await
	}
}

/// String-keyed map scoped to one reconcile invocation. Earlier tasks publish
/// values, later tasks read them. Concurrency-safe because tasks may hand it
/// to background work.
#[derive(Clone, Default)]
pub struct SharedState {
	inner: Arc<RwLock<HashMap<Strng, Arc<dyn Any + Send + Sync>>>>,
}

impl SharedState {
	pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<Strng>, value: T) {
		self
			.inner
			.write()
			.expect("state lock")
			.insert(key.into(), Arc::new(value));
	}

	pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
		let guard = self.inner.read().expect("state lock");
		guard.get(key).cloned()?.downcast::<T>().ok()
	}

	/// Fetch-or-publish under one lock acquisition, so two racing publishers
	/// agree on a single value.
	pub fn get_or_insert_with<T: Any + Send + Sync>(
		&self,
		key: impl Into<Strng>,
		init: impl FnOnce() -> T,
	) -> Arc<T> {
		let key = key.into();
		let mut guard = self.inner.write().expect("state lock");
		if let Some(existing) = guard.get(&key)
			&& let Ok(existing) = existing.clone().downcast::<T>()
		{
			return existing;
		}
		let value = Arc::new(init());
		guard.insert(key, value.clone());
		value
	}

	pub fn remove(&self, key: &str) -> bool {
		self.inner.write().expect("state lock").remove(key).is_some()
	}

	pub fn keys(&self) -> Vec<Strng> {
		self.inner.read().expect("state lock").keys().cloned().collect()
	}
}

/// Wraps a reconcile function in a span named `name`; failures are recorded
/// on the span. With no tracer provider installed the span is a no-op.
pub struct Traced {
	name: Strng,
	inner: Box<dyn Reconcile>,
}

pub fn trace(name: impl Into<Strng>, task: impl Reconcile + 'static) -> Traced {
	Traced {
		name: name.into(),
		inner: Box::new(task),
	}
}

#[async_trait]
impl Reconcile for Traced {
	async fn reconcile(&self, req: ReconcileRequest) -> anyhow::Result<()> {
		let mut span = trcng::start_span(self.name.to_string());
		let result = self.inner.reconcile(req).await;
		if let Err(err) = &result {
			trcng::record_error(&mut span, err.as_ref());
		}
		span.end();
		result
	}
}
