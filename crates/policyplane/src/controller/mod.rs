//! The event-driven reconciliation runtime: informers feed one queue, a
//! single loop drains it in batches, rebuilds the topology snapshot and runs
//! the configured reconcile function.

use std::collections::BTreeMap;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{Span as _, Status, Tracer as _};
use plane_core::signal::{Shutdown, ShutdownWatcher};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::topology::{LinkFunction, Topology};
use crate::types::{Kind, Locator, Node, Policy};
use crate::*;

pub mod cache;
pub mod client;
pub mod informer;
pub mod workflow;

pub use cache::{IncrementalCache, ObjectCache, SnapshotCache};
pub use client::{ClusterClient, GroupVersionResource, destruct};
pub use informer::{InformerHandle, Resource, Watch, generation_changed};
pub use workflow::{
	Errors, EventMatcher, Reconcile, ReconcileRequest, SharedState, Subscription, Workflow, trace,
};

use crate::types::Metadata;
use informer::WatchMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventType {
	Create,
	Update,
	Delete,
}

impl Display for EventType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			EventType::Create => "create",
			EventType::Update => "update",
			EventType::Delete => "delete",
		};
		write!(f, "{s}")
	}
}

/// A type-erased object as held by the caches: either a graph node or a
/// policy. The [`Resource`] impl of each watched kind decides which.
#[derive(Debug, Clone)]
pub enum StoredObject {
	Node(Node),
	Policy(Arc<dyn Policy>),
}

impl StoredObject {
	pub fn kind(&self) -> Kind {
		match self {
			StoredObject::Node(n) => n.kind(),
			StoredObject::Policy(p) => p.kind(),
		}
	}

	pub fn locator(&self) -> Locator {
		match self {
			StoredObject::Node(n) => n.locator(),
			StoredObject::Policy(p) => p.locator(),
		}
	}

	pub fn as_node(&self) -> Option<&Node> {
		match self {
			StoredObject::Node(n) => Some(n),
			StoredObject::Policy(_) => None,
		}
	}

	pub fn as_policy(&self) -> Option<&Arc<dyn Policy>> {
		match self {
			StoredObject::Policy(p) => Some(p),
			StoredObject::Node(_) => None,
		}
	}
}

/// One normalized informer event.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
	pub kind: Kind,
	pub event_type: EventType,
	pub old: Option<StoredObject>,
	pub new: Option<StoredObject>,
}

impl ResourceEvent {
	pub fn locator(&self) -> Option<Locator> {
		self
			.new
			.as_ref()
			.or(self.old.as_ref())
			.map(StoredObject::locator)
	}
}

/// The flat listing of everything the caches hold, assembled once per
/// reconcile cycle. Link factories receive it to capture candidate parents.
pub struct Store {
	objects: BTreeMap<Locator, StoredObject>,
}

impl Store {
	fn collect<'a>(caches: impl Iterator<Item = &'a (Kind, Box<dyn ObjectCache>)>) -> Store {
		let mut objects = BTreeMap::new();
		for (_, cache) in caches {
			for obj in cache.list() {
				objects.insert(obj.locator(), obj);
			}
		}
		Store { objects }
	}

	pub fn get(&self, locator: &Locator) -> Option<&StoredObject> {
		self.objects.get(locator)
	}

	pub fn of_kind(&self, kind: &Kind) -> Vec<StoredObject> {
		self
			.objects
			.values()
			.filter(|o| o.kind() == *kind)
			.cloned()
			.collect()
	}

	pub fn iter(&self) -> impl Iterator<Item = &StoredObject> {
		self.objects.values()
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}
}

/// User-supplied link functions close over the per-cycle store.
pub type LinkFactory = Box<dyn Fn(&Store) -> LinkFunction + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
	#[error("no reconcile function configured")]
	MissingReconcile,
	#[error("kind {0} is watched more than once")]
	DuplicateWatch(Kind),
	#[error("declared kind {0} has no watch registered")]
	UnwatchedKind(Kind),
}

pub struct ControllerBuilder {
	name: Strng,
	client: Option<Arc<dyn ClusterClient>>,
	tx: mpsc::UnboundedSender<ResourceEvent>,
	rx: mpsc::UnboundedReceiver<ResourceEvent>,
	caches: Vec<(Kind, Box<dyn ObjectCache>)>,
	policy_kinds: Vec<Kind>,
	object_kinds: Vec<Kind>,
	object_links: Vec<LinkFactory>,
	reconcile: Option<Arc<dyn Reconcile>>,
	tracer: Option<BoxedTracer>,
	managed_by: Option<ShutdownWatcher>,
}

impl ControllerBuilder {
	pub fn new(name: impl Into<Strng>) -> ControllerBuilder {
		let (tx, rx) = mpsc::unbounded_channel();
		ControllerBuilder {
			name: name.into(),
			client: None,
			tx,
			rx,
			caches: Vec::new(),
			policy_kinds: Vec::new(),
			object_kinds: Vec::new(),
			object_links: Vec::new(),
			reconcile: None,
			tracer: None,
			managed_by: None,
		}
	}

	/// The cluster API client downstream reconcilers write through.
	pub fn client(mut self, client: Arc<dyn ClusterClient>) -> Self {
		self.client = Some(client);
		self
	}

	/// Register an informer for one resource kind and return the callback
	/// handle the external watch machinery drives.
	pub fn watch<T: Resource + Metadata>(&mut self, watch: Watch<T>) -> InformerHandle<T> {
		let handle = InformerHandle::new(&watch, self.tx.clone());
		let cache: Box<dyn ObjectCache> = match watch.mode {
			WatchMode::Incremental => Box::new(IncrementalCache::default()),
			WatchMode::Snapshot(list) => Box::new(SnapshotCache::new(Arc::new(move || {
				list().into_iter().map(|o| o.into_stored()).collect()
			}))),
		};
		self.caches.push((T::kind(), cache));
		handle
	}

	/// Declare which watched kinds hold policies. Purely a configuration
	/// check: the [`Resource`] impl already stores instances as policies.
	pub fn policy_kinds(mut self, kinds: impl IntoIterator<Item = Kind>) -> Self {
		self.policy_kinds.extend(kinds);
		self
	}

	/// Declare extra non-targetable object kinds held for linking.
	pub fn object_kinds(mut self, kinds: impl IntoIterator<Item = Kind>) -> Self {
		self.object_kinds.extend(kinds);
		self
	}

	/// A link function for extra objects, rebuilt each cycle against the
	/// current store.
	pub fn object_link(
		mut self,
		factory: impl Fn(&Store) -> LinkFunction + Send + Sync + 'static,
	) -> Self {
		self.object_links.push(Box::new(factory));
		self
	}

	/// The top-level reconcile function, normally a [`Workflow`].
	pub fn reconcile(mut self, reconcile: impl Reconcile + 'static) -> Self {
		self.reconcile = Some(Arc::new(reconcile));
		self
	}

	/// Span factory for the top-level reconcile call. Absent means no-op.
	pub fn tracer(mut self, tracer: BoxedTracer) -> Self {
		self.tracer = Some(tracer);
		self
	}

	/// Delegate lifecycle to an external runtime: the controller stops when
	/// the watcher fires instead of installing its own signal handler.
	pub fn managed_by(mut self, watcher: ShutdownWatcher) -> Self {
		self.managed_by = Some(watcher);
		self
	}

	pub fn build(self) -> Result<Controller, ControllerError> {
		let Some(reconcile) = self.reconcile else {
			return Err(ControllerError::MissingReconcile);
		};
		for (i, (kind, _)) in self.caches.iter().enumerate() {
			if self.caches[..i].iter().any(|(k, _)| k == kind) {
				return Err(ControllerError::DuplicateWatch(kind.clone()));
			}
		}
		for kind in self.policy_kinds.iter().chain(&self.object_kinds) {
			if !self.caches.iter().any(|(k, _)| k == kind) {
				return Err(ControllerError::UnwatchedKind(kind.clone()));
			}
		}
		Ok(Controller {
			name: self.name,
			client: self.client,
			rx: self.rx,
			caches: self.caches,
			object_links: self.object_links,
			reconcile,
			tracer: self.tracer,
			managed_by: self.managed_by,
		})
	}
}

pub struct Controller {
	name: Strng,
	client: Option<Arc<dyn ClusterClient>>,
	rx: mpsc::UnboundedReceiver<ResourceEvent>,
	caches: Vec<(Kind, Box<dyn ObjectCache>)>,
	object_links: Vec<LinkFactory>,
	reconcile: Arc<dyn Reconcile>,
	tracer: Option<BoxedTracer>,
	managed_by: Option<ShutdownWatcher>,
}

impl Controller {
	pub fn name(&self) -> &Strng {
		&self.name
	}

	pub fn client(&self) -> Option<Arc<dyn ClusterClient>> {
		self.client.clone()
	}

	/// Drain the event queue until shutdown. Every batch is applied to the
	/// caches before the topology snapshot is rebuilt, so reconcilers always
	/// observe cache, topology and attachment index in agreement.
	pub async fn run(mut self) {
		let mut stop = match self.managed_by.take() {
			Some(watcher) => watcher,
			None => {
				let shutdown = Shutdown::new();
				let watcher = shutdown.watcher();
				tokio::spawn(shutdown.wait());
				watcher
			},
		};
		let (cancel_tx, cancel_rx) = watch::channel(false);
		info!(controller = %self.name, "controller started");
		loop {
			let first = tokio::select! {
				_ = stop.wait() => break,
				event = self.rx.recv() => match event {
					Some(event) => event,
					None => break,
				},
			};
			// Coalesce whatever arrived while the previous cycle ran.
			let mut batch = vec![first];
			while let Ok(event) = self.rx.try_recv() {
				batch.push(event);
			}
			self.process(batch, &cancel_rx).await;
		}
		let _ = cancel_tx.send(true);
		info!(controller = %self.name, "controller stopped");
	}

	pub(crate) async fn process(
		&mut self,
		events: Vec<ResourceEvent>,
		cancel: &watch::Receiver<bool>,
	) {
		debug!(controller = %self.name, events = events.len(), "reconcile cycle");
		for event in &events {
			match self.caches.iter_mut().find(|(k, _)| *k == event.kind) {
				Some((_, cache)) => cache.apply(event),
				None => warn!(kind = %event.kind, "event for unwatched kind, skipping"),
			}
		}
		let store = Store::collect(self.caches.iter());
		let topology = self.build_topology(&store);
		let request = ReconcileRequest {
			events: Arc::new(events),
			topology: Arc::new(topology),
			error: None,
			state: SharedState::default(),
			cancel: cancel.clone(),
		};
		let result = match &self.tracer {
			Some(tracer) => {
				let mut span = tracer.start("reconcile");
				let result = self.reconcile.reconcile(request).await;
				if let Err(err) = &result {
					span.record_error(err.as_ref());
					span.set_status(Status::error(err.to_string()));
				}
				span.end();
				result
			},
			None => self.reconcile.reconcile(request).await,
		};
		if let Err(err) = result {
			// Data errors never stop the controller; the next event re-drives
			// reconciliation.
			error!(controller = %self.name, "reconcile failed: {err:#}");
		}
	}

	fn build_topology(&self, store: &Store) -> Topology {
		let mut gateway_classes = Vec::new();
		let mut gateways = Vec::new();
		let mut http_routes = Vec::new();
		let mut services = Vec::new();
		let mut backends = Vec::new();
		let mut extra_targetables = Vec::new();
		let mut objects = Vec::new();
		let mut policies = Vec::new();
		for stored in store.iter() {
			match stored.clone() {
				StoredObject::Node(node) => match node {
					Node::GatewayClass(gc) => gateway_classes.push(gc),
					Node::Gateway(gw) => gateways.push(gw),
					Node::HTTPRoute(route) => http_routes.push(route),
					Node::Service(svc) => services.push(svc),
					Node::Backend(backend) => backends.push(backend),
					n @ (Node::Listener(_) | Node::HTTPRouteRule(_) | Node::ServicePort(_)) => {
						// Derived kinds are expanded from their owners, never watched.
						warn!(locator = %n.locator(), "derived kind in store, ignoring");
					},
					n @ Node::Targetable(_) => extra_targetables.push(n),
					Node::Object(o) => objects.push(o),
				},
				StoredObject::Policy(policy) => policies.push(policy),
			}
		}
		Topology::gateway_api()
			.gateway_classes(gateway_classes)
			.gateways(gateways)
			.http_routes(http_routes)
			.services(services)
			.backends(backends)
			.targetables(extra_targetables)
			.objects(objects)
			.links(self.object_links.iter().map(|factory| factory(store)))
			.policies(policies)
			.build()
	}
}
