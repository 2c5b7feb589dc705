//! The informer contract consumed by the controller. External watch machinery
//! drives a typed [`InformerHandle`] via add/update/delete callbacks; the
//! handle normalizes into [`ResourceEvent`]s on the controller's single queue.

use tokio::sync::mpsc;

use super::{EventType, ResourceEvent, StoredObject};
use crate::types::{Kind, Metadata, Node};
use crate::types::gateway::{Backend, Gateway, GatewayClass, HTTPRoute, Service};
use crate::*;

/// A resource kind the controller can watch. Implementations decide how
/// instances are held in the topology: as concrete nodes, extra targetables,
/// plain linked objects, or policies.
pub trait Resource: Send + Sync + Debug + 'static {
	fn kind() -> Kind;
	fn into_stored(self: Arc<Self>) -> StoredObject;
}

impl Resource for GatewayClass {
	fn kind() -> Kind {
		crate::types::gateway::kind::gateway_class()
	}
	fn into_stored(self: Arc<Self>) -> StoredObject {
		StoredObject::Node(Node::GatewayClass(self))
	}
}

impl Resource for Gateway {
	fn kind() -> Kind {
		crate::types::gateway::kind::gateway()
	}
	fn into_stored(self: Arc<Self>) -> StoredObject {
		StoredObject::Node(Node::Gateway(self))
	}
}

impl Resource for HTTPRoute {
	fn kind() -> Kind {
		crate::types::gateway::kind::http_route()
	}
	fn into_stored(self: Arc<Self>) -> StoredObject {
		StoredObject::Node(Node::HTTPRoute(self))
	}
}

impl Resource for Service {
	fn kind() -> Kind {
		crate::types::gateway::kind::service()
	}
	fn into_stored(self: Arc<Self>) -> StoredObject {
		StoredObject::Node(Node::Service(self))
	}
}

impl Resource for Backend {
	fn kind() -> Kind {
		crate::types::gateway::kind::backend()
	}
	fn into_stored(self: Arc<Self>) -> StoredObject {
		StoredObject::Node(Node::Backend(self))
	}
}

pub(crate) type Transformer<T> = Arc<dyn Fn(T) -> T + Send + Sync>;
pub(crate) type Predicate<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;
pub(crate) type ListFn<T> = Arc<dyn Fn() -> Vec<Arc<T>> + Send + Sync>;

pub(crate) enum WatchMode<T> {
	/// The informer only delivers deltas; the controller owns the store.
	Incremental,
	/// The informer owns its store; the controller re-lists it each cycle.
	Snapshot(ListFn<T>),
}

/// Registration for one watched resource kind.
pub struct Watch<T> {
	pub(crate) namespace: Option<Strng>,
	pub(crate) transformer: Option<Transformer<T>>,
	pub(crate) predicate: Option<Predicate<T>>,
	pub(crate) mode: WatchMode<T>,
}

impl<T: Resource> Watch<T> {
	/// Watch with a controller-owned store fed by delta events.
	pub fn incremental() -> Watch<T> {
		Watch {
			namespace: None,
			transformer: None,
			predicate: None,
			mode: WatchMode::Incremental,
		}
	}

	/// Watch backed by the informer's own store; `list` is consulted on every
	/// reconcile cycle.
	pub fn snapshot(list: impl Fn() -> Vec<Arc<T>> + Send + Sync + 'static) -> Watch<T> {
		Watch {
			namespace: None,
			transformer: None,
			predicate: None,
			mode: WatchMode::Snapshot(Arc::new(list)),
		}
	}

	/// Restrict the watch to one namespace; events for objects elsewhere are
	/// dropped at the handle.
	pub fn namespaced(mut self, namespace: impl Into<Strng>) -> Watch<T> {
		self.namespace = Some(namespace.into());
		self
	}

	/// Pre-store mutation applied to every incoming object (e.g. stripping
	/// server-managed fields).
	pub fn transformer(mut self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Watch<T> {
		self.transformer = Some(Arc::new(f));
		self
	}

	/// Drop update events the predicate rejects.
	pub fn predicate(mut self, f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Watch<T> {
		self.predicate = Some(Arc::new(f));
		self
	}
}

/// Predicate dropping updates that do not bump the object generation
/// (status-only writes). Objects without a generation always pass.
pub fn generation_changed<T: Metadata>() -> impl Fn(&T, &T) -> bool {
	|old, new| old.metadata().generation == 0 || new.metadata().generation != old.metadata().generation
}

/// The callback surface external informer machinery drives. Callbacks only
/// normalize and enqueue; they never touch the topology.
pub struct InformerHandle<T> {
	kind: Kind,
	namespace: Option<Strng>,
	transformer: Option<Transformer<T>>,
	predicate: Option<Predicate<T>>,
	tx: mpsc::UnboundedSender<ResourceEvent>,
}

impl<T> Clone for InformerHandle<T> {
	fn clone(&self) -> Self {
		InformerHandle {
			kind: self.kind.clone(),
			namespace: self.namespace.clone(),
			transformer: self.transformer.clone(),
			predicate: self.predicate.clone(),
			tx: self.tx.clone(),
		}
	}
}

impl<T: Resource + Metadata> InformerHandle<T> {
	pub(crate) fn new(watch: &Watch<T>, tx: mpsc::UnboundedSender<ResourceEvent>) -> InformerHandle<T> {
		InformerHandle {
			kind: T::kind(),
			namespace: watch.namespace.clone(),
			transformer: watch.transformer.clone(),
			predicate: watch.predicate.clone(),
			tx,
		}
	}

	pub fn kind(&self) -> &Kind {
		&self.kind
	}

	pub fn add(&self, obj: T) {
		if !self.in_scope(&obj) {
			return;
		}
		let obj = self.transform(obj);
		self.send(EventType::Create, None, Some(obj));
	}

	pub fn update(&self, old: T, new: T) {
		if !self.in_scope(&new) {
			return;
		}
		let old = self.transform(old);
		let new = self.transform(new);
		if let Some(predicate) = &self.predicate
			&& !predicate(&old, &new)
		{
			trace!(kind = %self.kind, "predicate dropped update event");
			return;
		}
		self.send(EventType::Update, Some(old), Some(new));
	}

	pub fn delete(&self, obj: T) {
		if !self.in_scope(&obj) {
			return;
		}
		let obj = self.transform(obj);
		self.send(EventType::Delete, Some(obj), None);
	}

	fn in_scope(&self, obj: &T) -> bool {
		match (&self.namespace, &obj.metadata().namespace) {
			(Some(want), Some(got)) => want == got,
			(Some(_), None) => false,
			(None, _) => true,
		}
	}

	fn transform(&self, obj: T) -> T {
		match &self.transformer {
			Some(f) => f(obj),
			None => obj,
		}
	}

	fn send(&self, event_type: EventType, old: Option<T>, new: Option<T>) {
		let event = ResourceEvent {
			kind: self.kind.clone(),
			event_type,
			old: old.map(|o| Arc::new(o).into_stored()),
			new: new.map(|o| Arc::new(o).into_stored()),
		};
		if self.tx.send(event).is_err() {
			debug!(kind = %self.kind, "controller stopped, dropping event");
		}
	}
}
