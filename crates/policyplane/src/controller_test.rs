use std::sync::RwLock;
use std::time::Duration;

use plane_core::signal::Shutdown;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::controller::{
	ControllerBuilder, ControllerError, EventType, IncrementalCache, ObjectCache, ReconcileRequest,
	ResourceEvent, StoredObject, Watch, destruct, generation_changed,
};
use crate::testing::{ColorPolicy, color_policy_kind, rule, target};
use crate::types::gateway::{self, Gateway, GatewayClass, ListenerSpec};
use crate::types::{Locator, Node, ObjectMeta};
use crate::*;

fn gw(name: &str) -> Gateway {
	Gateway {
		metadata: ObjectMeta::new("default", name),
		gateway_class_name: strng::new("gc"),
		listeners: vec![ListenerSpec {
			name: strng::new("http"),
			port: 80,
			protocol: strng::new("HTTP"),
			hostname: None,
		}],
	}
}

fn gw_locator(name: &str) -> Locator {
	Locator::new(&gateway::kind::gateway(), Some("default"), name, None)
}

#[derive(Debug, Clone)]
struct Observation {
	events: Vec<(EventType, Option<Locator>)>,
	gateways: Vec<Locator>,
	attached: usize,
}

fn observing_reconcile(
	tx: mpsc::UnboundedSender<Observation>,
) -> impl Fn(ReconcileRequest) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>
+ Send
+ Sync
+ 'static {
	move |req: ReconcileRequest| {
		let tx = tx.clone();
		Box::pin(async move {
			let gateways = req
				.topology
				.of_kind(&gateway::kind::gateway())
				.iter()
				.map(Node::locator)
				.collect::<Vec<_>>();
			let attached = req
				.topology
				.of_kind(&gateway::kind::gateway())
				.iter()
				.map(|n| req.topology.policies_attached_to(&n.locator()).len())
				.sum();
			let _ = tx.send(Observation {
				events: req
					.events
					.iter()
					.map(|e| (e.event_type, e.locator()))
					.collect(),
				gateways,
				attached,
			});
			Ok(())
		})
	}
}

#[tokio::test]
async fn events_drive_consistent_snapshots() {
	let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
	let shutdown = Shutdown::new();
	let mut builder = ControllerBuilder::new("test");
	let gateways = builder.watch(Watch::<Gateway>::incremental());
	let policies = builder.watch(Watch::<ColorPolicy>::incremental());
	let controller = builder
		.policy_kinds([color_policy_kind()])
		.reconcile(observing_reconcile(obs_tx))
		.managed_by(shutdown.watcher())
		.build()
		.expect("controller");
	let handle = tokio::spawn(controller.run());

	gateways.add(gw("mine"));
	let first = timeout(Duration::from_secs(5), obs_rx.recv())
		.await
		.expect("reconcile ran")
		.expect("observation");
	assert_eq!(first.gateways, vec![gw_locator("mine")]);
	assert_eq!(first.attached, 0);
	assert!(
		first
			.events
			.iter()
			.any(|(t, l)| *t == EventType::Create && l.as_ref() == Some(&gw_locator("mine")))
	);

	// A policy targeting the gateway lands in the same snapshot as its event.
	policies.add(ColorPolicy::implicit(
		"paint",
		target(gateway::kind::gateway(), "mine"),
		vec![rule("walls", "Blue")],
	));
	let second = timeout(Duration::from_secs(5), obs_rx.recv())
		.await
		.expect("reconcile ran")
		.expect("observation");
	assert_eq!(second.attached, 1);

	// Deleting the gateway removes it from the next snapshot (causal order).
	gateways.delete(gw("mine"));
	let third = timeout(Duration::from_secs(5), obs_rx.recv())
		.await
		.expect("reconcile ran")
		.expect("observation");
	assert!(third.gateways.is_empty());

	shutdown.trigger().shutdown_now();
	handle.await.expect("controller task");
}

#[tokio::test]
async fn queued_events_coalesce_into_one_batch() {
	let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
	let shutdown = Shutdown::new();
	let mut builder = ControllerBuilder::new("test");
	let gateways = builder.watch(Watch::<Gateway>::incremental());
	let controller = builder
		.reconcile(observing_reconcile(obs_tx))
		.managed_by(shutdown.watcher())
		.build()
		.expect("controller");

	// Everything enqueued before the loop starts drains as one cycle.
	gateways.add(gw("one"));
	gateways.add(gw("two"));
	gateways.add(gw("three"));
	let handle = tokio::spawn(controller.run());

	let obs = timeout(Duration::from_secs(5), obs_rx.recv())
		.await
		.expect("reconcile ran")
		.expect("observation");
	assert_eq!(obs.events.len(), 3);
	assert_eq!(obs.gateways.len(), 3);

	shutdown.trigger().shutdown_now();
	handle.await.expect("controller task");
}

#[tokio::test]
async fn predicate_drops_noop_updates() {
	let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
	let shutdown = Shutdown::new();
	let mut builder = ControllerBuilder::new("test");
	let gateways = builder.watch(Watch::<Gateway>::incremental().predicate(generation_changed()));
	let controller = builder
		.reconcile(observing_reconcile(obs_tx))
		.managed_by(shutdown.watcher())
		.build()
		.expect("controller");
	let handle = tokio::spawn(controller.run());

	let mut old = gw("mine");
	old.metadata.generation = 3;
	let new = old.clone();
	// Same generation: never enqueued.
	gateways.update(old.clone(), new);

	let mut bumped = old.clone();
	bumped.metadata.generation = 4;
	gateways.update(old, bumped);

	let obs = timeout(Duration::from_secs(5), obs_rx.recv())
		.await
		.expect("reconcile ran")
		.expect("observation");
	assert_eq!(obs.events.len(), 1);
	assert_eq!(obs.events[0].0, EventType::Update);

	shutdown.trigger().shutdown_now();
	handle.await.expect("controller task");
}

#[tokio::test]
async fn snapshot_watch_lists_informer_store() {
	let store: Arc<RwLock<Vec<Arc<Gateway>>>> = Arc::new(RwLock::new(Vec::new()));
	let list_store = store.clone();
	let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
	let shutdown = Shutdown::new();
	let mut builder = ControllerBuilder::new("test");
	let gateways = builder.watch(Watch::<Gateway>::snapshot(move || {
		list_store.read().expect("store lock").clone()
	}));
	let controller = builder
		.reconcile(observing_reconcile(obs_tx))
		.managed_by(shutdown.watcher())
		.build()
		.expect("controller");
	let handle = tokio::spawn(controller.run());

	// The informer owns the store; the callback only drives the cycle.
	store.write().expect("store lock").push(Arc::new(gw("mine")));
	gateways.add(gw("mine"));
	let obs = timeout(Duration::from_secs(5), obs_rx.recv())
		.await
		.expect("reconcile ran")
		.expect("observation");
	assert_eq!(obs.gateways, vec![gw_locator("mine")]);

	shutdown.trigger().shutdown_now();
	handle.await.expect("controller task");
}

#[tokio::test]
async fn namespaced_watch_filters_events() {
	let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
	let shutdown = Shutdown::new();
	let mut builder = ControllerBuilder::new("test");
	let gateways = builder.watch(Watch::<Gateway>::incremental().namespaced("default"));
	let controller = builder
		.reconcile(observing_reconcile(obs_tx))
		.managed_by(shutdown.watcher())
		.build()
		.expect("controller");
	let handle = tokio::spawn(controller.run());

	let mut elsewhere = gw("other");
	elsewhere.metadata.namespace = Some(strng::new("prod"));
	gateways.add(elsewhere);
	gateways.add(gw("mine"));

	let obs = timeout(Duration::from_secs(5), obs_rx.recv())
		.await
		.expect("reconcile ran")
		.expect("observation");
	assert_eq!(obs.gateways, vec![gw_locator("mine")]);

	shutdown.trigger().shutdown_now();
	handle.await.expect("controller task");
}

#[tokio::test]
async fn transformer_mutates_before_store() {
	let (tx, mut rx) = mpsc::unbounded_channel();
	let watch = Watch::<Gateway>::incremental().transformer(|mut g: Gateway| {
		g.listeners.clear();
		g
	});
	let handle = crate::controller::InformerHandle::new(&watch, tx);
	handle.add(gw("mine"));
	let event = rx.try_recv().expect("event enqueued");
	assert_eq!(event.event_type, EventType::Create);
	match event.new {
		Some(StoredObject::Node(Node::Gateway(g))) => assert!(g.listeners.is_empty()),
		other => panic!("unexpected stored object: {other:?}"),
	}
}

#[test]
fn incremental_cache_applies_events() {
	let mut cache = IncrementalCache::default();
	let node = |name: &str| StoredObject::Node(Node::Gateway(Arc::new(gw(name))));
	cache.apply(&ResourceEvent {
		kind: gateway::kind::gateway(),
		event_type: EventType::Create,
		old: None,
		new: Some(node("mine")),
	});
	assert_eq!(cache.list().len(), 1);

	cache.apply(&ResourceEvent {
		kind: gateway::kind::gateway(),
		event_type: EventType::Update,
		old: Some(node("mine")),
		new: Some(node("mine")),
	});
	assert_eq!(cache.list().len(), 1);

	cache.apply(&ResourceEvent {
		kind: gateway::kind::gateway(),
		event_type: EventType::Delete,
		old: Some(node("mine")),
		new: None,
	});
	assert!(cache.list().is_empty());
}

#[test]
fn build_rejects_bad_configuration() {
	let builder = ControllerBuilder::new("test");
	assert!(matches!(
		builder.build(),
		Err(ControllerError::MissingReconcile)
	));

	let mut builder = ControllerBuilder::new("test");
	let _a = builder.watch(Watch::<Gateway>::incremental());
	let _b = builder.watch(Watch::<Gateway>::incremental());
	let result = builder
		.reconcile(|_req: ReconcileRequest| async move { Ok(()) })
		.build();
	assert!(matches!(result, Err(ControllerError::DuplicateWatch(_))));

	let builder = ControllerBuilder::new("test");
	let result = builder
		.policy_kinds([color_policy_kind()])
		.reconcile(|_req: ReconcileRequest| async move { Ok(()) })
		.build();
	assert!(matches!(result, Err(ControllerError::UnwatchedKind(_))));
}

#[tokio::test]
async fn client_receives_downstream_writes() {
	let client = Arc::new(crate::testing::RecordingClient::default());
	let shutdown = Shutdown::new();
	let mut builder = ControllerBuilder::new("test");
	let _gateways = builder.watch(Watch::<Gateway>::incremental());
	let controller = builder
		.client(client.clone())
		.reconcile(|_req: ReconcileRequest| async move { Ok(()) })
		.managed_by(shutdown.watcher())
		.build()
		.expect("controller");

	let gvr = crate::controller::GroupVersionResource::new(
		gateway::GATEWAY_API_GROUP,
		"v1",
		"gateways",
	);
	let handle = controller.client().expect("client configured");
	let object = destruct(&gw("downstream")).expect("serializable");
	handle
		.create(&gvr, Some("default"), object)
		.await
		.expect("write accepted");
	let writes = client.writes.lock().await;
	assert_eq!(writes.len(), 1);
	assert_eq!(writes[0].0, "create");
	assert_eq!(writes[0].3["metadata"]["name"], serde_json::json!("downstream"));
}

#[test]
fn destruct_speaks_dynamic_objects() {
	let class = GatewayClass {
		metadata: ObjectMeta::cluster_scoped("gc"),
		controller_name: strng::new("example.com/controller"),
	};
	let value = destruct(&class).expect("serializable");
	assert_eq!(
		value["controllerName"],
		serde_json::json!("example.com/controller")
	);
	assert_eq!(value["metadata"]["name"], serde_json::json!("gc"));
}
