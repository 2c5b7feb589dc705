//! End-to-end exercise of the runtime: informer events in, workflow over a
//! consistent snapshot, effective policies out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use plane_core::signal::Shutdown;
use plane_core::strng;
use policyplane::controller::{
	ControllerBuilder, EventMatcher, ReconcileRequest, Subscription, Watch, Workflow, trace,
};
use policyplane::testing::{
	BlockStrategy, ColorPolicy, color_policy_kind, colors, rule, target, target_section,
};
use policyplane::topology::dot::DotWriter;
use policyplane::types::gateway::{
	self, BackendRef, Gateway, HTTPRoute, HTTPRouteRuleSpec, ListenerSpec, ParentRef,
};
use policyplane::types::{Node, ObjectMeta};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn gateway_fixture() -> Gateway {
	Gateway {
		metadata: ObjectMeta::new("default", "mine"),
		gateway_class_name: strng::new("gc"),
		listeners: vec![ListenerSpec {
			name: strng::new("http"),
			port: 80,
			protocol: strng::new("HTTP"),
			hostname: None,
		}],
	}
}

fn route_fixture(name: &str) -> HTTPRoute {
	HTTPRoute {
		metadata: ObjectMeta::new("default", name),
		parent_refs: vec![ParentRef::gateway("mine")],
		hostnames: Vec::new(),
		rules: vec![HTTPRouteRuleSpec {
			backend_refs: vec![BackendRef {
				name: strng::new("b"),
				namespace: None,
			}],
		}],
	}
}

/// Effective wall/roof/floor/door colors per route rule, keyed by locator.
type Effective = BTreeMap<String, Vec<(String, String)>>;

#[tokio::test]
async fn effective_policy_end_to_end() {
	let (results_tx, mut results_rx) = mpsc::unbounded_channel::<Effective>();
	let policy_events = Arc::new(AtomicUsize::new(0));

	let collect_paths = |req: ReconcileRequest| async move {
		let mut paths = Vec::new();
		for gw in req.topology.of_kind(&gateway::kind::gateway()) {
			for rule_node in req.topology.of_kind(&gateway::kind::http_route_rule()) {
				for path in req
					.topology
					.paths(&gw.locator(), &rule_node.locator())
					.into_iter()
					.filter(|p| p.len() == 3)
				{
					paths.push(path);
				}
			}
		}
		req.state.insert("paths", paths);
		Ok(())
	};

	let results = results_tx.clone();
	let compute_effective = move |req: ReconcileRequest| {
		let results = results.clone();
		async move {
			let paths = req
				.state
				.get::<Vec<Vec<Node>>>("paths")
				.expect("paths published by the precondition");
			let mut effective = Effective::new();
			for path in paths.iter() {
				let leaf = path.last().expect("non-empty path").locator();
				let merged = req
					.topology
					.effective_policy_in_path(path, &color_policy_kind());
				let rendered = merged.map(|p| colors(p.as_ref())).unwrap_or_default();
				effective.insert(leaf.to_string(), rendered);
			}
			let _ = results.send(effective);
			Ok(())
		}
	};

	let counted = policy_events.clone();
	let count_policy_events = Subscription::new(
		move |_req: ReconcileRequest| {
			let counted = counted.clone();
			async move {
				counted.fetch_add(1, Ordering::SeqCst);
				Ok(())
			}
		},
		vec![EventMatcher::of_kind(color_policy_kind())],
	);

	let dot_path = std::env::temp_dir().join(format!("policyplane-{}.dot", std::process::id()));
	let workflow = Workflow::new()
		.precondition(trace("collect-paths", collect_paths))
		.task(trace("compute-effective", compute_effective))
		.task(count_policy_events)
		.task(DotWriter::new(dot_path.clone()))
		.postcondition(|req: ReconcileRequest| async move {
			assert!(req.error.is_none(), "tasks failed: {:?}", req.error);
			Ok(())
		});

	let shutdown = Shutdown::new();
	let mut builder = ControllerBuilder::new("engine-test");
	let gateways = builder.watch(Watch::<Gateway>::incremental());
	let routes = builder.watch(Watch::<HTTPRoute>::incremental());
	let policies = builder.watch(Watch::<ColorPolicy>::incremental());
	let controller = builder
		.policy_kinds([color_policy_kind()])
		.reconcile(workflow)
		.managed_by(shutdown.watcher())
		.build()
		.expect("controller config");
	let run = tokio::spawn(controller.run());

	gateways.add(gateway_fixture());
	routes.add(route_fixture("web"));
	routes.add(route_fixture("other"));
	policies.add(ColorPolicy::defaults(
		"on-gateway",
		target(gateway::kind::gateway(), "mine"),
		BlockStrategy::Atomic,
		vec![rule("walls", "Black"), rule("doors", "Blue")],
	));
	policies.add(ColorPolicy::overrides(
		"on-route",
		target(gateway::kind::http_route(), "web"),
		BlockStrategy::RuleWise,
		vec![rule("walls", "Green"), rule("roof", "Orange")],
	));
	policies.add(ColorPolicy::implicit(
		"on-rule",
		target_section(gateway::kind::http_route_rule(), "web", "rule-1"),
		vec![rule("roof", "Purple"), rule("floor", "Red")],
	));

	// Cycles coalesce arbitrarily; wait for the snapshot that has everything.
	let final_state = loop {
		let effective = timeout(Duration::from_secs(5), results_rx.recv())
			.await
			.expect("reconcile ran")
			.expect("results");
		let complete = effective.len() == 2
			&& effective
				.get("httprouterule:default/web#rule-1")
				.is_some_and(|rules| rules.len() == 3);
		if complete {
			break effective;
		}
	};

	let mut painted = final_state
		.get("httprouterule:default/web#rule-1")
		.expect("web rule painted")
		.clone();
	painted.sort();
	assert_eq!(
		painted,
		vec![
			("floor".to_string(), "Red".to_string()),
			("roof".to_string(), "Orange".to_string()),
			("walls".to_string(), "Green".to_string()),
		]
	);

	let mut inherited = final_state
		.get("httprouterule:default/other#rule-1")
		.expect("other rule painted")
		.clone();
	inherited.sort();
	assert_eq!(
		inherited,
		vec![
			("doors".to_string(), "Blue".to_string()),
			("walls".to_string(), "Black".to_string()),
		]
	);

	assert!(policy_events.load(Ordering::SeqCst) > 0);
	assert!(
		std::fs::read_to_string(&dot_path)
			.expect("dot file written")
			.contains("gateway:default/mine")
	);
	let _ = std::fs::remove_file(&dot_path);

	shutdown.trigger().shutdown_now();
	run.await.expect("controller task");
}
