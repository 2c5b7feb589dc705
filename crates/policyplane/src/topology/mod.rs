//! The central aggregate: a graph of targetables and linked objects plus the
//! policy attachment index, built as one consistent snapshot per reconcile
//! cycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::merge;
use crate::types::gateway::{Backend, Gateway, GatewayClass, HTTPRoute, Service};
use crate::types::{Kind, Locator, Mergeable, Node, Object, Policy};
use crate::*;

pub mod dot;
mod graph;
pub mod links;

pub use graph::{Graph, LinkFunction};

#[derive(Debug)]
pub struct Topology {
	graph: Graph,
	attached: HashMap<Locator, Vec<Arc<dyn Policy>>>,
	policies: Vec<Arc<dyn Policy>>,
}

impl Topology {
	pub fn builder() -> TopologyBuilder {
		TopologyBuilder::default()
	}

	/// A builder pre-wired with the canonical Gateway-API kinds, their
	/// expansions and links.
	pub fn gateway_api() -> GatewayApiTopologyBuilder {
		GatewayApiTopologyBuilder::default()
	}

	pub fn get(&self, locator: &Locator) -> Option<&Node> {
		self.graph.get(locator)
	}

	pub fn contains(&self, locator: &Locator) -> bool {
		self.graph.contains(locator)
	}

	pub fn items<F: Fn(&Node) -> bool>(&self, pred: F) -> Vec<Node> {
		self.graph.items(pred)
	}

	pub fn of_kind(&self, kind: &Kind) -> Vec<Node> {
		self.graph.of_kind(kind)
	}

	pub fn parents(&self, locator: &Locator) -> Vec<Node> {
		self.graph.parents(locator)
	}

	pub fn children(&self, locator: &Locator) -> Vec<Node> {
		self.graph.children(locator)
	}

	pub fn paths(&self, from: &Locator, to: &Locator) -> Vec<Vec<Node>> {
		self.graph.paths(from, to)
	}

	pub fn edges(&self) -> Vec<(Locator, Locator)> {
		self.graph.edges()
	}

	/// Policies attached to one targetable, ordered by
	/// `(creation timestamp, namespace/name)`.
	pub fn policies_attached_to(&self, locator: &Locator) -> &[Arc<dyn Policy>] {
		self.attached.get(locator).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Every policy known to the topology, in the same deterministic order.
	pub fn policies(&self) -> &[Arc<dyn Policy>] {
		&self.policies
	}

	/// Policies of `kind` attached along `path` (root first), least specific
	/// first.
	pub fn policies_in_path(&self, path: &[Node], kind: &Kind) -> Vec<Arc<dyn Policy>> {
		path
			.iter()
			.flat_map(|node| {
				self
					.policies_attached_to(&node.locator())
					.iter()
					.filter(|p| p.kind() == *kind)
					.cloned()
			})
			.collect()
	}

	/// The effective policy of `kind` for the leaf of `path`; see
	/// [`merge::effective_policy_in_path`].
	pub fn effective_policy_in_path(&self, path: &[Node], kind: &Kind) -> Option<Box<dyn Mergeable>> {
		merge::effective_policy_in_path(self, path, kind)
	}

	pub fn to_dot(&self) -> String {
		dot::render(self)
	}
}

fn policy_sort_key(policy: &Arc<dyn Policy>) -> (DateTime<Utc>, Strng, Strng) {
	(
		policy.creation_timestamp(),
		policy.namespace().unwrap_or_default(),
		policy.name(),
	)
}

/// Resolve one policy's target refs against the graph. Each ref resolves to
/// at most one locator; the namespace falls back to the policy's own, and
/// cluster-scoped targets resolve without one. Unresolved refs attach nothing
/// and raise no error: the resolver re-runs on every rebuild, so they stay
/// pending until their target appears.
fn resolve_target_refs(policy: &dyn Policy, graph: &Graph) -> Vec<Locator> {
	let mut out = Vec::new();
	for target_ref in policy.target_refs() {
		let kind = target_ref.kind();
		let namespace = target_ref.namespace.clone().or_else(|| policy.namespace());
		let namespaced = Locator::new(
			&kind,
			namespace.as_deref(),
			&target_ref.name,
			target_ref.section_name.as_deref(),
		);
		if graph.contains(&namespaced) {
			out.push(namespaced);
			continue;
		}
		let cluster = Locator::new(
			&kind,
			None,
			&target_ref.name,
			target_ref.section_name.as_deref(),
		);
		if graph.contains(&cluster) {
			out.push(cluster);
			continue;
		}
		debug!(policy = %policy.locator(), target = %namespaced, "target absent, attachment pending");
	}
	out
}

#[derive(Default)]
pub struct TopologyBuilder {
	targetables: Vec<Node>,
	objects: Vec<Node>,
	links: Vec<LinkFunction>,
	policies: Vec<Arc<dyn Policy>>,
}

impl TopologyBuilder {
	pub fn targetables(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
		self.targetables.extend(nodes);
		self
	}

	pub fn objects(mut self, objects: impl IntoIterator<Item = Arc<dyn Object>>) -> Self {
		self.objects.extend(objects.into_iter().map(Node::Object));
		self
	}

	pub fn links(mut self, links: impl IntoIterator<Item = LinkFunction>) -> Self {
		self.links.extend(links);
		self
	}

	pub fn policies(mut self, policies: impl IntoIterator<Item = Arc<dyn Policy>>) -> Self {
		self.policies.extend(policies);
		self
	}

	pub fn build(self) -> Topology {
		let graph = Graph::new(
			self.targetables.into_iter().chain(self.objects),
			&self.links,
		);
		let mut attached: HashMap<Locator, Vec<Arc<dyn Policy>>> = HashMap::new();
		for policy in &self.policies {
			for locator in resolve_target_refs(policy.as_ref(), &graph) {
				attached.entry(locator).or_default().push(policy.clone());
			}
		}
		for list in attached.values_mut() {
			list.sort_by_key(policy_sort_key);
		}
		let mut policies = self.policies;
		policies.sort_by_key(policy_sort_key);
		Topology {
			graph,
			attached,
			policies,
		}
	}
}

/// Builds the canonical Gateway-API topology: concrete kinds in, expansions
/// and canonical links applied, user extras appended.
#[derive(Default)]
pub struct GatewayApiTopologyBuilder {
	gateway_classes: Vec<Arc<GatewayClass>>,
	gateways: Vec<Arc<Gateway>>,
	http_routes: Vec<Arc<HTTPRoute>>,
	services: Vec<Arc<Service>>,
	backends: Vec<Arc<Backend>>,
	extra_targetables: Vec<Node>,
	objects: Vec<Arc<dyn Object>>,
	extra_links: Vec<LinkFunction>,
	policies: Vec<Arc<dyn Policy>>,
}

impl GatewayApiTopologyBuilder {
	pub fn gateway_classes(mut self, items: impl IntoIterator<Item = Arc<GatewayClass>>) -> Self {
		self.gateway_classes.extend(items);
		self
	}

	pub fn gateways(mut self, items: impl IntoIterator<Item = Arc<Gateway>>) -> Self {
		self.gateways.extend(items);
		self
	}

	pub fn http_routes(mut self, items: impl IntoIterator<Item = Arc<HTTPRoute>>) -> Self {
		self.http_routes.extend(items);
		self
	}

	pub fn services(mut self, items: impl IntoIterator<Item = Arc<Service>>) -> Self {
		self.services.extend(items);
		self
	}

	pub fn backends(mut self, items: impl IntoIterator<Item = Arc<Backend>>) -> Self {
		self.backends.extend(items);
		self
	}

	pub fn targetables(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
		self.extra_targetables.extend(nodes);
		self
	}

	pub fn objects(mut self, objects: impl IntoIterator<Item = Arc<dyn Object>>) -> Self {
		self.objects.extend(objects);
		self
	}

	pub fn links(mut self, links: impl IntoIterator<Item = LinkFunction>) -> Self {
		self.extra_links.extend(links);
		self
	}

	pub fn policies(mut self, policies: impl IntoIterator<Item = Arc<dyn Policy>>) -> Self {
		self.policies.extend(policies);
		self
	}

	pub fn build(self) -> Topology {
		let listeners: Vec<_> = self
			.gateways
			.iter()
			.flat_map(|gw| gw.expand_listeners())
			.map(Arc::new)
			.collect();
		let rules: Vec<_> = self
			.http_routes
			.iter()
			.flat_map(|r| r.expand_rules())
			.map(Arc::new)
			.collect();
		let ports: Vec<_> = self
			.services
			.iter()
			.flat_map(|s| s.expand_ports())
			.map(Arc::new)
			.collect();

		let mut link_functions = vec![
			links::gateway_class_to_gateway(self.gateway_classes.clone()),
			links::gateway_to_listener(self.gateways.clone()),
			links::gateway_to_http_route(self.gateways.clone()),
			links::listener_to_http_route(listeners.clone()),
			links::http_route_to_http_route_rule(self.http_routes.clone()),
			links::http_route_rule_to_backend(rules.clone()),
			links::backend_to_service_port(self.backends.clone()),
			links::service_port_to_service(ports.clone()),
		];
		link_functions.extend(self.extra_links);

		let nodes = self
			.gateway_classes
			.into_iter()
			.map(Node::GatewayClass)
			.chain(self.gateways.into_iter().map(Node::Gateway))
			.chain(listeners.into_iter().map(Node::Listener))
			.chain(self.http_routes.into_iter().map(Node::HTTPRoute))
			.chain(rules.into_iter().map(Node::HTTPRouteRule))
			.chain(self.backends.into_iter().map(Node::Backend))
			.chain(ports.into_iter().map(Node::ServicePort))
			.chain(self.services.into_iter().map(Node::Service))
			.chain(self.extra_targetables);

		Topology::builder()
			.targetables(nodes)
			.objects(self.objects)
			.links(link_functions)
			.policies(self.policies)
			.build()
	}
}
