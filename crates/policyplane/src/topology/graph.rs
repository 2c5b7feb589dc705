use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::types::{Kind, Locator, Node};
use crate::*;

/// The only source of edges in the topology: given a child node of `to` kind,
/// `func` returns the parent nodes of `from` kind it connects to. Closures
/// capture the candidate parent set at topology construction. Edges are
/// directed parent -> child and only materialize when both endpoints exist.
pub struct LinkFunction {
	pub from: Kind,
	pub to: Kind,
	pub func: Box<dyn Fn(&Node) -> Vec<Node> + Send + Sync>,
}

impl Debug for LinkFunction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "LinkFunction({} -> {})", self.from, self.to)
	}
}

/// A directed graph over heterogeneous nodes keyed by locator.
#[derive(Debug)]
pub struct Graph {
	graph: DiGraph<Node, ()>,
	index: HashMap<Locator, NodeIndex>,
	by_kind: HashMap<Kind, Vec<NodeIndex>>,
}

impl Graph {
	/// Build the graph: nodes first (same-locator duplicates collapse to the
	/// first observation), then every link function in registration order.
	pub fn new(nodes: impl IntoIterator<Item = Node>, links: &[LinkFunction]) -> Graph {
		let mut g = Graph {
			graph: DiGraph::new(),
			index: HashMap::new(),
			by_kind: HashMap::new(),
		};
		for node in nodes {
			let locator = node.locator();
			if g.index.contains_key(&locator) {
				continue;
			}
			let kind = node.kind();
			let ix = g.graph.add_node(node);
			g.index.insert(locator, ix);
			g.by_kind.entry(kind).or_default().push(ix);
		}
		for link in links {
			let children = g.by_kind.get(&link.to).cloned().unwrap_or_default();
			for child in children {
				let parents = (link.func)(&g.graph[child]);
				for parent in parents {
					let Some(&parent_ix) = g.index.get(&parent.locator()) else {
						trace!(parent = %parent.locator(), "link target not in graph, skipping edge");
						continue;
					};
					// Duplicate edges from distinct link functions collapse.
					g.graph.update_edge(parent_ix, child, ());
				}
			}
		}
		g
	}

	pub fn get(&self, locator: &Locator) -> Option<&Node> {
		self.index.get(locator).map(|&ix| &self.graph[ix])
	}

	pub fn contains(&self, locator: &Locator) -> bool {
		self.index.contains_key(locator)
	}

	pub fn len(&self) -> usize {
		self.graph.node_count()
	}

	pub fn is_empty(&self) -> bool {
		self.graph.node_count() == 0
	}

	pub fn nodes(&self) -> impl Iterator<Item = &Node> {
		self.graph.node_weights()
	}

	/// All nodes matching a predicate.
	pub fn items<F: Fn(&Node) -> bool>(&self, pred: F) -> Vec<Node> {
		self
			.graph
			.node_weights()
			.filter(|n| pred(n))
			.cloned()
			.collect()
	}

	pub fn of_kind(&self, kind: &Kind) -> Vec<Node> {
		self
			.by_kind
			.get(kind)
			.into_iter()
			.flatten()
			.map(|&ix| self.graph[ix].clone())
			.collect()
	}

	pub fn parents(&self, locator: &Locator) -> Vec<Node> {
		self.neighbors(locator, Direction::Incoming)
	}

	pub fn children(&self, locator: &Locator) -> Vec<Node> {
		self.neighbors(locator, Direction::Outgoing)
	}

	fn neighbors(&self, locator: &Locator, dir: Direction) -> Vec<Node> {
		let Some(&ix) = self.index.get(locator) else {
			return Vec::new();
		};
		self
			.graph
			.neighbors_directed(ix, dir)
			.map(|n| self.graph[n].clone())
			.collect()
	}

	/// Every simple path from `from` to `to`, each starting with `from` and
	/// ending with `to`, never repeating a locator. `from == to` yields the
	/// single one-element path. Order within the result is stable but
	/// unspecified.
	pub fn paths(&self, from: &Locator, to: &Locator) -> Vec<Vec<Node>> {
		let (Some(&src), Some(&dst)) = (self.index.get(from), self.index.get(to)) else {
			return Vec::new();
		};
		if src == dst {
			return vec![vec![self.graph[src].clone()]];
		}
		algo::all_simple_paths::<Vec<_>, _, std::collections::hash_map::RandomState>(&self.graph, src, dst, 0, None)
			.map(|path| path.into_iter().map(|ix| self.graph[ix].clone()).collect())
			.collect()
	}

	/// Every edge as a `(parent, child)` locator pair.
	pub fn edges(&self) -> Vec<(Locator, Locator)> {
		self
			.graph
			.edge_references()
			.map(|e| {
				(
					self.graph[e.source()].locator(),
					self.graph[e.target()].locator(),
				)
			})
			.collect()
	}
}
