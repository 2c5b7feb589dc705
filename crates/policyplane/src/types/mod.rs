use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::merge::MergeStrategy;
use crate::*;

pub mod gateway;

/// Kind identifies a resource type by API group and kind name. The core group
/// is the empty string, as usual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Kind {
	pub group: Strng,
	pub kind: Strng,
}

impl Kind {
	pub fn new(group: impl Into<Strng>, kind: impl Into<Strng>) -> Kind {
		Kind {
			group: group.into(),
			kind: kind.into(),
		}
	}

	pub fn core(kind: impl Into<Strng>) -> Kind {
		Kind::new(strng::EMPTY, kind)
	}
}

impl Display for Kind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.group.is_empty() {
			write!(f, "{}", self.kind)
		} else {
			write!(f, "{}/{}", self.group, self.kind)
		}
	}
}

/// Locator is the stable, human-readable primary key of a graph node:
/// `kind:namespace/name[#section]`. Cluster-scoped objects omit the namespace
/// segment. Two nodes with the same locator are the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Locator(Strng);

impl Locator {
	pub fn new(kind: &Kind, namespace: Option<&str>, name: &str, section: Option<&str>) -> Locator {
		let mut out = String::with_capacity(kind.kind.len() + name.len() + 16);
		out.push_str(&kind.kind.to_lowercase());
		out.push(':');
		if let Some(ns) = namespace {
			out.push_str(ns);
			out.push('/');
		}
		out.push_str(name);
		if let Some(section) = section {
			out.push('#');
			out.push_str(section);
		}
		Locator(strng::new(out))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for Locator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The shared identity block every resource carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
	pub name: Strng,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub namespace: Option<Strng>,
	pub generation: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
	pub fn new(namespace: impl Into<Strng>, name: impl Into<Strng>) -> ObjectMeta {
		ObjectMeta {
			name: name.into(),
			namespace: Some(namespace.into()),
			..Default::default()
		}
	}

	pub fn cluster_scoped(name: impl Into<Strng>) -> ObjectMeta {
		ObjectMeta {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn creation_timestamp(&self) -> DateTime<Utc> {
		self.creation_timestamp.unwrap_or(DateTime::UNIX_EPOCH)
	}
}

/// Access to the identity block, for generic helpers such as the
/// generation-change predicate.
pub trait Metadata {
	fn metadata(&self) -> &ObjectMeta;
}

/// The minimal capability every graph participant and policy satisfies.
pub trait Object: Debug + Send + Sync + 'static {
	fn kind(&self) -> Kind;
	fn namespace(&self) -> Option<Strng>;
	fn name(&self) -> Strng;
	fn section(&self) -> Option<Strng> {
		None
	}
	fn creation_timestamp(&self) -> DateTime<Utc> {
		DateTime::UNIX_EPOCH
	}
	fn locator(&self) -> Locator {
		Locator::new(
			&self.kind(),
			self.namespace().as_deref(),
			&self.name(),
			self.section().as_deref(),
		)
	}
}

/// An Object that participates in the traffic graph and can be the target of
/// policies. Parents and attached policies are topology queries
/// ([`crate::topology::Topology::parents`],
/// [`crate::topology::Topology::policies_attached_to`]), not back-pointers.
pub trait Targetable: Object {}

/// A reference from a policy into the graph. An absent namespace inherits the
/// policy's own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
	#[serde(default)]
	pub group: Strng,
	pub kind: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<Strng>,
	pub name: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub section_name: Option<Strng>,
}

impl TargetRef {
	pub fn kind(&self) -> Kind {
		Kind::new(self.group.clone(), self.kind.clone())
	}
}

/// An Object that attaches to targetables.
pub trait Policy: Object {
	fn target_refs(&self) -> Vec<TargetRef>;
	fn merge_strategy(&self) -> MergeStrategy;
	/// The mergeable surface, when this policy supports merging.
	fn as_mergeable(&self) -> Option<&dyn Mergeable> {
		None
	}
}

/// The capabilities the merge algebra needs on top of [`Policy`]. Rules are
/// exposed as an insertion-ordered map of opaque payloads; implementations
/// keep their own typed rule representation behind this adaptor.
pub trait Mergeable: Policy {
	fn rules(&self) -> IndexMap<Strng, Value>;
	fn set_rules(&mut self, rules: IndexMap<Strng, Value>);
	fn is_empty(&self) -> bool;
	/// A copy sharing no mutable substructure with `self`.
	fn deep_copy(&self) -> Box<dyn Mergeable>;
}

/// A graph node. The concrete Gateway-API kinds are first-class variants; the
/// `Targetable` and `Object` variants carry user-supplied extra targetables
/// and non-targetable linked objects.
#[derive(Debug, Clone)]
pub enum Node {
	GatewayClass(Arc<gateway::GatewayClass>),
	Gateway(Arc<gateway::Gateway>),
	Listener(Arc<gateway::Listener>),
	HTTPRoute(Arc<gateway::HTTPRoute>),
	HTTPRouteRule(Arc<gateway::HTTPRouteRule>),
	Service(Arc<gateway::Service>),
	ServicePort(Arc<gateway::ServicePort>),
	Backend(Arc<gateway::Backend>),
	Targetable(Arc<dyn Targetable>),
	Object(Arc<dyn Object>),
}

macro_rules! for_node {
	($node:expr, $o:ident => $body:expr) => {
		match $node {
			Node::GatewayClass($o) => $body,
			Node::Gateway($o) => $body,
			Node::Listener($o) => $body,
			Node::HTTPRoute($o) => $body,
			Node::HTTPRouteRule($o) => $body,
			Node::Service($o) => $body,
			Node::ServicePort($o) => $body,
			Node::Backend($o) => $body,
			Node::Targetable($o) => $body,
			Node::Object($o) => $body,
		}
	};
}

impl Node {
	pub fn kind(&self) -> Kind {
		for_node!(self, o => o.kind())
	}

	pub fn namespace(&self) -> Option<Strng> {
		for_node!(self, o => o.namespace())
	}

	pub fn name(&self) -> Strng {
		for_node!(self, o => o.name())
	}

	pub fn section(&self) -> Option<Strng> {
		for_node!(self, o => o.section())
	}

	pub fn creation_timestamp(&self) -> DateTime<Utc> {
		for_node!(self, o => o.creation_timestamp())
	}

	pub fn locator(&self) -> Locator {
		for_node!(self, o => o.locator())
	}

	/// Everything except plain linked objects can be the target of a policy.
	pub fn is_targetable(&self) -> bool {
		!matches!(self, Node::Object(_))
	}
}

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		self.locator() == other.locator()
	}
}

impl Eq for Node {}

impl std::hash::Hash for Node {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.locator().hash(state)
	}
}

impl Display for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.locator())
	}
}
