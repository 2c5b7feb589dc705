//! Concrete Gateway-API node kinds and the expansion helpers that derive the
//! embedded kinds (listeners, route rules, service ports) from their owners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Kind, Metadata, Object, ObjectMeta, Targetable};
use crate::*;

pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// Kind constructors for the canonical node kinds.
pub mod kind {
	use super::super::Kind;
	use super::GATEWAY_API_GROUP;

	pub fn gateway_class() -> Kind {
		Kind::new(GATEWAY_API_GROUP, "GatewayClass")
	}
	pub fn gateway() -> Kind {
		Kind::new(GATEWAY_API_GROUP, "Gateway")
	}
	pub fn listener() -> Kind {
		Kind::new(GATEWAY_API_GROUP, "Listener")
	}
	pub fn http_route() -> Kind {
		Kind::new(GATEWAY_API_GROUP, "HTTPRoute")
	}
	pub fn http_route_rule() -> Kind {
		Kind::new(GATEWAY_API_GROUP, "HTTPRouteRule")
	}
	pub fn service() -> Kind {
		Kind::core("Service")
	}
	pub fn service_port() -> Kind {
		Kind::core("ServicePort")
	}
	pub fn backend() -> Kind {
		Kind::new(GATEWAY_API_GROUP, "Backend")
	}
}

macro_rules! impl_object {
	($ty:ty, $kind:expr) => {
		impl Object for $ty {
			fn kind(&self) -> Kind {
				$kind
			}
			fn namespace(&self) -> Option<Strng> {
				self.metadata.namespace.clone()
			}
			fn name(&self) -> Strng {
				self.metadata.name.clone()
			}
			fn creation_timestamp(&self) -> DateTime<Utc> {
				self.metadata.creation_timestamp()
			}
		}

		impl Metadata for $ty {
			fn metadata(&self) -> &ObjectMeta {
				&self.metadata
			}
		}
	};
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClass {
	pub metadata: ObjectMeta,
	pub controller_name: Strng,
}

impl_object!(GatewayClass, kind::gateway_class());
impl Targetable for GatewayClass {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
	pub metadata: ObjectMeta,
	pub gateway_class_name: Strng,
	#[serde(default)]
	pub listeners: Vec<ListenerSpec>,
}

impl_object!(Gateway, kind::gateway());
impl Targetable for Gateway {}

impl Gateway {
	/// One Listener node per listener entry, carrying the gateway's identity
	/// with the listener name as the locator section.
	pub fn expand_listeners(&self) -> Vec<Listener> {
		self
			.listeners
			.iter()
			.map(|spec| Listener {
				metadata: self.metadata.clone(),
				name: spec.name.clone(),
				spec: spec.clone(),
			})
			.collect()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
	pub name: Strng,
	pub port: u16,
	pub protocol: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hostname: Option<Strng>,
}

/// A single listener of a gateway, expanded into its own node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
	pub metadata: ObjectMeta,
	pub name: Strng,
	pub spec: ListenerSpec,
}

impl Object for Listener {
	fn kind(&self) -> Kind {
		kind::listener()
	}
	fn namespace(&self) -> Option<Strng> {
		self.metadata.namespace.clone()
	}
	fn name(&self) -> Strng {
		self.metadata.name.clone()
	}
	fn section(&self) -> Option<Strng> {
		Some(self.name.clone())
	}
	fn creation_timestamp(&self) -> DateTime<Utc> {
		self.metadata.creation_timestamp()
	}
}

impl Metadata for Listener {
	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}
}

impl Targetable for Listener {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRoute {
	pub metadata: ObjectMeta,
	#[serde(default)]
	pub parent_refs: Vec<ParentRef>,
	#[serde(default)]
	pub hostnames: Vec<Strng>,
	#[serde(default)]
	pub rules: Vec<HTTPRouteRuleSpec>,
}

impl_object!(HTTPRoute, kind::http_route());
impl Targetable for HTTPRoute {}

impl HTTPRoute {
	/// One HTTPRouteRule node per rule, with the 1-based rule ordinal as the
	/// locator section (`rule-1`, `rule-2`, ...).
	pub fn expand_rules(&self) -> Vec<HTTPRouteRule> {
		self
			.rules
			.iter()
			.enumerate()
			.map(|(i, spec)| HTTPRouteRule {
				metadata: self.metadata.clone(),
				name: strng::format!("rule-{}", i + 1),
				spec: spec.clone(),
			})
			.collect()
	}
}

fn default_parent_kind() -> Strng {
	strng::literal!("Gateway")
}

fn default_parent_group() -> Strng {
	strng::new(GATEWAY_API_GROUP)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
	#[serde(default = "default_parent_group")]
	pub group: Strng,
	#[serde(default = "default_parent_kind")]
	pub kind: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<Strng>,
	pub name: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub section_name: Option<Strng>,
}

impl ParentRef {
	pub fn gateway(name: impl Into<Strng>) -> ParentRef {
		ParentRef {
			group: default_parent_group(),
			kind: default_parent_kind(),
			namespace: None,
			name: name.into(),
			section_name: None,
		}
	}

	pub fn with_section(mut self, section: impl Into<Strng>) -> ParentRef {
		self.section_name = Some(section.into());
		self
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HTTPRouteRuleSpec {
	pub backend_refs: Vec<BackendRef>,
}

/// A reference from a route rule to a Backend resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
	pub name: Strng,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<Strng>,
}

/// A single rule of an HTTPRoute, expanded into its own node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteRule {
	pub metadata: ObjectMeta,
	pub name: Strng,
	pub spec: HTTPRouteRuleSpec,
}

impl Object for HTTPRouteRule {
	fn kind(&self) -> Kind {
		kind::http_route_rule()
	}
	fn namespace(&self) -> Option<Strng> {
		self.metadata.namespace.clone()
	}
	fn name(&self) -> Strng {
		self.metadata.name.clone()
	}
	fn section(&self) -> Option<Strng> {
		Some(self.name.clone())
	}
	fn creation_timestamp(&self) -> DateTime<Utc> {
		self.metadata.creation_timestamp()
	}
}

impl Metadata for HTTPRouteRule {
	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}
}

impl Targetable for HTTPRouteRule {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
	pub metadata: ObjectMeta,
	#[serde(default)]
	pub ports: Vec<ServicePortSpec>,
}

impl_object!(Service, kind::service());
impl Targetable for Service {}

impl Service {
	pub fn expand_ports(&self) -> Vec<ServicePort> {
		self
			.ports
			.iter()
			.map(|spec| ServicePort {
				metadata: self.metadata.clone(),
				name: spec.name.clone(),
				port: spec.port,
			})
			.collect()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortSpec {
	pub name: Strng,
	pub port: u16,
}

/// A single port of a service, expanded into its own node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
	pub metadata: ObjectMeta,
	pub name: Strng,
	pub port: u16,
}

impl Object for ServicePort {
	fn kind(&self) -> Kind {
		kind::service_port()
	}
	fn namespace(&self) -> Option<Strng> {
		self.metadata.namespace.clone()
	}
	fn name(&self) -> Strng {
		self.metadata.name.clone()
	}
	fn section(&self) -> Option<Strng> {
		Some(self.name.clone())
	}
	fn creation_timestamp(&self) -> DateTime<Utc> {
		self.metadata.creation_timestamp()
	}
}

impl Metadata for ServicePort {
	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}
}

impl Targetable for ServicePort {}

/// A backend resource resolving to a service port in its own namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
	pub metadata: ObjectMeta,
	pub service: Strng,
	/// Restricts the backend to one port of the service; absent means every
	/// port links.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
}

impl_object!(Backend, kind::backend());
impl Targetable for Backend {}
