//! Canonical link functions joining the Gateway-API kinds. Each constructor
//! captures the candidate parent set current at topology construction.

use super::LinkFunction;
use crate::types::gateway::{
	self, Backend, Gateway, GatewayClass, HTTPRoute, HTTPRouteRule, Listener, ServicePort,
};
use crate::types::Node;
use crate::*;

pub fn gateway_class_to_gateway(gateway_classes: Vec<Arc<GatewayClass>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::gateway_class(),
		to: gateway::kind::gateway(),
		func: Box::new(move |child| {
			let Node::Gateway(gw) = child else {
				return Vec::new();
			};
			gateway_classes
				.iter()
				.filter(|gc| gc.metadata.name == gw.gateway_class_name)
				.map(|gc| Node::GatewayClass(gc.clone()))
				.collect()
		}),
	}
}

pub fn gateway_to_listener(gateways: Vec<Arc<Gateway>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::gateway(),
		to: gateway::kind::listener(),
		func: Box::new(move |child| {
			let Node::Listener(listener) = child else {
				return Vec::new();
			};
			gateways
				.iter()
				.filter(|gw| {
					gw.metadata.name == listener.metadata.name
						&& gw.metadata.namespace == listener.metadata.namespace
				})
				.map(|gw| Node::Gateway(gw.clone()))
				.collect()
		}),
	}
}

pub fn gateway_to_http_route(gateways: Vec<Arc<Gateway>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::gateway(),
		to: gateway::kind::http_route(),
		func: Box::new(move |child| {
			let Node::HTTPRoute(route) = child else {
				return Vec::new();
			};
			route
				.parent_refs
				.iter()
				.filter(|pr| pr.kind == "Gateway")
				.flat_map(|pr| {
					let namespace = pr.namespace.clone().or_else(|| route.metadata.namespace.clone());
					gateways
						.iter()
						.filter(move |gw| gw.metadata.name == pr.name && gw.metadata.namespace == namespace)
						.map(|gw| Node::Gateway(gw.clone()))
				})
				.collect()
		}),
	}
}

/// The section-selective subset of [`gateway_to_http_route`]: a parentRef
/// naming a listener links only it, one omitting the section links every
/// listener of that gateway, and one naming a section that does not exist
/// links nothing.
pub fn listener_to_http_route(listeners: Vec<Arc<Listener>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::listener(),
		to: gateway::kind::http_route(),
		func: Box::new(move |child| {
			let Node::HTTPRoute(route) = child else {
				return Vec::new();
			};
			route
				.parent_refs
				.iter()
				.filter(|pr| pr.kind == "Gateway")
				.flat_map(|pr| {
					let namespace = pr.namespace.clone().or_else(|| route.metadata.namespace.clone());
					listeners
						.iter()
						.filter(move |l| {
							l.metadata.name == pr.name
								&& l.metadata.namespace == namespace
								&& pr.section_name.as_ref().is_none_or(|s| *s == l.name)
						})
						.map(|l| Node::Listener(l.clone()))
				})
				.collect()
		}),
	}
}

pub fn http_route_to_http_route_rule(routes: Vec<Arc<HTTPRoute>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::http_route(),
		to: gateway::kind::http_route_rule(),
		func: Box::new(move |child| {
			let Node::HTTPRouteRule(rule) = child else {
				return Vec::new();
			};
			routes
				.iter()
				.filter(|r| {
					r.metadata.name == rule.metadata.name && r.metadata.namespace == rule.metadata.namespace
				})
				.map(|r| Node::HTTPRoute(r.clone()))
				.collect()
		}),
	}
}

pub fn http_route_rule_to_backend(rules: Vec<Arc<HTTPRouteRule>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::http_route_rule(),
		to: gateway::kind::backend(),
		func: Box::new(move |child| {
			let Node::Backend(backend) = child else {
				return Vec::new();
			};
			rules
				.iter()
				.filter(|rule| {
					rule.spec.backend_refs.iter().any(|br| {
						br.name == backend.metadata.name
							&& br.namespace.clone().or_else(|| rule.metadata.namespace.clone())
								== backend.metadata.namespace
					})
				})
				.map(|rule| Node::HTTPRouteRule(rule.clone()))
				.collect()
		}),
	}
}

pub fn backend_to_service_port(backends: Vec<Arc<Backend>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::backend(),
		to: gateway::kind::service_port(),
		func: Box::new(move |child| {
			let Node::ServicePort(port) = child else {
				return Vec::new();
			};
			backends
				.iter()
				.filter(|b| {
					b.service == port.metadata.name
						&& b.metadata.namespace == port.metadata.namespace
						&& b.port.is_none_or(|p| p == port.port)
				})
				.map(|b| Node::Backend(b.clone()))
				.collect()
		}),
	}
}

pub fn service_port_to_service(ports: Vec<Arc<ServicePort>>) -> LinkFunction {
	LinkFunction {
		from: gateway::kind::service_port(),
		to: gateway::kind::service(),
		func: Box::new(move |child| {
			let Node::Service(service) = child else {
				return Vec::new();
			};
			ports
				.iter()
				.filter(|p| {
					p.metadata.name == service.metadata.name
						&& p.metadata.namespace == service.metadata.namespace
				})
				.map(|p| Node::ServicePort(p.clone()))
				.collect()
		}),
	}
}
