//! The cluster write contract reconcilers speak. The engine never calls this
//! itself; tasks capture the client and issue downstream writes, possibly
//! concurrently.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::*;

/// Identifies a resource collection in the cluster API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionResource {
	pub group: Strng,
	pub version: Strng,
	pub resource: Strng,
}

impl GroupVersionResource {
	pub fn new(
		group: impl Into<Strng>,
		version: impl Into<Strng>,
		resource: impl Into<Strng>,
	) -> GroupVersionResource {
		GroupVersionResource {
			group: group.into(),
			version: version.into(),
			resource: resource.into(),
		}
	}
}

impl Display for GroupVersionResource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.group.is_empty() {
			write!(f, "{}/{}", self.version, self.resource)
		} else {
			write!(f, "{}/{}/{}", self.group, self.version, self.resource)
		}
	}
}

/// Dynamic-object client for downstream writes. Implementations must be safe
/// for concurrent use.
#[async_trait]
pub trait ClusterClient: Send + Sync {
	async fn create(
		&self,
		gvr: &GroupVersionResource,
		namespace: Option<&str>,
		object: Value,
	) -> anyhow::Result<Value>;

	async fn update(
		&self,
		gvr: &GroupVersionResource,
		namespace: Option<&str>,
		object: Value,
	) -> anyhow::Result<Value>;

	async fn delete(
		&self,
		gvr: &GroupVersionResource,
		namespace: Option<&str>,
		name: &str,
	) -> anyhow::Result<()>;
}

/// Convert a typed object into the dynamic representation the cluster client
/// speaks.
pub fn destruct<T: Serialize>(object: &T) -> anyhow::Result<Value> {
	Ok(serde_json::to_value(object)?)
}
