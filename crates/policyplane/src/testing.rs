//! Fixtures for the engine's own tests (and for hosts embedding the engine in
//! theirs, behind the `testing` feature): a concrete mergeable policy whose
//! rules paint surfaces of the target, plus an in-memory recording cluster
//! client.

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::controller::{ClusterClient, GroupVersionResource, Resource, StoredObject};
use crate::merge::MergeStrategy;
use crate::types::{Kind, Mergeable, Metadata, Object, ObjectMeta, Policy, TargetRef};
use crate::*;

pub const COLOR_POLICY_GROUP: &str = "paint.example.com";

pub fn color_policy_kind() -> Kind {
	Kind::new(COLOR_POLICY_GROUP, "ColorPolicy")
}

/// A policy painting surfaces of whatever it targets. Its merge strategy is
/// derived from its own shape: a `defaults` block selects defaults mode with
/// the block's atomic/rule-wise choice, an `overrides` block likewise, and a
/// bare rule list is implicit atomic defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorPolicy {
	pub metadata: ObjectMeta,
	pub spec: ColorSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorSpec {
	pub target_refs: Vec<TargetRef>,
	pub rules: Vec<ColorRule>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub defaults: Option<ColorBlock>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub overrides: Option<ColorBlock>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorBlock {
	pub rules: Vec<ColorRule>,
	pub strategy: BlockStrategy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockStrategy {
	#[default]
	Atomic,
	RuleWise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorRule {
	pub id: Strng,
	pub color: Strng,
}

pub fn target(kind: Kind, name: &str) -> TargetRef {
	TargetRef {
		group: kind.group,
		kind: kind.kind,
		namespace: None,
		name: strng::new(name),
		section_name: None,
	}
}

pub fn target_section(kind: Kind, name: &str, section: &str) -> TargetRef {
	TargetRef {
		section_name: Some(strng::new(section)),
		..target(kind, name)
	}
}

pub fn rule(id: &str, color: &str) -> ColorRule {
	ColorRule {
		id: strng::new(id),
		color: strng::new(color),
	}
}

/// A deterministic timestamp for ordering tests; `offset` seconds apart.
pub fn timestamp(offset: i64) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(offset)
}

impl ColorPolicy {
	fn base(name: &str, target: TargetRef) -> ColorPolicy {
		let mut metadata = ObjectMeta::new("default", name);
		metadata.creation_timestamp = Some(timestamp(0));
		ColorPolicy {
			metadata,
			spec: ColorSpec {
				target_refs: vec![target],
				..Default::default()
			},
		}
	}

	/// Bare rules, implicit atomic defaults.
	pub fn implicit(name: &str, target: TargetRef, rules: Vec<ColorRule>) -> ColorPolicy {
		let mut policy = Self::base(name, target);
		policy.spec.rules = rules;
		policy
	}

	pub fn defaults(
		name: &str,
		target: TargetRef,
		strategy: BlockStrategy,
		rules: Vec<ColorRule>,
	) -> ColorPolicy {
		let mut policy = Self::base(name, target);
		policy.spec.defaults = Some(ColorBlock { rules, strategy });
		policy
	}

	pub fn overrides(
		name: &str,
		target: TargetRef,
		strategy: BlockStrategy,
		rules: Vec<ColorRule>,
	) -> ColorPolicy {
		let mut policy = Self::base(name, target);
		policy.spec.overrides = Some(ColorBlock { rules, strategy });
		policy
	}

	pub fn created_at(mut self, at: DateTime<Utc>) -> ColorPolicy {
		self.metadata.creation_timestamp = Some(at);
		self
	}

	fn active_rules(&self) -> &[ColorRule] {
		if let Some(overrides) = &self.spec.overrides {
			&overrides.rules
		} else if let Some(defaults) = &self.spec.defaults {
			&defaults.rules
		} else {
			&self.spec.rules
		}
	}

	fn active_rules_mut(&mut self) -> &mut Vec<ColorRule> {
		if let Some(overrides) = &mut self.spec.overrides {
			&mut overrides.rules
		} else if let Some(defaults) = &mut self.spec.defaults {
			&mut defaults.rules
		} else {
			&mut self.spec.rules
		}
	}
}

impl Object for ColorPolicy {
	fn kind(&self) -> Kind {
		color_policy_kind()
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

impl Metadata for ColorPolicy {
	fn metadata(&self) -> &ObjectMeta {
		&self.metadata
	}
}

impl Policy for ColorPolicy {
	fn target_refs(&self) -> Vec<TargetRef> {
		self.spec.target_refs.clone()
	}

	fn merge_strategy(&self) -> MergeStrategy {
		if let Some(overrides) = &self.spec.overrides {
			match overrides.strategy {
				BlockStrategy::Atomic => MergeStrategy::AtomicOverrides,
				BlockStrategy::RuleWise => MergeStrategy::RuleWiseOverrides,
			}
		} else if let Some(defaults) = &self.spec.defaults {
			match defaults.strategy {
				BlockStrategy::Atomic => MergeStrategy::AtomicDefaults,
				BlockStrategy::RuleWise => MergeStrategy::RuleWiseDefaults,
			}
		} else {
			MergeStrategy::AtomicDefaults
		}
	}

	fn as_mergeable(&self) -> Option<&dyn Mergeable> {
		Some(self)
	}
}

impl Mergeable for ColorPolicy {
	fn rules(&self) -> IndexMap<Strng, Value> {
		self
			.active_rules()
			.iter()
			.map(|r| (r.id.clone(), Value::String(r.color.to_string())))
			.collect()
	}

	fn set_rules(&mut self, rules: IndexMap<Strng, Value>) {
		*self.active_rules_mut() = rules
			.into_iter()
			.map(|(id, color)| ColorRule {
				id,
				color: strng::new(color.as_str().unwrap_or_default()),
			})
			.collect();
	}

	fn is_empty(&self) -> bool {
		self.active_rules().is_empty()
	}

	fn deep_copy(&self) -> Box<dyn Mergeable> {
		Box::new(self.clone())
	}
}

impl Resource for ColorPolicy {
	fn kind() -> Kind {
		color_policy_kind()
	}
	fn into_stored(self: Arc<Self>) -> StoredObject {
		StoredObject::Policy(self)
	}
}

/// Shorthand for asserting on merged rule maps.
pub fn colors(policy: &dyn Mergeable) -> Vec<(String, String)> {
	policy
		.rules()
		.into_iter()
		.map(|(id, color)| {
			(
				id.to_string(),
				color.as_str().unwrap_or_default().to_string(),
			)
		})
		.collect()
}

/// A cluster client that records every write, for asserting on downstream
/// reconciler behaviour.
#[derive(Default)]
pub struct RecordingClient {
	pub writes: AsyncMutex<Vec<(Strng, GroupVersionResource, Option<Strng>, Value)>>,
}

#[async_trait::async_trait]
impl ClusterClient for RecordingClient {
	async fn create(
		&self,
		gvr: &GroupVersionResource,
		namespace: Option<&str>,
		object: Value,
	) -> anyhow::Result<Value> {
		self.writes.lock().await.push((
			strng::literal!("create"),
			gvr.clone(),
			namespace.map(strng::new),
			object.clone(),
		));
		Ok(object)
	}

	async fn update(
		&self,
		gvr: &GroupVersionResource,
		namespace: Option<&str>,
		object: Value,
	) -> anyhow::Result<Value> {
		self.writes.lock().await.push((
			strng::literal!("update"),
			gvr.clone(),
			namespace.map(strng::new),
			object.clone(),
		));
		Ok(object)
	}

	async fn delete(
		&self,
		gvr: &GroupVersionResource,
		namespace: Option<&str>,
		name: &str,
	) -> anyhow::Result<()> {
		self.writes.lock().await.push((
			strng::literal!("delete"),
			gvr.clone(),
			namespace.map(strng::new),
			Value::String(name.to_string()),
		));
		Ok(())
	}
}
