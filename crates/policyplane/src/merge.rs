//! The strategy algebra reducing an ordered chain of policies into one
//! effective policy. Each strategy is a pure total function over optional
//! mergeables; results are always deep copies sharing no mutable
//! substructure with either input.

use serde::{Deserialize, Serialize};

use crate::topology::Topology;
use crate::types::{Kind, Mergeable, Node, Policy};
use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
	AtomicDefaults,
	AtomicOverrides,
	RuleWiseDefaults,
	RuleWiseOverrides,
}

impl MergeStrategy {
	pub fn is_defaults(&self) -> bool {
		matches!(
			self,
			MergeStrategy::AtomicDefaults | MergeStrategy::RuleWiseDefaults
		)
	}

	pub fn is_overrides(&self) -> bool {
		!self.is_defaults()
	}

	/// Merge `source` (the less specific policy) into `target` (the more
	/// specific accumulator).
	pub fn apply(
		&self,
		source: Option<&dyn Mergeable>,
		target: Option<&dyn Mergeable>,
	) -> Option<Box<dyn Mergeable>> {
		match self {
			MergeStrategy::AtomicDefaults => atomic_defaults(source, target),
			MergeStrategy::AtomicOverrides => atomic_overrides(source),
			MergeStrategy::RuleWiseDefaults => rule_wise_defaults(source, target),
			MergeStrategy::RuleWiseOverrides => rule_wise_overrides(source, target),
		}
	}
}

impl Display for MergeStrategy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			MergeStrategy::AtomicDefaults => "atomic defaults",
			MergeStrategy::AtomicOverrides => "atomic overrides",
			MergeStrategy::RuleWiseDefaults => "rule-wise defaults",
			MergeStrategy::RuleWiseOverrides => "rule-wise overrides",
		};
		write!(f, "{s}")
	}
}

/// A non-empty target wins entirely; an empty or absent one is filled by the
/// source.
fn atomic_defaults(
	source: Option<&dyn Mergeable>,
	target: Option<&dyn Mergeable>,
) -> Option<Box<dyn Mergeable>> {
	match (source, target) {
		(None, None) => None,
		(Some(s), None) => Some(s.deep_copy()),
		(None, Some(t)) => Some(t.deep_copy()),
		(Some(s), Some(t)) => {
			if t.is_empty() {
				Some(s.deep_copy())
			} else {
				Some(t.deep_copy())
			}
		},
	}
}

/// The source wins entirely, whatever the target holds.
fn atomic_overrides(source: Option<&dyn Mergeable>) -> Option<Box<dyn Mergeable>> {
	source.map(|s| s.deep_copy())
}

/// The target's rules stand; source rules with ids the target lacks are
/// appended in source order.
fn rule_wise_defaults(
	source: Option<&dyn Mergeable>,
	target: Option<&dyn Mergeable>,
) -> Option<Box<dyn Mergeable>> {
	match (source, target) {
		(None, None) => None,
		(Some(s), None) => Some(s.deep_copy()),
		(None, Some(t)) => Some(t.deep_copy()),
		(Some(s), Some(t)) => {
			let mut rules = t.rules();
			for (id, rule) in s.rules() {
				if !rules.contains_key(&id) {
					rules.insert(id, rule);
				}
			}
			let mut merged = t.deep_copy();
			merged.set_rules(rules);
			Some(merged)
		},
	}
}

/// The source's rules stand; target rules with ids the source lacks are
/// appended in target order. The result keeps the target's shell.
fn rule_wise_overrides(
	source: Option<&dyn Mergeable>,
	target: Option<&dyn Mergeable>,
) -> Option<Box<dyn Mergeable>> {
	match (source, target) {
		(None, None) => None,
		(Some(s), None) => Some(s.deep_copy()),
		(None, Some(t)) => Some(t.deep_copy()),
		(Some(s), Some(t)) => {
			let mut rules = s.rules();
			for (id, rule) in t.rules() {
				if !rules.contains_key(&id) {
					rules.insert(id, rule);
				}
			}
			let mut merged = t.deep_copy();
			merged.set_rules(rules);
			Some(merged)
		},
	}
}

/// Merge `source` into `target` under the source's own strategy. A policy
/// without the mergeable surface leaves the target untouched; that is a
/// programmer error on the policy type, recorded and logged, never a cycle
/// failure.
pub fn merge(
	source: &dyn Policy,
	target: Option<&dyn Mergeable>,
) -> Option<Box<dyn Mergeable>> {
	let Some(mergeable) = source.as_mergeable() else {
		error!(policy = %source.locator(), "policy kind does not support merging, keeping target");
		return target.map(|t| t.deep_copy());
	};
	source.merge_strategy().apply(Some(mergeable), target)
}

/// Reduce the policies of `kind` attached along `path` (root first) into the
/// effective policy for the leaf: the most specific policy is the initial
/// accumulator, and each less specific policy merges into it under its own
/// strategy, right to left.
pub fn effective_policy_in_path(
	topology: &Topology,
	path: &[Node],
	kind: &Kind,
) -> Option<Box<dyn Mergeable>> {
	let chain = topology.policies_in_path(path, kind);
	let mut effective: Option<Box<dyn Mergeable>> = None;
	for policy in chain.iter().rev() {
		effective = merge(policy.as_ref(), effective.as_deref());
	}
	effective
}
