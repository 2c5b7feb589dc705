//! Debug-only DOT rendering of a topology snapshot. Output is deterministic:
//! nodes sorted by locator, edges by (from, to).

use std::fmt::Write as _;
use std::path::PathBuf;

use itertools::Itertools;

use super::Topology;
use crate::controller::workflow::{Reconcile, ReconcileRequest};
use crate::*;

pub fn render(topology: &Topology) -> String {
	let mut out = String::from("digraph {\n");
	for locator in topology.items(|_| true).iter().map(|n| n.locator()).sorted() {
		let _ = writeln!(out, "  \"{locator}\"");
	}
	for (from, to) in topology.edges().into_iter().sorted() {
		let _ = writeln!(out, "  \"{from}\" -> \"{to}\"");
	}
	out.push_str("}\n");
	out
}

/// A reconcile task that dumps the cycle's topology to a DOT file. Write
/// failures are logged, never failing the cycle; this is a debug side-output.
pub struct DotWriter {
	path: PathBuf,
}

impl DotWriter {
	pub fn new(path: impl Into<PathBuf>) -> DotWriter {
		DotWriter { path: path.into() }
	}
}

#[async_trait::async_trait]
impl Reconcile for DotWriter {
	async fn reconcile(&self, req: ReconcileRequest) -> anyhow::Result<()> {
		let rendered = render(&req.topology);
		if let Err(e) = tokio::fs::write(&self.path, rendered).await {
			warn!(path = %self.path.display(), "failed to write topology dot file: {e}");
		}
		Ok(())
	}
}
