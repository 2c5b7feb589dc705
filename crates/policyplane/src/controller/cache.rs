//! The two flavours of per-watch object cache. Incremental caches own a
//! locator-keyed store updated per event; snapshot caches store nothing and
//! re-list the informer's own store on demand.

use std::collections::HashMap;

use super::{EventType, ResourceEvent, StoredObject};
use crate::types::Locator;
use crate::*;

pub trait ObjectCache: Send + Sync {
	fn apply(&mut self, event: &ResourceEvent);
	fn list(&self) -> Vec<StoredObject>;
}

#[derive(Default)]
pub struct IncrementalCache {
	objects: HashMap<Locator, StoredObject>,
}

impl ObjectCache for IncrementalCache {
	fn apply(&mut self, event: &ResourceEvent) {
		match event.event_type {
			EventType::Create | EventType::Update => {
				if let Some(new) = &event.new {
					self.objects.insert(new.locator(), new.clone());
				}
			},
			EventType::Delete => {
				if let Some(old) = &event.old {
					self.objects.remove(&old.locator());
				}
			},
		}
	}

	fn list(&self) -> Vec<StoredObject> {
		self.objects.values().cloned().collect()
	}
}

pub struct SnapshotCache {
	list: Arc<dyn Fn() -> Vec<StoredObject> + Send + Sync>,
}

impl SnapshotCache {
	pub fn new(list: Arc<dyn Fn() -> Vec<StoredObject> + Send + Sync>) -> SnapshotCache {
		SnapshotCache { list }
	}
}

impl ObjectCache for SnapshotCache {
	fn apply(&mut self, _event: &ResourceEvent) {
		// The informer owns the store; events only drive the reconcile cycle.
	}

	fn list(&self) -> Vec<StoredObject> {
		(self.list)()
	}
}
