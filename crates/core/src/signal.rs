use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Shutdown funnels every way the process can be asked to stop (OS signals,
/// programmatic triggers) into one watchable flag.
pub struct Shutdown {
	tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
	pub fn new() -> Self {
		let (tx, _) = watch::channel(false);
		Shutdown { tx: Arc::new(tx) }
	}

	/// Trigger returns a handle which can be used to request a shutdown immediately.
	pub fn trigger(&self) -> ShutdownTrigger {
		ShutdownTrigger {
			tx: self.tx.clone(),
		}
	}

	/// Watcher returns a handle that resolves once shutdown has started.
	pub fn watcher(&self) -> ShutdownWatcher {
		ShutdownWatcher {
			rx: self.tx.subscribe(),
		}
	}

	/// Completes when a termination signal arrives or a trigger fires, after
	/// flipping every outstanding watcher.
	pub async fn wait(self) {
		let mut rx = self.tx.subscribe();
		tokio::select! {
			_ = imp::wait_for_signal() => {},
			_ = rx.changed() => {
				info!("received explicit shutdown request");
			},
		}
		let _ = self.tx.send(true);
	}
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Clone)]
pub struct ShutdownTrigger {
	tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
	pub fn shutdown_now(&self) {
		let _ = self.tx.send(true);
	}
}

#[derive(Clone, Debug)]
pub struct ShutdownWatcher {
	rx: watch::Receiver<bool>,
}

impl ShutdownWatcher {
	pub fn triggered(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves once shutdown has been requested. Also resolves if every
	/// trigger has been dropped, since no shutdown can arrive after that.
	pub async fn wait(&mut self) {
		while !*self.rx.borrow() {
			if self.rx.changed().await.is_err() {
				return;
			}
		}
	}
}

#[cfg(unix)]
mod imp {
	use tokio::signal::unix::{SignalKind, signal};
	use tracing::{info, warn};

	pub(super) async fn wait_for_signal() {
		tokio::select! {
			_ = watch_signal(SignalKind::interrupt(), "SIGINT") => {},
			_ = watch_signal(SignalKind::terminate(), "SIGTERM") => {},
		}
	}

	async fn watch_signal(kind: SignalKind, name: &str) {
		match signal(kind) {
			Ok(mut stream) => {
				stream.recv().await;
				info!("received signal {name}, starting shutdown");
			},
			Err(e) => {
				warn!("failed to register handler for {name}: {e}");
				std::future::pending::<()>().await;
			},
		}
	}
}

#[cfg(not(unix))]
mod imp {
	use tracing::info;

	pub(super) async fn wait_for_signal() {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("received ctrl-c, starting shutdown");
		} else {
			std::future::pending::<()>().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn trigger_resolves_watchers() {
		let shutdown = Shutdown::new();
		let trigger = shutdown.trigger();
		let mut watcher = shutdown.watcher();
		assert!(!watcher.triggered());
		tokio::spawn(shutdown.wait());
		trigger.shutdown_now();
		watcher.wait().await;
		assert!(watcher.triggered());
	}
}
