use std::sync::Arc;
use tokio::sync::watch;

/// Shared "are we online" flag.
///
/// Seeded from the first connectivity signal and flipped by later ones.
/// Fetches park on `wait_online` while the flag is down.
#[derive(Debug, Clone)]
pub struct OnlineManager {
  tx: Arc<watch::Sender<bool>>,
}

impl OnlineManager {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Update the flag, returning true if it actually changed
  pub fn set_online(&self, online: bool) -> bool {
    self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    })
  }

  /// Resolve once the flag is up (immediately if it already is)
  pub async fn wait_online(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives as long as self, so this only errors on teardown
    let _ = rx.wait_for(|online| *online).await;
  }
}

impl Default for OnlineManager {
  fn default() -> Self {
    Self::new(true)
  }
}
