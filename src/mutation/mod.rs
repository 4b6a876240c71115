//! Writes against the API and their cache reconciliation.
//!
//! `PostMutations` does the work; `Mutation<T>` is the view-side handle that
//! runs one invocation in the background and is polled on tick, like `Query`.

pub mod posts;

use std::future::Future;
use tokio::sync::mpsc;

use crate::api::RemoteError;

pub use posts::{without_post, PostMutations};

/// The state of one mutation invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MutationState<T> {
  /// Not started, or reset
  #[default]
  Idle,
  /// Waiting on the server
  Pending,
  Success(T),
  Error(RemoteError),
}

impl<T> MutationState<T> {
  pub fn is_pending(&self) -> bool {
    matches!(self, MutationState::Pending)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      MutationState::Success(data) => Some(data),
      _ => None,
    }
  }
}

/// Background mutation with state tracking
pub struct Mutation<T> {
  state: MutationState<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, RemoteError>>>,
}

impl<T: Send + 'static> Mutation<T> {
  pub fn new() -> Self {
    Self {
      state: MutationState::Idle,
      receiver: None,
    }
  }

  pub fn state(&self) -> &MutationState<T> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    self.state.is_pending()
  }

  /// Start an invocation. Ignored while one is pending.
  pub fn run<Fut>(&mut self, fut: Fut)
  where
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
  {
    if self.state.is_pending() {
      return;
    }
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = MutationState::Pending;

    tokio::spawn(async move {
      let result = fut.await;
      // Receiver might be dropped if the view closed
      let _ = tx.send(result);
    });
  }

  /// Poll for the result. Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = &mut self.receiver else {
      return false;
    };
    match receiver.try_recv() {
      Ok(result) => {
        self.state = match result {
          Ok(data) => MutationState::Success(data),
          Err(err) => MutationState::Error(err),
        };
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = MutationState::Error(RemoteError::transport("mutation task ended unexpectedly"));
        self.receiver = None;
        true
      }
    }
  }

  /// Back to Idle, forgetting any pending result
  pub fn reset(&mut self) {
    self.receiver = None;
    self.state = MutationState::Idle;
  }
}

impl<T: Send + 'static> Default for Mutation<T> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_mutation_success() {
    let mut mutation = Mutation::new();
    assert_eq!(*mutation.state(), MutationState::Idle);

    mutation.run(async { Ok::<_, RemoteError>(42) });
    assert!(mutation.is_pending());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(mutation.poll());
    assert_eq!(mutation.state().data(), Some(&42));
    assert!(!mutation.poll());
  }

  #[tokio::test]
  async fn test_mutation_error_then_reset() {
    let mut mutation: Mutation<u64> = Mutation::new();
    mutation.run(async { Err(RemoteError::status(500, "nope")) });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(mutation.poll());
    assert_eq!(
      *mutation.state(),
      MutationState::Error(RemoteError::status(500, "nope"))
    );

    mutation.reset();
    assert_eq!(*mutation.state(), MutationState::Idle);
  }

  #[tokio::test]
  async fn test_run_is_ignored_while_pending() {
    let mut mutation = Mutation::new();
    mutation.run(async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok::<_, RemoteError>(1)
    });
    mutation.run(async { Ok::<_, RemoteError>(2) });

    tokio::time::sleep(Duration::from_millis(50)).await;
    mutation.poll();
    assert_eq!(mutation.state().data(), Some(&1));
  }
}
