use crate::api::RemoteError;

use super::keys::QueryKey;

/// Global hook that sees every query and mutation failure, whether or not a
/// view also displays it.
pub trait ErrorObserver: Send + Sync {
  fn on_query_error(&self, key: &QueryKey, error: &RemoteError);

  fn on_mutation_error(&self, mutation: &str, error: &RemoteError);
}

/// Observer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorObserver;

impl ErrorObserver for TracingErrorObserver {
  fn on_query_error(&self, key: &QueryKey, error: &RemoteError) {
    tracing::error!(%key, %error, "query error");
  }

  fn on_mutation_error(&self, mutation: &str, error: &RemoteError) {
    tracing::error!(mutation, %error, "mutation error");
  }
}
