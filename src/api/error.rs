use thiserror::Error;

/// Failure of a remote call.
///
/// Transport failures, non-2xx responses and undecodable bodies all land
/// here; callers never need to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct RemoteError {
  status: Option<u16>,
  message: String,
}

impl RemoteError {
  /// A response arrived with a non-success status
  pub fn status(status: u16, message: impl Into<String>) -> Self {
    Self {
      status: Some(status),
      message: message.into(),
    }
  }

  /// No usable response (connection, timeout, decoding)
  pub fn transport(message: impl Into<String>) -> Self {
    Self {
      status: None,
      message: message.into(),
    }
  }

  /// HTTP status, if the server answered
  pub fn http_status(&self) -> Option<u16> {
    self.status
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  fn describe(&self) -> String {
    match self.status {
      Some(status) => format!("HTTP {}: {}", status, self.message),
      None => self.message.clone(),
    }
  }
}

impl From<reqwest::Error> for RemoteError {
  fn from(err: reqwest::Error) -> Self {
    match err.status() {
      Some(status) => Self::status(status.as_u16(), err.to_string()),
      None => Self::transport(err.to_string()),
    }
  }
}

impl From<url::ParseError> for RemoteError {
  fn from(err: url::ParseError) -> Self {
    Self::transport(format!("invalid URL: {}", err))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_with_status() {
    let err = RemoteError::status(404, "Not Found");
    assert_eq!(err.to_string(), "HTTP 404: Not Found");
    assert_eq!(err.http_status(), Some(404));
  }

  #[test]
  fn test_display_transport() {
    let err = RemoteError::transport("connection refused");
    assert_eq!(err.to_string(), "connection refused");
    assert_eq!(err.http_status(), None);
  }
}
