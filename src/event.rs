use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use url::Url;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and query polling
  Tick,
  /// Terminal gained (true) or lost (false) focus
  Focus(bool),
  /// Result of a connectivity probe against the API host
  Connectivity(bool),
}

/// Event handler that produces events from terminal input, a tick timer and
/// the connectivity probe
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm reads block, keep them off the async workers
    let input = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      let event = if event::poll(tick_rate).unwrap_or(false) {
        match event::read() {
          Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
          Ok(CrosstermEvent::FocusGained) => Some(Event::Focus(true)),
          Ok(CrosstermEvent::FocusLost) => Some(Event::Focus(false)),
          _ => None,
        }
      } else {
        Some(Event::Tick)
      };
      if let Some(event) = event {
        if input.send(event).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Probe the host of `base` every `interval`. The first result is sent
  /// right away so the online flag is seeded at startup.
  pub fn watch_connectivity(&self, base: &Url, interval: Duration, timeout: Duration) {
    let Some((host, port)) = probe_target(base) else {
      tracing::warn!(%base, "no host to probe, connectivity checks disabled");
      return;
    };

    let tx = self.tx.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        let online = probe(&host, port, timeout).await;
        if tx.send(Event::Connectivity(online)).is_err() {
          break;
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

/// One probe of the host of `base`, used to seed the online flag before
/// anything is fetched. A base without a host cannot be probed and counts
/// as online.
pub async fn check_connectivity(base: &Url, timeout: Duration) -> bool {
  match probe_target(base) {
    Some((host, port)) => probe(&host, port, timeout).await,
    None => true,
  }
}

fn probe_target(base: &Url) -> Option<(String, u16)> {
  let host = base.host_str()?.to_string();
  let port = base.port_or_known_default()?;
  Some((host, port))
}

/// True if a TCP connection to the host opens within `timeout`
async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
  match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
    Ok(Ok(_)) => true,
    Ok(Err(err)) => {
      tracing::debug!(host, port, %err, "connectivity probe failed");
      false
    }
    Err(_) => {
      tracing::debug!(host, port, "connectivity probe timed out");
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::net::TcpListener;

  #[test]
  fn test_probe_target_uses_default_ports() {
    let https = Url::parse("https://jsonplaceholder.typicode.com").unwrap();
    assert_eq!(
      probe_target(&https),
      Some(("jsonplaceholder.typicode.com".to_string(), 443))
    );

    let local = Url::parse("http://127.0.0.1:3000/api/").unwrap();
    assert_eq!(probe_target(&local), Some(("127.0.0.1".to_string(), 3000)));

    let no_host = Url::parse("data:text/plain,hi").unwrap();
    assert_eq!(probe_target(&no_host), None);
  }

  #[tokio::test]
  async fn test_probe_open_and_closed_ports() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(probe("127.0.0.1", port, Duration::from_secs(1)).await);

    drop(listener);
    assert!(!probe("127.0.0.1", port, Duration::from_secs(1)).await);
  }

  #[tokio::test]
  async fn test_startup_check_follows_the_api_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let base = Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
    assert!(check_connectivity(&base, Duration::from_secs(1)).await);

    drop(listener);
    assert!(!check_connectivity(&base, Duration::from_secs(1)).await);

    let no_host = Url::parse("data:text/plain,hi").unwrap();
    assert!(check_connectivity(&no_host, Duration::from_secs(1)).await);
  }
}
