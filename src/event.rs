use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Events driving the watch loop
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
  /// Periodic tick for connectivity probes and scheduled maintenance
  Tick,
  /// Ctrl-C received
  Shutdown,
}

/// Event handler that produces events from a tick timer and the interrupt signal
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn tick timer
    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        interval.tick().await;
        if tick_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    // Spawn signal listener
    tokio::spawn(async move {
      match tokio::signal::ctrl_c().await {
        Ok(()) => {
          let _ = tx.send(Event::Shutdown);
        }
        Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
