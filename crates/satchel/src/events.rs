use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;

use satchel_core::types::AssetId;

/// One asset's entry in an update broadcast.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssetUpdate {
  pub id: AssetId,
  /// Output type → emitted artifact, as text.
  pub generated: BTreeMap<String, String>,
  /// Specifier → resolved child asset id.
  pub deps: BTreeMap<String, AssetId>,
}

/// The wire format pushed to connected clients. `to_json` produces exactly
/// the tagged shape clients parse: `{"type":"update","assets":[…]}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
  Update { assets: Vec<AssetUpdate> },
  Error { message: String },
}

impl Notification {
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string())
  }
}

/// What the bundler broadcasts to subscribers over the course of a build.
#[derive(Clone, Debug)]
pub enum BuildEvent {
  BuildStart,
  /// A build finished successfully; the tree has this many bundles.
  Bundled { bundles: usize },
  /// Per-asset updates for connected clients, sent on every rebuild.
  Update(Notification),
  BuildError { message: String },
}

/// A subscriber list; the update notifier and any other reporter attach
/// here. Closed subscribers are dropped on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
  subscribers: Vec<UnboundedSender<BuildEvent>>,
}

impl EventBus {
  pub fn subscribe(&mut self) -> UnboundedReceiver<BuildEvent> {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    self.subscribers.push(sender);
    receiver
  }

  pub fn emit(&mut self, event: BuildEvent) {
    self
      .subscribers
      .retain(|subscriber| subscriber.send(event.clone()).is_ok());
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn update_message_matches_the_wire_format() {
    let message = Notification::Update {
      assets: vec![AssetUpdate {
        id: 1,
        generated: BTreeMap::from([("js".to_string(), "module.exports = 2;".to_string())]),
        deps: BTreeMap::from([("./bar.json".to_string(), 2)]),
      }],
    };

    assert_eq!(
      message.to_json(),
      r#"{"type":"update","assets":[{"id":1,"generated":{"js":"module.exports = 2;"},"deps":{"./bar.json":2}}]}"#
    );
  }

  #[tokio::test]
  async fn bus_fans_out_and_drops_closed_subscribers() {
    let mut bus = EventBus::default();
    let mut first = bus.subscribe();
    let second = bus.subscribe();
    drop(second);

    bus.emit(BuildEvent::Bundled { bundles: 3 });

    assert!(matches!(
      first.recv().await,
      Some(BuildEvent::Bundled { bundles: 3 })
    ));
  }
}
