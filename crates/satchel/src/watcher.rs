use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher as _;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;

/// Registers individual asset paths with the OS file watcher and forwards
/// change events onto a channel the coordinator loop consumes.
///
/// Registration is best-effort: a path that cannot be watched (already
/// deleted, virtual) is logged and skipped, never fatal.
pub struct Watcher {
  inner: RecommendedWatcher,
  watched: HashSet<PathBuf>,
}

impl Watcher {
  pub fn new() -> anyhow::Result<(Self, UnboundedReceiver<PathBuf>)> {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel::<PathBuf>();

    let inner = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
      forward_event(&sender, event);
    })?;

    Ok((
      Watcher {
        inner,
        watched: HashSet::new(),
      },
      receiver,
    ))
  }

  pub fn watch(&mut self, path: &Path) {
    if !self.watched.insert(path.to_path_buf()) {
      return;
    }
    if let Err(error) = self.inner.watch(path, RecursiveMode::NonRecursive) {
      tracing::debug!(path = %path.display(), %error, "Failed to watch path");
    }
  }

  pub fn unwatch(&mut self, path: &Path) {
    if !self.watched.remove(path) {
      return;
    }
    if let Err(error) = self.inner.unwatch(path) {
      tracing::debug!(path = %path.display(), %error, "Failed to unwatch path");
    }
  }

  pub fn is_watching(&self, path: &Path) -> bool {
    self.watched.contains(path)
  }

  pub fn watched_len(&self) -> usize {
    self.watched.len()
  }
}

fn forward_event(sender: &UnboundedSender<PathBuf>, event: notify::Result<notify::Event>) {
  match event {
    Ok(event) => {
      for path in event.paths {
        let _ = sender.send(path);
      }
    }
    Err(error) => {
      tracing::warn!(%error, "File watcher error");
    }
  }
}
