use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::ops::Deref;
use std::str;

use serde::Deserialize;
use serde::Serialize;

use super::DependencyRecord;
use super::FileType;

/// A stable per-process numeric asset identity. Ids survive rebuilds for as
/// long as the asset stays in the graph; they are what the update notifier
/// sends to clients.
pub type AssetId = u32;

/// An emitted artifact, or the raw contents of a source file.
#[derive(Clone, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Code {
  inner: Vec<u8>,
}

impl Code {
  pub fn new(bytes: Vec<u8>) -> Self {
    Self { inner: bytes }
  }

  pub fn bytes(&self) -> &[u8] {
    &self.inner
  }

  pub fn as_str(&self) -> anyhow::Result<&str> {
    str::from_utf8(&self.inner)
      .map_err(|e| anyhow::Error::new(e).context("Failed to convert code to UTF8 str"))
  }

  pub fn size(&self) -> usize {
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }
}

impl Deref for Code {
  type Target = Vec<u8>;

  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

impl Display for Code {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", String::from_utf8_lossy(&self.inner))
  }
}

impl Debug for Code {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}", String::from_utf8_lossy(&self.inner))
  }
}

impl From<String> for Code {
  fn from(value: String) -> Self {
    Self {
      inner: value.into_bytes(),
    }
  }
}

impl From<&str> for Code {
  fn from(value: &str) -> Self {
    Self {
      inner: value.to_owned().into_bytes(),
    }
  }
}

impl From<Vec<u8>> for Code {
  fn from(value: Vec<u8>) -> Self {
    Self { inner: value }
  }
}

/// Everything an asset emitted, keyed by output type.
///
/// A single asset may emit artifacts for more than one output type: a
/// stylesheet emits `{css, js-stub}`, a binary emits `{<ext>, js}`.
/// The map is ordered so concatenated hashes are deterministic.
pub type Generated = BTreeMap<FileType, Code>;

/// The pure output of running one asset through the worker pipeline.
///
/// This is both what the farm transports back to the coordinator and what
/// the persistent cache stores.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedResult {
  pub generated: Generated,
  pub hash: String,
  pub dependencies: Vec<DependencyRecord>,
}

impl ProcessedResult {
  /// Hex digest over the concatenated outputs, in output-type order.
  pub fn hash_generated(generated: &Generated) -> String {
    let mut bytes = Vec::new();
    for (file_type, code) in generated {
      bytes.extend_from_slice(file_type.extension().as_bytes());
      bytes.extend_from_slice(code.bytes());
    }
    crate::hash::hash_bytes(&bytes)
  }
}
