use std::path::PathBuf;

use thiserror::Error;

use crate::diagnostic::CodeFrame;
use crate::types::SourceLocation;

/// Every failure the bundling pipeline can surface to a user.
///
/// Worker-side errors are transported back over the farm channel and
/// re-wrapped with the owning asset's path before reaching `bundle()`.
#[derive(Debug, Error)]
pub enum BundlerError {
  #[error("Cannot resolve dependency '{specifier}'")]
  ResolveFailed {
    specifier: String,
    importer: Option<PathBuf>,
  },

  #[error("Cannot resolve dependency '{specifier}' from '{}'", from.display())]
  DependencyResolveFailed {
    specifier: String,
    from: PathBuf,
    code_frame: Option<CodeFrame>,
  },

  #[error("Failed to parse {}: {message}", path.display())]
  ParseFailed {
    path: PathBuf,
    loc: Option<SourceLocation>,
    message: String,
  },

  #[error("Failed to transform {}: {message}", path.display())]
  TransformFailed { path: PathBuf, message: String },

  #[error("Worker crashed while processing {}: {message}", path.display())]
  WorkerCrashed { path: PathBuf, message: String },

  #[error("Failed to {op} {}", path.display())]
  IoFailed {
    path: PathBuf,
    op: &'static str,
    #[source]
    source: std::io::Error,
  },

  #[error("Cannot change the configuration once bundling has started")]
  ConfigLocked,

  #[error("The worker farm has been shut down")]
  FarmClosed,
}

impl BundlerError {
  pub fn io(path: impl Into<PathBuf>, op: &'static str, source: std::io::Error) -> Self {
    BundlerError::IoFailed {
      path: path.into(),
      op,
      source,
    }
  }

  /// The rendering used by the logger: message first, then the code frame
  /// when one is attached.
  pub fn pretty(&self) -> String {
    match self {
      BundlerError::DependencyResolveFailed {
        code_frame: Some(frame),
        ..
      } => {
        format!("{self}\n{}", frame.format())
      }
      _ => self.to_string(),
    }
  }
}
