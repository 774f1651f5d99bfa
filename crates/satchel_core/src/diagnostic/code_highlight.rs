use serde::Deserialize;
use serde::Serialize;

use crate::types::SourceLocation;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeHighlight {
  pub message: Option<String>,
  pub start: SourceLocation,
  pub end: SourceLocation,
}

impl CodeHighlight {
  pub fn at(loc: SourceLocation) -> Self {
    CodeHighlight {
      message: None,
      start: loc,
      end: loc,
    }
  }
}
