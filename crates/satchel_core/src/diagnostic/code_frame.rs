use std::fmt::Write;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::CodeHighlight;

/// A source snippet attached to a user-facing error.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
  /// Source of the file at the time of the error
  pub code: Option<String>,

  pub file_path: Option<PathBuf>,

  pub code_highlights: Vec<CodeHighlight>,
}

const CONTEXT_LINES: usize = 2;

impl CodeFrame {
  pub fn new(file_path: PathBuf, code: String) -> Self {
    CodeFrame {
      code: Some(code),
      file_path: Some(file_path),
      code_highlights: Vec::new(),
    }
  }

  pub fn highlight(mut self, highlight: CodeHighlight) -> Self {
    self.code_highlights.push(highlight);
    self
  }

  /// Render the frame the way it is printed to the terminal: a `file:line:col`
  /// header, numbered context lines, and a caret line under each highlight.
  pub fn format(&self) -> String {
    let mut out = String::new();

    let first = self.code_highlights.first();
    if let Some(path) = &self.file_path {
      match first {
        Some(h) => {
          let _ = writeln!(out, "{}:{}:{}", path.display(), h.start.line, h.start.column);
        }
        None => {
          let _ = writeln!(out, "{}", path.display());
        }
      }
    }

    let (Some(code), Some(highlight)) = (&self.code, first) else {
      return out;
    };

    let lines: Vec<&str> = code.lines().collect();
    let target = highlight.start.line.max(1) as usize;
    let end = (target + CONTEXT_LINES).min(lines.len());
    let start = target.saturating_sub(CONTEXT_LINES + 1).min(end);
    let width = end.max(1).to_string().len();

    for (offset, line) in lines[start..end].iter().enumerate() {
      let number = start + offset + 1;
      let marker = if number == target { ">" } else { " " };
      let _ = writeln!(out, "{marker} {number:width$} | {line}");

      if number == target {
        let column = highlight.start.column.max(1) as usize;
        let span = if highlight.end.line == highlight.start.line {
          (highlight.end.column as usize).saturating_sub(column) + 1
        } else {
          1
        };
        let _ = writeln!(
          out,
          "  {:width$} | {}{}",
          "",
          " ".repeat(column - 1),
          "^".repeat(span)
        );
      }
    }

    out
  }
}
