use serde::Deserialize;
use serde::Serialize;

/// Represents an output type by its extension.
///
/// Defaults to `FileType::Js` for convenience.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FileType {
  Css,
  Html,
  #[default]
  Js,
  Json,
  Other(String),
}

impl Serialize for FileType {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.extension().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for FileType {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let ext: String = Deserialize::deserialize(deserializer)?;
    Ok(Self::from_extension(&ext))
  }
}

impl FileType {
  pub fn extension(&self) -> &str {
    match self {
      FileType::Js => "js",
      FileType::Css => "css",
      FileType::Html => "html",
      FileType::Json => "json",
      FileType::Other(ext) => ext.as_str(),
    }
  }

  pub fn from_extension(ext: &str) -> Self {
    match ext {
      "js" => FileType::Js,
      "mjs" => FileType::Js,
      "cjs" => FileType::Js,
      "css" => FileType::Css,
      "html" => FileType::Html,
      "htm" => FileType::Html,
      "json" => FileType::Json,
      ext => FileType::Other(ext.to_string()),
    }
  }
}
