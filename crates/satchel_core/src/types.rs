mod asset;
mod dependency;
mod file_type;
mod options;
mod package;

pub use asset::AssetId;
pub use asset::Code;
pub use asset::Generated;
pub use asset::ProcessedResult;
pub use dependency::DependencyRecord;
pub use dependency::SourceLocation;
pub use file_type::FileType;
pub use options::AssetKind;
pub use options::BundlerOptions;
pub use options::LogLevel;
pub use options::ResolvedOptions;
pub use package::Package;
