use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use satchel::Bundler;
use satchel_core::types::BundlerOptions;
use satchel_core::types::LogLevel;
use satchel_filesystem::FileSystemRef;
use satchel_filesystem::OsFileSystem;

#[derive(Parser)]
#[command(name = "satchel", about = "Blazing fast, zero configuration application bundler")]
struct Args {
  /// Entry file to bundle
  entry: PathBuf,

  /// Output directory (default: dist)
  #[arg(long)]
  out_dir: Option<PathBuf>,

  /// URL prefix embedded in emitted references (default: /<out-dir basename>)
  #[arg(long)]
  public_url: Option<String>,

  /// Build for production (also read from NODE_ENV=production)
  #[arg(long)]
  production: bool,

  /// Force the watcher on
  #[arg(long)]
  watch: bool,

  /// Force the watcher off
  #[arg(long, conflicts_with = "watch")]
  no_watch: bool,

  /// Disable the persistent cache
  #[arg(long)]
  no_cache: bool,

  /// Cache directory (default: .cache)
  #[arg(long)]
  cache_dir: Option<PathBuf>,

  /// Disable live-update notifications
  #[arg(long)]
  no_hmr: bool,

  /// Force minified output
  #[arg(long)]
  minify: bool,

  /// Keep the worker farm alive after a one-shot build
  #[arg(long)]
  keep_workers: bool,

  /// 0 = silent, 1 = errors, 2 = info, 3 = verbose
  #[arg(long)]
  log_level: Option<u8>,

  /// Worker pool size (default: logical CPU count)
  #[arg(long)]
  threads: Option<usize>,
}

impl Args {
  fn to_options(&self) -> BundlerOptions {
    BundlerOptions {
      out_dir: self.out_dir.clone(),
      public_url: self.public_url.clone(),
      watch: match (self.watch, self.no_watch) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
      },
      cache: if self.no_cache { Some(false) } else { None },
      cache_dir: self.cache_dir.clone(),
      kill_workers: if self.keep_workers { Some(false) } else { None },
      minify: if self.minify { Some(true) } else { None },
      hmr: if self.no_hmr { Some(false) } else { None },
      log_level: self.log_level.map(log_level_from_flag),
      production: if self.production { Some(true) } else { None },
      threads: self.threads,
    }
  }
}

fn log_level_from_flag(level: u8) -> LogLevel {
  match level {
    0 => LogLevel::Silent,
    1 => LogLevel::Error,
    2 => LogLevel::Info,
    _ => LogLevel::Verbose,
  }
}

fn initialize_tracing(log_level: Option<u8>) {
  let directive = match log_level {
    Some(0) => "off",
    Some(1) => "error",
    Some(3) => "debug",
    _ => "info",
  };

  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
  let args = Args::parse();
  initialize_tracing(args.log_level);

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .expect("failed to build the tokio runtime");

  if let Err(e) = runtime.block_on(run(args)) {
    error!("Build failed: {e:#}");
    std::process::exit(1);
  }
}

async fn run(args: Args) -> anyhow::Result<()> {
  let options = args.to_options();
  let fs: FileSystemRef = Arc::new(OsFileSystem);
  let mut bundler = Bundler::new(args.entry, fs, options);
  bundler.run().await
}
