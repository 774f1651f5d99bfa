use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use satchel_core::types::BundlerOptions;
use satchel_filesystem::FileSystem;
use satchel_filesystem::FileSystemRef;
use satchel_filesystem::InMemoryFileSystem;

use crate::assets::emitted_name;

use super::*;

fn dev_options() -> BundlerOptions {
  BundlerOptions {
    production: Some(false),
    watch: Some(false),
    hmr: Some(true),
    threads: Some(2),
    ..BundlerOptions::default()
  }
}

fn make_bundler(fs: &Arc<InMemoryFileSystem>, entry: &str) -> Bundler {
  let fs_ref: FileSystemRef = fs.clone();
  let farm = WorkerFarm::new(fs_ref.clone(), 2);
  Bundler::new(entry, fs_ref, dev_options()).with_farm(farm)
}

fn write(fs: &InMemoryFileSystem, path: &str, contents: &str) {
  fs.write(Path::new(path), contents.as_bytes()).unwrap();
}

fn asset_id(bundler: &Bundler, path: &str) -> AssetId {
  bundler
    .graph()
    .id_for_path(Path::new(path))
    .unwrap_or_else(|| panic!("{path} is not in the graph"))
}

#[tokio::test]
async fn s1_basic_script_graph_bundles_into_one_file() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "var foo = require('./foo.js');\nmodule.exports = foo;\n");
  write(
    &fs,
    "/app/foo.js",
    "var data = require('./bar.json');\nmodule.exports = function () { return data.n; };\n",
  );
  write(&fs, "/app/bar.json", "{\"n\": 3}");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();

  let tree = bundler.tree().unwrap();
  assert_eq!(tree.len(), 1);
  let root = tree.get(tree.root());
  assert_eq!(root.name, "index.js");
  assert_eq!(root.assets.len(), 3);
  assert!(root.children.is_empty());

  let output = fs.read_to_string(Path::new("/dist/index.js")).unwrap();
  assert!(output.contains("var satchelRequire"));
  // The JSON module is embedded as a script module.
  assert!(output.contains("JSON.parse"));
  assert!(output.contains("\"./bar.json\""));
}

#[tokio::test]
async fn s2_stylesheet_import_creates_a_css_sibling() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(
    &fs,
    "/app/index.js",
    "require('./index.less');\nmodule.exports = function () { return 2; };\n",
  );
  write(&fs, "/app/index.less", ".index { color: red; }\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();

  let tree = bundler.tree().unwrap();
  let root = tree.get(tree.root());
  assert_eq!(root.name, "index.js");
  assert_eq!(root.assets.len(), 2);
  assert_eq!(root.children.len(), 1);

  let css_bundle = tree.get(root.children[0]);
  assert_eq!(css_bundle.name, "index.css");
  assert_eq!(css_bundle.assets.len(), 1);
  assert!(css_bundle.children.is_empty());

  let less = asset_id(&bundler, "/app/index.less");
  assert!(root.assets.contains(&less));
  assert_eq!(bundler.graph().get(less).unwrap().parent_bundle, Some(tree.root()));

  let css = fs.read_to_string(Path::new("/dist/index.css")).unwrap();
  assert!(css.contains(".index"));

  let js = fs.read_to_string(Path::new("/dist/index.js")).unwrap();
  assert!(js.contains("return 2;"));
  assert!(js.contains("module.exports = {};"));
}

#[tokio::test]
async fn s3_url_references_emit_their_own_bundles() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "require('./index.less');\n");
  write(
    &fs,
    "/app/index.less",
    ".index { background: url(./test.woff2); cursor: url(http://google.com); }\n",
  );
  fs.write(Path::new("/app/test.woff2"), &[0u8, 1, 2, 3, 255])
    .unwrap();

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();

  let tree = bundler.tree().unwrap();
  assert_eq!(tree.len(), 3);

  let font_name = emitted_name(Path::new("/app/test.woff2"));
  let css = fs.read_to_string(Path::new("/dist/index.css")).unwrap();
  assert!(css.contains(&format!("url(\"{font_name}\")")));
  assert!(css.contains("url(http://google.com)"));

  let font = fs.read(Path::new(&format!("/dist/{font_name}"))).unwrap();
  assert_eq!(font, vec![0u8, 1, 2, 3, 255]);
}

#[tokio::test]
async fn s4_dynamic_import_splits_a_child_bundle() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "import('./lazy.js');\n");
  write(
    &fs,
    "/app/lazy.js",
    "var util = require('./util.js');\nmodule.exports = util;\n",
  );
  write(&fs, "/app/util.js", "module.exports = 42;\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();

  let tree = bundler.tree().unwrap();
  let root = tree.get(tree.root());

  // Entry plus the bundle-loader stub; none of the lazy subtree.
  assert_eq!(root.assets.len(), 2);
  let lazy = asset_id(&bundler, "/app/lazy.js");
  let util = asset_id(&bundler, "/app/util.js");
  assert!(!root.assets.contains(&lazy));
  assert!(!root.assets.contains(&util));

  assert_eq!(root.children.len(), 1);
  let child = tree.get(root.children[0]);
  assert_eq!(child.entry_asset, Some(lazy));
  assert!(child.assets.contains(&lazy));
  assert!(child.assets.contains(&util));

  let child_name = emitted_name(Path::new("/app/lazy.js"));
  assert_eq!(child.name, child_name);

  let parent = fs.read_to_string(Path::new("/dist/index.js")).unwrap();
  assert!(parent.contains("loadBundle"));
  assert!(parent.contains(&child_name));

  let child_output = fs
    .read_to_string(Path::new(&format!("/dist/{child_name}")))
    .unwrap();
  assert!(child_output.starts_with("satchelRequire.register("));
  assert!(child_output.contains("42"));
}

#[tokio::test]
async fn s5_shared_assets_hoist_to_the_common_ancestor() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "import('./a.js');\nimport('./b.js');\n");
  write(&fs, "/app/a.js", "require('./shared.js');\nmodule.exports = 'a';\n");
  write(&fs, "/app/b.js", "require('./shared.js');\nmodule.exports = 'b';\n");
  write(&fs, "/app/shared.js", "module.exports = 'shared';\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();

  let tree = bundler.tree().unwrap();
  let shared = asset_id(&bundler, "/app/shared.js");

  assert_eq!(
    bundler.graph().get(shared).unwrap().parent_bundle,
    Some(tree.root())
  );
  assert!(tree.get(tree.root()).assets.contains(&shared));
  for child in &tree.get(tree.root()).children {
    assert!(!tree.get(*child).assets.contains(&shared));
  }
}

#[tokio::test]
async fn s6_rebuild_reprocesses_only_the_changed_asset() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "var foo = require('./foo.js');\n");
  write(&fs, "/app/foo.js", "module.exports = 1;\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  let mut events = bundler.subscribe();
  bundler.bundle().await.unwrap();

  let foo = asset_id(&bundler, "/app/foo.js");
  let jobs_after_first = bundler.worker_jobs();
  assert_eq!(jobs_after_first, 2);

  write(&fs, "/app/foo.js", "module.exports = 2;\n");
  bundler.on_change(Path::new("/app/foo.js")).await.unwrap();

  // Warm cache: exactly one more worker job, for foo.js alone.
  assert_eq!(bundler.worker_jobs(), jobs_after_first + 1);

  let output = fs.read_to_string(Path::new("/dist/index.js")).unwrap();
  assert!(output.contains("module.exports = 2;"));

  let mut update = None;
  while let Ok(event) = events.try_recv() {
    if let BuildEvent::Update(notification) = event {
      update = Some(notification);
    }
  }
  let Some(Notification::Update { assets }) = update else {
    panic!("no update notification was broadcast");
  };
  let entry = assets
    .iter()
    .find(|asset| asset.id == foo)
    .expect("update contains the changed asset");
  assert!(entry.generated.get("js").unwrap().contains("module.exports = 2;"));
}

#[tokio::test]
async fn warm_cache_across_processes_skips_the_farm() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "require('./foo.js');\n");
  write(&fs, "/app/foo.js", "module.exports = 1;\n");

  let mut first = make_bundler(&fs, "/app/index.js");
  first.bundle().await.unwrap();
  assert_eq!(first.worker_jobs(), 2);

  // A second coordinator over the same sources and cache directory never
  // reaches the farm.
  let mut second = make_bundler(&fs, "/app/index.js");
  second.bundle().await.unwrap();
  assert_eq!(second.worker_jobs(), 0);

  let output = fs.read_to_string(Path::new("/dist/index.js")).unwrap();
  assert!(output.contains("module.exports = 1;"));
}

#[tokio::test]
async fn identical_inputs_produce_identical_outputs() {
  let sources = [
    ("/app/index.js", "require('./index.less');\nimport('./lazy.js');\n"),
    ("/app/index.less", ".index { background: url(./test.woff2); }\n"),
    ("/app/lazy.js", "module.exports = 'lazy';\n"),
  ];

  let mut outputs = Vec::new();
  for _ in 0..2 {
    let fs = Arc::new(InMemoryFileSystem::new());
    for (path, contents) in sources {
      write(&fs, path, contents);
    }
    fs.write(Path::new("/app/test.woff2"), &[7u8, 7, 7]).unwrap();

    let mut bundler = make_bundler(&fs, "/app/index.js");
    bundler.bundle().await.unwrap();

    let js = fs.read(Path::new("/dist/index.js")).unwrap();
    let css = fs.read(Path::new("/dist/index.css")).unwrap();
    let lazy = fs
      .read(Path::new(&format!(
        "/dist/{}",
        emitted_name(Path::new("/app/lazy.js"))
      )))
      .unwrap();
    outputs.push((js, css, lazy));
  }

  assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn orphaned_assets_unload_after_a_rebuild() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "require('./a.js');\n");
  write(&fs, "/app/a.js", "module.exports = 'a';\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();
  assert!(bundler.graph().id_for_path(Path::new("/app/a.js")).is_some());

  write(&fs, "/app/index.js", "module.exports = 'no deps';\n");
  bundler.on_change(Path::new("/app/index.js")).await.unwrap();

  assert_eq!(bundler.graph().id_for_path(Path::new("/app/a.js")), None);
  assert_eq!(bundler.graph().len(), 1);
}

#[tokio::test]
async fn changes_to_inlined_files_invalidate_their_owner() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "require('./index.css');\n");
  write(&fs, "/app/index.css", "@import \"./base.css\";\n.index {}\n");
  write(&fs, "/app/base.css", ".base { color: red; }\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();

  // The inlined file is not a graph node of its own.
  assert_eq!(bundler.graph().id_for_path(Path::new("/app/base.css")), None);
  let css = fs.read_to_string(Path::new("/dist/index.css")).unwrap();
  assert!(css.contains("color: red"));

  write(&fs, "/app/base.css", ".base { color: blue; }\n");
  bundler.on_change(Path::new("/app/base.css")).await.unwrap();

  let css = fs.read_to_string(Path::new("/dist/index.css")).unwrap();
  assert!(css.contains("color: blue"));
}

#[tokio::test]
async fn delegate_implicit_dependencies_join_the_graph() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "module.exports = 1;\n");
  write(&fs, "/app/extra.js", "module.exports = 'extra';\n");

  let mut delegate = satchel_core::plugin::MockDelegate::new();
  delegate
    .expect_get_implicit_dependencies()
    .returning(|path: &Path| {
      if path.ends_with("index.js") {
        Some(vec![DependencyRecord::new("./extra.js")])
      } else {
        None
      }
    });

  let mut bundler = make_bundler(&fs, "/app/index.js").with_delegate(Arc::new(delegate));
  bundler.bundle().await.unwrap();

  let extra = asset_id(&bundler, "/app/extra.js");
  let tree = bundler.tree().unwrap();
  assert!(tree.get(tree.root()).assets.contains(&extra));
}

#[tokio::test]
async fn configuration_locks_once_bundling_starts() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "module.exports = 1;\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.register_extension("scss", AssetKind::Css).unwrap();
  bundler.bundle().await.unwrap();

  assert!(matches!(
    bundler.register_extension("vue", AssetKind::Js),
    Err(BundlerError::ConfigLocked)
  ));
  assert!(matches!(
    bundler.register_packager(FileType::Js, Arc::new(crate::packagers::RawPackager)),
    Err(BundlerError::ConfigLocked)
  ));
}

#[tokio::test]
async fn missing_dependencies_fail_one_shot_builds_with_a_code_frame() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "var gone = require('./missing.js');\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  let error = bundler.bundle().await.unwrap_err();
  assert!(bundler.errored());

  let bundler_error = error
    .downcast_ref::<BundlerError>()
    .expect("a typed bundler error");
  match bundler_error {
    BundlerError::DependencyResolveFailed {
      specifier,
      code_frame,
      ..
    } => {
      assert_eq!(specifier, "./missing.js");
      let rendered = code_frame.as_ref().unwrap().format();
      assert!(rendered.contains("require('./missing.js')"));
    }
    other => panic!("expected DependencyResolveFailed, got {other:?}"),
  }
}

#[tokio::test]
async fn invalidation_recomputes_from_scratch() {
  let fs = Arc::new(InMemoryFileSystem::new());
  write(&fs, "/app/index.js", "require('./foo.js');\n");
  write(&fs, "/app/foo.js", "module.exports = 1;\n");

  let mut bundler = make_bundler(&fs, "/app/index.js");
  bundler.bundle().await.unwrap();

  let foo = asset_id(&bundler, "/app/foo.js");
  let old_hash = bundler.graph().get(foo).unwrap().hash.clone().unwrap();

  write(&fs, "/app/foo.js", "module.exports = 'different';\n");
  bundler.on_change(Path::new("/app/foo.js")).await.unwrap();

  let asset = bundler.graph().get(foo).unwrap();
  assert!(asset.processed);
  let new_hash = asset.hash.clone().unwrap();
  assert_ne!(new_hash, old_hash);
  assert!(asset
    .generated
    .as_ref()
    .unwrap()
    .get(&FileType::Js)
    .unwrap()
    .as_str()
    .unwrap()
    .contains("different"));
}
