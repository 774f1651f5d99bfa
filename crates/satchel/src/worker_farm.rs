use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use satchel_core::types::Package;
use satchel_core::types::ProcessedResult;
use satchel_core::types::ResolvedOptions;
use satchel_core::BundlerError;
use satchel_filesystem::FileSystemRef;

use crate::assets::process_asset;
use crate::assets::ProcessInput;

struct Job {
  input: ProcessInput,
  reply: tokio::sync::oneshot::Sender<Result<ProcessedResult, BundlerError>>,
}

/// A pool of worker threads, each exposing one operation:
/// `process(path, package, options) → ProcessedResult`.
///
/// Workers share nothing with the coordinator beyond the file system handle;
/// a job's inputs fully determine its output. A panicking job is retried
/// once on the same worker, then surfaced as `WorkerCrashed` — the pool
/// itself is never poisoned.
pub struct WorkerFarm {
  sender: Mutex<Option<mpsc::Sender<Job>>>,
  handles: Mutex<Vec<JoinHandle<()>>>,
  jobs_run: AtomicUsize,
  fs: FileSystemRef,
}

impl WorkerFarm {
  pub fn new(fs: FileSystemRef, workers: usize) -> Arc<Self> {
    let workers = if workers == 0 {
      num_cpus::get()
    } else {
      workers
    };

    let (sender, receiver) = mpsc::channel::<Job>();
    let receiver = Arc::new(Mutex::new(receiver));

    let farm = Arc::new(WorkerFarm {
      sender: Mutex::new(Some(sender)),
      handles: Mutex::new(Vec::with_capacity(workers)),
      jobs_run: AtomicUsize::new(0),
      fs: fs.clone(),
    });

    let mut handles = farm.handles.lock();
    for index in 0..workers {
      let receiver = receiver.clone();
      let fs = fs.clone();
      handles.push(
        std::thread::Builder::new()
          .name(format!("satchel-worker-{index}"))
          .spawn(move || worker_loop(receiver, fs))
          .expect("failed to spawn worker thread"),
      );
    }
    drop(handles);

    farm
  }

  /// Enqueue a job immediately; the returned receiver resolves with the
  /// worker's result. Fails with `FarmClosed` after [`WorkerFarm::end`].
  pub fn submit(
    &self,
    path: PathBuf,
    package: Arc<Package>,
    options: Arc<ResolvedOptions>,
  ) -> Result<tokio::sync::oneshot::Receiver<Result<ProcessedResult, BundlerError>>, BundlerError>
  {
    let (reply, receiver) = tokio::sync::oneshot::channel();
    let job = Job {
      input: ProcessInput {
        path,
        package,
        options,
      },
      reply,
    };

    let sender = self.sender.lock();
    let Some(sender) = sender.as_ref() else {
      return Err(BundlerError::FarmClosed);
    };
    sender.send(job).map_err(|_| BundlerError::FarmClosed)?;
    self.jobs_run.fetch_add(1, Ordering::SeqCst);

    Ok(receiver)
  }

  pub async fn run(
    &self,
    path: PathBuf,
    package: Arc<Package>,
    options: Arc<ResolvedOptions>,
  ) -> Result<ProcessedResult, BundlerError> {
    let receiver = self.submit(path.clone(), package, options)?;
    receiver.await.unwrap_or(Err(BundlerError::WorkerCrashed {
      path,
      message: "worker exited without replying".to_string(),
    }))
  }

  /// Total jobs dispatched over the farm's lifetime.
  pub fn jobs_run(&self) -> usize {
    self.jobs_run.load(Ordering::SeqCst)
  }

  pub fn is_open(&self) -> bool {
    self.sender.lock().is_some()
  }

  /// Drain and terminate. Subsequent `submit`/`run` calls fail with
  /// `FarmClosed`. Idempotent.
  pub fn end(&self) {
    let sender = self.sender.lock().take();
    drop(sender);

    let handles = std::mem::take(&mut *self.handles.lock());
    for handle in handles {
      let _ = handle.join();
    }
  }

  /// The process-wide shared farm, created lazily on first use and reused
  /// across rebuilds. A caller presenting a different file system gets a
  /// fresh farm in the slot; existing holders keep their own handle alive.
  pub fn shared(fs: FileSystemRef, workers: usize) -> Arc<Self> {
    let mut slot = SHARED_FARM.lock();
    if let Some(farm) = slot.as_ref() {
      if farm.is_open() && Arc::ptr_eq(&farm.fs, &fs) {
        return farm.clone();
      }
    }

    let farm = WorkerFarm::new(fs, workers);
    *slot = Some(farm.clone());
    farm
  }

  /// Tear down the shared farm (one-shot builds with `killWorkers`).
  pub fn shutdown_shared() {
    if let Some(farm) = SHARED_FARM.lock().take() {
      farm.end();
    }
  }
}

impl Drop for WorkerFarm {
  fn drop(&mut self) {
    self.end();
  }
}

static SHARED_FARM: Lazy<Mutex<Option<Arc<WorkerFarm>>>> = Lazy::new(|| Mutex::new(None));

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Job>>>, fs: FileSystemRef) {
  loop {
    let job = {
      let receiver = receiver.lock();
      receiver.recv()
    };
    let Ok(job) = job else {
      // Channel closed: the farm is shutting down.
      return;
    };

    let mut result = run_job(&fs, &job.input);
    if result.is_none() {
      tracing::warn!(path = %job.input.path.display(), "Worker crashed, retrying job once");
      result = run_job(&fs, &job.input);
    }

    let outcome = result.unwrap_or_else(|| {
      Err(BundlerError::WorkerCrashed {
        path: job.input.path.clone(),
        message: "job panicked twice".to_string(),
      })
    });

    // A dropped receiver only means the coordinator gave up on the build.
    let _ = job.reply.send(outcome);
  }
}

/// `None` means the job panicked.
fn run_job(
  fs: &FileSystemRef,
  input: &ProcessInput,
) -> Option<Result<ProcessedResult, BundlerError>> {
  std::panic::catch_unwind(AssertUnwindSafe(|| process_asset(fs, input))).ok()
}
