//! Async chunk loading with priority-ordered concurrent reads

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::chunk::{ChunkId, ChunkTexture};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::format::{read_chunk_data, ChunkFile};
use crate::streaming::loader::{ChunkLoader, ChunkRequest, Delivery, PayloadKind};
use crate::streaming::texture::TextureSource;

/// Loader tuning.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Maximum number of reads in flight
    pub max_concurrent: usize,
    /// Tokio worker threads
    pub worker_threads: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            worker_threads: 2,
        }
    }
}

type JobKey = (ChunkId, PayloadKind);

#[derive(Debug, Clone, Copy)]
struct Job {
    request: ChunkRequest,
    kind: PayloadKind,
    priority: f32,
}

impl Job {
    fn key(&self) -> JobKey {
        (self.request.id, self.kind)
    }
}

#[derive(Debug)]
enum Message {
    Load(Job),
    Cancel(JobKey),
}

/// Streams chunk geometry and textures on a dedicated tokio runtime.
///
/// Unloading a chunk whose load is still in flight cancels the job if it has
/// not started yet; if it has, the result is discarded when it arrives.
pub struct StreamingLoader {
    /// Channel for sending jobs to the worker loop
    request_tx: mpsc::UnboundedSender<Message>,
    /// Channel for receiving finished jobs
    result_rx: mpsc::UnboundedReceiver<Delivery>,
    /// Jobs whose result we still want
    pending: HashSet<JobKey>,
    path: PathBuf,
    has_textures: bool,
    runtime: Option<Runtime>,
}

impl StreamingLoader {
    /// Start a loader reading payloads from the chunk file at `path`.
    pub fn new(
        path: &Path,
        config: LoaderConfig,
        textures: Option<Arc<dyn TextureSource>>,
    ) -> Result<Self> {
        if config.max_concurrent == 0 {
            return Err(Error::Streaming("max_concurrent must be at least 1".into()));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("chunklod-loader")
            .enable_all()
            .build()?;

        let (request_tx, request_rx) = mpsc::unbounded_channel::<Message>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<Delivery>();

        let has_textures = textures.is_some();
        let worker_path = Arc::new(path.to_path_buf());
        runtime.spawn(Self::worker_loop(
            worker_path,
            textures,
            config.max_concurrent,
            request_rx,
            result_tx,
        ));

        log::info!(
            "Streaming loader started for {} ({} concurrent reads)",
            path.display(),
            config.max_concurrent
        );

        Ok(Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            path: path.to_path_buf(),
            has_textures,
            runtime: Some(runtime),
        })
    }

    /// Worker loop that runs jobs with concurrency control
    async fn worker_loop(
        path: Arc<PathBuf>,
        textures: Option<Arc<dyn TextureSource>>,
        max_concurrent: usize,
        mut request_rx: mpsc::UnboundedReceiver<Message>,
        result_tx: mpsc::UnboundedSender<Delivery>,
    ) {
        let mut active_tasks = JoinSet::new();
        let mut queued: Vec<Job> = Vec::new();
        let mut channel_open = true;

        loop {
            tokio::select! {
                message = request_rx.recv(), if channel_open => {
                    match message {
                        Some(Message::Load(job)) => queued.push(job),
                        Some(Message::Cancel(key)) => queued.retain(|job| job.key() != key),
                        None => channel_open = false,
                    }
                }

                Some(result) = active_tasks.join_next(), if !active_tasks.is_empty() => {
                    match result {
                        Ok(delivery) => {
                            // Receiver gone means the loader was dropped
                            if result_tx.send(delivery).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::error!("Chunk load task panicked: {}", e),
                    }
                }

                else => break,
            }

            if !channel_open && queued.is_empty() && active_tasks.is_empty() {
                break;
            }

            while active_tasks.len() < max_concurrent && !queued.is_empty() {
                // Highest priority last, so pop takes it
                queued.sort_by(|a, b| a.priority.total_cmp(&b.priority));
                let Some(job) = queued.pop() else { break };

                let path = Arc::clone(&path);
                let textures = textures.clone();
                active_tasks.spawn(Self::run_job(path, textures, job));
            }
        }

        log::debug!("Streaming loader worker exiting");
    }

    async fn run_job(
        path: Arc<PathBuf>,
        textures: Option<Arc<dyn TextureSource>>,
        job: Job,
    ) -> Delivery {
        let request = job.request;
        let kind = job.kind;

        let result = tokio::task::spawn_blocking(move || -> Result<Delivery> {
            match kind {
                PayloadKind::Geometry => {
                    let mut file = ChunkFile::open(&path)?;
                    let data = read_chunk_data(&mut file, request.data_file_position, request.label)?;
                    Ok(Delivery::Data(request.id, Box::new(data)))
                }
                PayloadKind::Texture => {
                    let source = textures
                        .ok_or_else(|| Error::Streaming("no texture source".into()))?;
                    let image = source.load_tile(request.level, request.x, request.z)?;
                    Ok(Delivery::Texture(request.id, Arc::new(ChunkTexture::new(image))))
                }
            }
        })
        .await;

        let failure = |reason: String| Delivery::Failed {
            chunk: request.id,
            kind,
            reason,
        };

        match result {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(e)) => failure(e.to_string()),
            Err(e) => failure(format!("load task failed: {}", e)),
        }
    }

    fn submit(&mut self, request: ChunkRequest, kind: PayloadKind, priority: f32) {
        let job = Job { request, kind, priority };
        if !self.pending.insert(job.key()) {
            return;
        }
        if self.request_tx.send(Message::Load(job)).is_err() {
            log::warn!("Streaming loader worker is gone; dropping load of chunk {}", request.label);
            self.pending.remove(&job.key());
        }
    }

    fn cancel(&mut self, id: ChunkId, kind: PayloadKind) {
        if self.pending.remove(&(id, kind)) {
            let _ = self.request_tx.send(Message::Cancel((id, kind)));
        }
    }

    /// Number of requests whose result is still wanted.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: ChunkId, kind: PayloadKind) -> bool {
        self.pending.contains(&(id, kind))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkLoader for StreamingLoader {
    fn request_load(&mut self, chunk: ChunkRequest, priority: f32) {
        self.submit(chunk, PayloadKind::Geometry, priority);
    }

    fn request_unload(&mut self, chunk: ChunkRequest) {
        self.cancel(chunk.id, PayloadKind::Geometry);
    }

    fn request_load_texture(&mut self, chunk: ChunkRequest) {
        if self.has_textures {
            self.submit(chunk, PayloadKind::Texture, 1.0);
        }
    }

    fn request_unload_texture(&mut self, chunk: ChunkRequest) {
        self.cancel(chunk.id, PayloadKind::Texture);
    }

    fn poll_completed(&mut self) -> Vec<Delivery> {
        let mut results = Vec::new();
        while let Ok(delivery) = self.result_rx.try_recv() {
            // Cancelled jobs are no longer pending; drop their results
            if self.pending.remove(&(delivery.chunk(), delivery.kind())) {
                results.push(delivery);
            }
        }
        results
    }
}

impl Drop for StreamingLoader {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
