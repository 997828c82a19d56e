//! Engine state shared by every batch run.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use crate::core::{ActionQueue, EngineConfig, ProgressBus, ProgressEvent, QueueSnapshot, SourceItem};
use crate::processing::batch::{self, BatchRunHandle, RunContext};
use crate::processing::{CacheStats, ImageTransformer, ResultCache, Transform};
use crate::utils::{EngineResult, FileIo, FsIo, OutputSettings, TransformError};

/// Entry point of the batch engine.
///
/// Holds the collaborators, the result cache and the progress bus. Clones are
/// cheap and share all of them, so the cache persists across batches.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    transform: Arc<dyn Transform>,
    io: Arc<dyn FileIo>,
    cache: Arc<ResultCache>,
    bus: ProgressBus,
}

impl Engine {
    /// Creates an engine from a validated configuration.
    ///
    /// Uses the `image`-backed transformer and the local filesystem.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        debug!(
            "Engine created (parallelism: {}, cache budget: {}MB)",
            config.parallelism,
            config.cache_budget_bytes / (1024 * 1024)
        );
        Ok(Self {
            transform: Arc::new(ImageTransformer::from_config(&config.upscaler)),
            io: Arc::new(FsIo),
            cache: Arc::new(ResultCache::new(config.cache_budget_bytes)),
            bus: ProgressBus::new(config.event_capacity),
            config: Arc::new(config),
        })
    }

    /// Replaces the transform collaborator
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = transform;
        self
    }

    /// Replaces the file I/O collaborator
    pub fn with_io(mut self, io: Arc<dyn FileIo>) -> Self {
        self.io = io;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to progress events of every batch run by this engine.
    ///
    /// Subscribe before submitting to see a batch's first events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.bus.subscribe()
    }

    /// Reads and describes source files through the engine's I/O collaborator.
    ///
    /// Files that cannot be read or classified are returned separately so the
    /// caller can report them without failing the others.
    pub fn probe_sources<P>(&self, paths: P) -> (Vec<SourceItem>, Vec<(PathBuf, TransformError)>)
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
    {
        let mut sources = Vec::new();
        let mut rejected = Vec::new();
        for path in paths {
            let path = path.into();
            match SourceItem::probe(self.io.as_ref(), path.clone()) {
                Ok(source) => sources.push(source),
                Err(e) => rejected.push((path, e)),
            }
        }
        (sources, rejected)
    }

    /// Starts a batch run; must be called from within a tokio runtime.
    ///
    /// Every source becomes one Job processed through `snapshot`. The run
    /// reserves at most `memory_budget_bytes` of estimated memory at once.
    pub fn submit_batch(
        &self,
        sources: Vec<SourceItem>,
        snapshot: QueueSnapshot,
        memory_budget_bytes: u64,
        parallelism: usize,
    ) -> BatchRunHandle {
        batch::start(sources, snapshot, memory_budget_bytes, parallelism, self.run_context())
    }

    /// Starts a batch with the configured budget, parallelism and output settings
    pub fn submit_queue(&self, sources: Vec<SourceItem>, queue: &ActionQueue) -> BatchRunHandle {
        self.submit_batch(
            sources,
            queue.snapshot(),
            self.config.memory_budget_bytes,
            self.config.parallelism,
        )
    }

    /// Starts a batch writing to `output` instead of the configured output settings
    pub fn submit_batch_to(
        &self,
        sources: Vec<SourceItem>,
        snapshot: QueueSnapshot,
        output: OutputSettings,
    ) -> BatchRunHandle {
        let mut ctx = self.run_context();
        ctx.output = output;
        batch::start(
            sources,
            snapshot,
            self.config.memory_budget_bytes,
            self.config.parallelism,
            ctx,
        )
    }

    /// Requests cooperative cancellation of a batch run
    pub fn cancel(&self, handle: &BatchRunHandle) {
        handle.cancel();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn run_context(&self) -> RunContext {
        RunContext {
            transform: Arc::clone(&self.transform),
            io: Arc::clone(&self.io),
            cache: Arc::clone(&self.cache),
            bus: self.bus.clone(),
            output: self.config.output.clone(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
