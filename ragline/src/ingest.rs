//! Ingestion pipeline: corpus directory → chunks → embeddings → index store.
//!
//! A producer reads and chunks files in file-name order and feeds a bounded
//! channel; the consumer drains it with at most `workers` concurrent
//! embed-then-upsert jobs. A failure in one file or chunk is recorded as a
//! [`UnitFailure`] and never stops the run. Only configuration problems, an
//! unreachable store, or a failed `ensure_collection` end the run early.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline::{IngestionPipeline, RagConfig};
//!
//! let pipeline = IngestionPipeline::new(config, tokenizer, embedder, store)?;
//! let report = pipeline.run_once("./data", CancellationToken::new()).await?;
//! println!("{report}");
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, TokenChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, IndexedRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, with_deadline};
use crate::tokenizer::Tokenizer;
use crate::vectorstore::VectorStore;

/// Text embedded once at start to learn the provider's real output length.
const DIMENSION_CHECK_TEXT: &str = "ragline dimension check";

/// The pipeline step at which a unit of work failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading or decoding a file.
    Read,
    /// Splitting a document into chunks.
    Chunk,
    /// Embedding a chunk.
    Embed,
    /// Writing a record to the store.
    Upsert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Read => "read",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::Upsert => "upsert",
        })
    }
}

/// A file or chunk that was skipped because one of its stages failed.
#[derive(Debug)]
pub struct UnitFailure {
    /// Source identifier (file name) of the unit.
    pub source: String,
    /// Chunk position for chunk-level failures, `None` for whole-file failures.
    pub chunk_index: Option<usize>,
    /// The stage that failed.
    pub stage: Stage,
    /// The underlying error.
    pub error: RagError,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chunk_index {
            Some(index) => {
                write!(f, "{} chunk {index} ({}): {}", self.source, self.stage, self.error)
            }
            None => write!(f, "{} ({}): {}", self.source, self.stage, self.error),
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Regular files found in the corpus and visited.
    pub files_seen: usize,
    /// Files read and chunked successfully.
    pub files_ingested: usize,
    /// Files skipped because they could not be read or chunked.
    pub files_failed: usize,
    /// Chunks produced from successfully read files.
    pub chunks_produced: usize,
    /// Chunks embedded and stored.
    pub chunks_indexed: usize,
    /// Chunks skipped because embedding or storing failed.
    pub chunks_failed: usize,
    /// Every unit failure, in the order it was observed.
    pub failures: Vec<UnitFailure>,
    /// Whether the run stopped early because it was cancelled.
    pub cancelled: bool,
}

impl IngestReport {
    /// Whether every visited unit was processed without failure.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} files ingested ({} failed), {} of {} chunks indexed ({} failed)",
            self.files_ingested,
            self.files_seen,
            self.files_failed,
            self.chunks_indexed,
            self.chunks_produced,
            self.chunks_failed,
        )?;
        if self.cancelled {
            f.write_str(", cancelled")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Progress {
    files_seen: AtomicUsize,
    files_ingested: AtomicUsize,
    files_failed: AtomicUsize,
    chunks_produced: AtomicUsize,
    chunks_indexed: AtomicUsize,
    chunks_failed: AtomicUsize,
}

impl Progress {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn into_report(self, failures: Vec<UnitFailure>, cancelled: bool) -> IngestReport {
        IngestReport {
            files_seen: self.files_seen.into_inner(),
            files_ingested: self.files_ingested.into_inner(),
            files_failed: self.files_failed.into_inner(),
            chunks_produced: self.chunks_produced.into_inner(),
            chunks_indexed: self.chunks_indexed.into_inner(),
            chunks_failed: self.chunks_failed.into_inner(),
            failures,
            cancelled,
        }
    }
}

/// One chunk waiting to be embedded and stored.
#[derive(Debug)]
struct ChunkJob {
    source: Arc<str>,
    chunk: Chunk,
}

/// Reads a corpus directory into the index store.
///
/// The store handle is shared by every worker of a run and released with
/// [`shutdown`](Self::shutdown), or automatically by [`run_once`](Self::run_once).
pub struct IngestionPipeline {
    config: RagConfig,
    chunker: TokenChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl IngestionPipeline {
    /// Assemble a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if `config` is invalid.
    pub fn new(
        config: RagConfig,
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = TokenChunker::from_config(tokenizer, &config)?;
        Ok(Self { config, chunker, embedder, store })
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Ingest every regular file of `corpus`.
    pub async fn run(&self, corpus: impl AsRef<Path>) -> Result<IngestReport> {
        self.run_with_cancel(corpus, CancellationToken::new()).await
    }

    /// Ingest every regular file of `corpus`, stopping between units once `cancel` fires.
    ///
    /// Records stored before cancellation stay in the index.
    ///
    /// # Errors
    ///
    /// Returns a fatal error ([`RagError::is_fatal`]) if the corpus path is
    /// not a directory, the store cannot be reached, the embedder fails a
    /// one-off check or returns vectors whose length differs from the
    /// configured dimensions, or the collection
    /// cannot be ensured. Per-unit failures are reported in
    /// [`IngestReport::failures`] instead.
    pub async fn run_with_cancel(
        &self,
        corpus: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<IngestReport> {
        let corpus = corpus.as_ref();
        self.start(corpus).await?;
        let files = list_files(corpus).await?;
        info!(
            corpus = %corpus.display(),
            files = files.len(),
            workers = self.config.workers,
            "starting ingestion"
        );

        let progress = Progress::default();
        let failures = Mutex::new(Vec::new());
        let (tx, rx) = mpsc::channel::<ChunkJob>(self.config.workers * 2);

        let producer = async {
            let tx = tx;
            for path in &files {
                if cancel.is_cancelled() {
                    break;
                }
                Progress::bump(&progress.files_seen);
                let Some((source, chunks)) = self.read_and_chunk(path, &failures, &progress).await
                else {
                    continue;
                };

                for chunk in chunks {
                    Progress::bump(&progress.chunks_produced);
                    let job = ChunkJob { source: source.clone(), chunk };
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = tx.send(job) => if sent.is_err() { return },
                    }
                }
            }
        };

        let consumer = ReceiverStream::new(rx).for_each_concurrent(self.config.workers, |job| {
            let (progress, failures, cancel) = (&progress, &failures, &cancel);
            async move {
                if cancel.is_cancelled() {
                    return;
                }
                match self.index_chunk(&job).await {
                    Ok(()) => Progress::bump(&progress.chunks_indexed),
                    Err((stage, e)) => {
                        Progress::bump(&progress.chunks_failed);
                        error!(
                            source = %job.source,
                            chunk_index = job.chunk.index,
                            stage = %stage,
                            error = %e,
                            "failed to index chunk"
                        );
                        failures.lock().await.push(UnitFailure {
                            source: job.source.to_string(),
                            chunk_index: Some(job.chunk.index),
                            stage,
                            error: e,
                        });
                    }
                }
            }
        });

        tokio::join!(producer, consumer);

        let report = progress.into_report(failures.into_inner(), cancel.is_cancelled());
        if report.cancelled {
            warn!(%report, "ingestion cancelled");
        } else {
            info!(%report, "ingestion finished");
        }
        Ok(report)
    }

    /// Run once and release the store handle, whatever the outcome.
    pub async fn run_once(
        self,
        corpus: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<IngestReport> {
        let result = self.run_with_cancel(corpus, cancel).await;
        if let Err(e) = self.shutdown().await {
            warn!(error = %e, "failed to release store handle");
        }
        result
    }

    /// Release the store handle held by this pipeline.
    pub async fn shutdown(self) -> Result<()> {
        self.store.close().await
    }

    /// Checks that must pass before any file is touched.
    async fn start(&self, corpus: &Path) -> Result<()> {
        self.config.validate()?;

        match tokio::fs::metadata(corpus).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(RagError::Configuration(format!(
                    "corpus path {} is not a directory",
                    corpus.display()
                )));
            }
            Err(e) => {
                return Err(RagError::Configuration(format!(
                    "corpus path {} is not accessible: {e}",
                    corpus.display()
                )));
            }
        }

        let timeout = self.config.request_timeout();
        with_deadline("store ping", timeout, self.store.ping()).await.map_err(|e| {
            error!(backend = self.store.name(), error = %e, "index store unreachable");
            match e {
                RagError::Timeout { .. } => RagError::Connectivity {
                    backend: self.store.name().to_string(),
                    message: e.to_string(),
                },
                other => other,
            }
        })?;

        if self.embedder.dimensions() != self.config.dimensions {
            return Err(RagError::Configuration(format!(
                "embedding provider '{}' declares {} dimensions, expected {}",
                self.embedder.name(),
                self.embedder.dimensions(),
                self.config.dimensions
            )));
        }
        self.check_embedding_dimensions(timeout).await?;

        let schema = self.config.schema();
        with_deadline("ensure collection", timeout, self.store.ensure_collection(&schema))
            .await
            .map_err(|e| {
                error!(collection = %schema.name, error = %e, "failed to ensure collection");
                match e {
                    RagError::Timeout { .. } => RagError::Connectivity {
                        backend: self.store.name().to_string(),
                        message: e.to_string(),
                    },
                    other => other,
                }
            })
    }

    /// Embed a fixed text once so a provider that returns vectors of another
    /// length than declared fails the run before any file is read.
    async fn check_embedding_dimensions(&self, timeout: Duration) -> Result<()> {
        let provider = self.embedder.name().to_string();
        let check = self.embedder.embed(DIMENSION_CHECK_TEXT);
        let vector = with_deadline("embedding check", timeout, check).await.map_err(|e| {
            error!(
                provider = %provider,
                error = %e,
                "embedding provider failed the start-up check"
            );
            RagError::Configuration(format!("embedding provider '{provider}' is not usable: {e}"))
        })?;

        if vector.len() != self.config.dimensions {
            error!(
                provider = %provider,
                returned = vector.len(),
                expected = self.config.dimensions,
                "embedding dimensions do not match the collection"
            );
            return Err(RagError::Configuration(format!(
                "embedding provider '{provider}' returned {} dimensions, expected {}",
                vector.len(),
                self.config.dimensions
            )));
        }
        Ok(())
    }

    async fn read_and_chunk(
        &self,
        path: &Path,
        failures: &Mutex<Vec<UnitFailure>>,
        progress: &Progress,
    ) -> Option<(Arc<str>, Vec<Chunk>)> {
        let document = match read_document(path).await {
            Ok(document) => document,
            Err(e) => {
                let source = Document::from_path(path, "").source;
                self.file_failed(source, Stage::Read, e, failures, progress).await;
                return None;
            }
        };

        match self.chunker.chunk(&document.text) {
            Ok(chunks) => {
                Progress::bump(&progress.files_ingested);
                info!(source = %document.source, chunks = chunks.len(), "file chunked");
                Some((Arc::from(document.source), chunks))
            }
            Err(e) => {
                self.file_failed(document.source, Stage::Chunk, e, failures, progress).await;
                None
            }
        }
    }

    async fn file_failed(
        &self,
        source: String,
        stage: Stage,
        error: RagError,
        failures: &Mutex<Vec<UnitFailure>>,
        progress: &Progress,
    ) {
        Progress::bump(&progress.files_failed);
        error!(source = %source, stage = %stage, error = %error, "skipping file");
        failures.lock().await.push(UnitFailure { source, chunk_index: None, stage, error });
    }

    /// Embed and store one chunk.
    async fn index_chunk(&self, job: &ChunkJob) -> std::result::Result<(), (Stage, RagError)> {
        let timeout = self.config.request_timeout();

        let vector = with_deadline("embedding", timeout, self.embedder.embed(&job.chunk.text))
            .await
            .map_err(|e| (Stage::Embed, e))?;
        if vector.len() != self.config.dimensions {
            return Err((
                Stage::Embed,
                RagError::Embedding {
                    provider: self.embedder.name().to_string(),
                    message: format!(
                        "returned {} dimensions, expected {}",
                        vector.len(),
                        self.config.dimensions
                    ),
                },
            ));
        }

        let record = IndexedRecord::for_chunk(&job.source, &job.chunk, vector);
        with_deadline("upsert", timeout, self.store.upsert(&self.config.collection, &record))
            .await
            .map_err(|e| (Stage::Upsert, e))?;

        debug!(
            source = %job.source,
            chunk_index = job.chunk.index,
            id = %record.id,
            "indexed chunk"
        );
        Ok(())
    }
}

/// Regular files directly inside `corpus`, sorted by file name.
async fn list_files(corpus: &Path) -> Result<Vec<PathBuf>> {
    let io_error = |source| RagError::Io { path: corpus.to_path_buf(), source };
    let mut entries = tokio::fs::read_dir(corpus).await.map_err(io_error)?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        // follows symlinks; anything that is not a regular file is skipped silently
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            _ => debug!(path = %path.display(), "skipping non-file entry"),
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

async fn read_document(path: &Path) -> Result<Document> {
    let io_error = |source| RagError::Io { path: path.to_path_buf(), source };
    let bytes = tokio::fs::read(path).await.map_err(io_error)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| io_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    Ok(Document::from_path(path, text))
}
