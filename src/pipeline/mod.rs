
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::Result;
use crate::chunking::{Chunk, ChunkingConfig, chunk_pages};
use crate::embeddings::Embedder;
use crate::extract::extract_all;
use crate::index::{IndexSnapshot, VectorIndex};
use crate::storage::BlobStore;

/// Counters and warnings from one analysis run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub dropped: usize,
    pub warnings: Vec<String>,
}

/// Result of an analysis run. `snapshot` is `None` when nothing could be
/// embedded; downstream features must treat that as "no index" and ask the
/// user to re-run the analysis.
#[derive(Debug)]
pub struct BuildOutcome {
    pub snapshot: Option<IndexSnapshot>,
    pub report: BuildReport,
}

/// Run the full build: read every document in the store, extract and chunk
/// the text, embed chunk by chunk, and assemble the index snapshot.
#[inline]
pub fn build_from_store(
    store: &dyn BlobStore,
    embedder: &dyn Embedder,
    config: &ChunkingConfig,
    show_progress: bool,
) -> Result<BuildOutcome> {
    let names = store.list()?;
    info!("Analyzing {} documents", names.len());

    let mut documents = Vec::with_capacity(names.len());
    let mut warnings = Vec::new();
    for name in &names {
        match store.read(name) {
            Ok(bytes) => documents.push((name.as_str(), bytes)),
            Err(e) => {
                warn!("Skipping unreadable document {}: {}", name, e);
                warnings.push(format!("{name} übersprungen: {e}"));
            }
        }
    }
    let documents_read = documents.len();

    let extraction = extract_all(documents);
    warnings.extend(extraction.warnings);

    let chunks = chunk_pages(&extraction.pages, config);

    let mut outcome = build_from_chunks(chunks, embedder, show_progress)?;
    outcome.report.documents = documents_read;
    outcome.report.pages = extraction.pages.len();
    outcome.report.warnings.splice(0..0, warnings);

    Ok(outcome)
}

/// Embed the chunk sequence one chunk per call and build the index.
///
/// A chunk whose embedding fails is dropped and the build continues; the
/// surviving chunks stay index-aligned with their vectors. When not a single
/// chunk embeds successfully there is no snapshot.
#[inline]
pub fn build_from_chunks(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    show_progress: bool,
) -> Result<BuildOutcome> {
    let mut report = BuildReport {
        chunks: chunks.len(),
        ..BuildReport::default()
    };

    let progress = if show_progress {
        ProgressBar::new(chunks.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    let mut valid_chunks: Vec<Chunk> = Vec::with_capacity(chunks.len());
    let mut index: Option<VectorIndex> = None;

    for chunk in chunks {
        match embedder.embed_document(&chunk.text) {
            Ok(vector) if vector.is_empty() => {
                report.dropped += 1;
                warn!("Dropping chunk (Seite {}): empty embedding", chunk.page);
                report
                    .warnings
                    .push(format!("Chunk auf Seite {} übersprungen: leerer Vektor", chunk.page));
            }
            Ok(vector) => {
                if index.is_none() {
                    // The first successful embedding fixes the dimension.
                    index = Some(VectorIndex::new(vector.len())?);
                }
                if let Some(idx) = index.as_mut() {
                    match idx.add(&vector) {
                        Ok(()) => {
                            valid_chunks.push(chunk);
                            report.embedded += 1;
                        }
                        Err(e) => {
                            // Dimension drift within one build; drop the chunk.
                            report.dropped += 1;
                            warn!("Dropping chunk (Seite {}): {}", chunk.page, e);
                            report
                                .warnings
                                .push(format!("Chunk auf Seite {} übersprungen: {e}", chunk.page));
                        }
                    }
                }
            }
            Err(e) => {
                report.dropped += 1;
                warn!("Dropping chunk (Seite {}): {}", chunk.page, e);
                report
                    .warnings
                    .push(format!("Chunk auf Seite {} übersprungen: {e}", chunk.page));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let snapshot = match index {
        Some(index) => Some(IndexSnapshot::new(valid_chunks, index)?),
        None => {
            info!("No embeddings succeeded; no index was built");
            None
        }
    };

    if let Some(snapshot) = &snapshot {
        info!(
            "Index built: {} chunks embedded, {} dropped, dimension {}",
            report.embedded,
            report.dropped,
            snapshot.dimension()
        );
    }

    Ok(BuildOutcome { snapshot, report })
}
