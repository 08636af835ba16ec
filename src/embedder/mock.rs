/// Mock embedder for tests and offline runs.
///
/// Generates deterministic embeddings from a hash of the text, so the same
/// text always maps to the same vector.
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Embedder, EmbedderError, l2_normalize};

/// A mock embedder that produces deterministic vectors from text hashes.
///
/// Also counts how many texts it was asked to embed and how many calls were
/// made, so tests can check batching behavior.
#[derive(Debug)]
pub struct MockEmbedder {
    pub dimensions: usize,
    texts_embedded: AtomicUsize,
    batch_calls: AtomicUsize,
    largest_batch: AtomicUsize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            texts_embedded: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            largest_batch: AtomicUsize::new(0),
        }
    }

    /// Total number of texts embedded so far.
    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::Relaxed)
    }

    /// Number of `embed_batch` calls so far.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }

    /// Size of the largest batch seen.
    pub fn largest_batch(&self) -> usize {
        self.largest_batch.load(Ordering::Relaxed)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let bytes = hasher.finish().to_le_bytes();

        // Rotate through the hash bytes with a per-dimension offset so
        // vectors are not just a repeated 8-value pattern.
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|i| (bytes[i % 8].wrapping_add((i / 8) as u8) as f32 + 1.0) / 256.0)
            .collect();
        l2_normalize(&mut embedding);
        embedding
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.texts_embedded.fetch_add(1, Ordering::Relaxed);
        Ok(self.vector_for(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        self.largest_batch.fetch_max(texts.len(), Ordering::Relaxed);
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// An embedder that always fails, for exercising error paths.
#[derive(Debug, Default)]
pub struct FailingEmbedder {
    pub dimensions: usize,
}

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
        Err(EmbedderError::InferenceFailed("embedding backend unavailable".to_string()))
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Err(EmbedderError::InferenceFailed("embedding backend unavailable".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
