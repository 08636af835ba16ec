/// ONNX Runtime embedder using the `ort` crate.
///
/// Loads a sentence-embedding ONNX model (multilingual-e5-small by default),
/// runs inference on padded batches, applies mean pooling with the attention
/// mask, and L2-normalizes the result.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::{BertTokenizer, TokenizerOutput};
use super::{Embedder, EmbedderError, l2_normalize};

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Create a new `OnnxEmbedder` by loading a model from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`. `dimensions`
    /// is the model's hidden size (384 for multilingual-e5-small).
    pub fn new(model_dir: &Path, dimensions: usize) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .with_inter_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer error: {e}")))?;

        info!(
            "ONNX model loaded (vocab size: {}, dimensions: {dimensions})",
            tokenizer.vocab_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    /// Run one forward pass over already tokenized, equally padded inputs.
    fn infer(&self, batch: &[TokenizerOutput]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch_size = batch.len();
        let seq_len = batch.first().map_or(0, |t| t.input_ids.len());
        if batch.iter().any(|t| t.input_ids.len() != seq_len) {
            return Err(EmbedderError::TokenizerError(
                "batch is not padded to a common length".to_string(),
            ));
        }

        let input_ids: Vec<i64> = batch.iter().flat_map(|t| t.input_ids.iter().copied()).collect();
        let attention_mask: Vec<i64> = batch
            .iter()
            .flat_map(|t| t.attention_mask.iter().copied())
            .collect();

        // (shape, data) tuple form avoids ndarray version coupling with ort
        let input_ids_val = Tensor::from_array(([batch_size, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array(([batch_size, seq_len], attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val =
            Tensor::from_array(([batch_size, seq_len], vec![0i64; batch_size * seq_len]))
                .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // Output shape: [batch_size, seq_len, hidden_size]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let row_len = seq_len * self.dimensions;
        if hidden_data.len() != batch_size * row_len {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} (expected {})",
                hidden_data.len(),
                batch_size * row_len
            )));
        }

        Ok((0..batch_size)
            .map(|b| {
                let mut pooled = mean_pooling(
                    &hidden_data[b * row_len..(b + 1) * row_len],
                    &attention_mask[b * seq_len..(b + 1) * seq_len],
                    seq_len,
                    self.dimensions,
                );
                l2_normalize(&mut pooled);
                pooled
            })
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbedderError::TokenizerError(format!("tokenization failed: {e}")))?;

        self.infer(std::slice::from_ref(&tokens))?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(format!("tokenization failed: {e}")))?;

        debug!("Embedding batch of {} texts", texts.len());
        self.infer(&tokens)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            result[h] += hidden_data[t * hidden_size + h] * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}
