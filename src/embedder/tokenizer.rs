/// BERT-style tokenizer wrapper around HuggingFace `tokenizers` crate.
///
/// Produces input ids and attention masks for the ONNX embedder. Batches are
/// padded to the longest sequence so they can be stacked into one tensor.
use std::path::Path;

use anyhow::Result;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// XLM-RoBERTa / e5 maximum sequence length.
const MAX_LENGTH: usize = 512;

/// Wrapper around the HuggingFace tokenizer for BERT-style models.
pub struct BertTokenizer {
    inner: Tokenizer,
}

/// Output of a tokenization operation.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    /// Token IDs (input_ids for the model).
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
}

impl BertTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file in the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self { inner })
    }

    /// Tokenize a single text, returning input IDs and attention mask.
    pub fn tokenize(&self, text: &str) -> Result<TokenizerOutput> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("failed to encode text: {e}"))?;

        Ok(to_output(&encoding))
    }

    /// Tokenize multiple texts, padded to the longest one.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizerOutput>> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        Ok(encodings.iter().map(to_output).collect())
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}

fn to_output(encoding: &tokenizers::Encoding) -> TokenizerOutput {
    TokenizerOutput {
        input_ids: encoding.get_ids().iter().map(|&id| i64::from(id)).collect(),
        attention_mask: encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect(),
    }
}
