/// Model file auto-download from HuggingFace.
///
/// Fetches the ONNX model and tokenizer files for the configured embedding
/// model if they are not already present locally.
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// HuggingFace organisation hosting the e5 family.
const HF_ORG: &str = "intfloat";

/// Files required for the embedder, with their relative URL paths.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Download base URL for a model. A name containing `/` is taken as a full
/// `org/model` repository id.
#[must_use]
pub fn model_base_url(model_name: &str) -> String {
    let repo = if model_name.contains('/') {
        model_name.to_string()
    } else {
        format!("{HF_ORG}/{model_name}")
    };
    format!("https://huggingface.co/{repo}/resolve/main")
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download model files from HuggingFace if any are missing.
///
/// Creates the model directory if it doesn't exist and skips files that are
/// already present.
pub fn download_model_files(model_dir: &Path, model_name: &str) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found, skipping download");
        return Ok(());
    }

    let base = model_base_url(model_name);
    info!("Downloading {model_name} from {base} (one-time download)");

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);
        if dest.exists() {
            continue;
        }

        let url = format!("{base}/{url_path}");
        info!("Downloading {filename}...");
        download_file(&dest, &url).with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(())
}

/// Download a single file with a progress bar.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);

    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    } else {
        ProgressBar::new_spinner()
    };

    // Write to a temp name first so an interrupted download is not mistaken
    // for a complete file on the next start.
    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;

    let bytes = resp.bytes().context("failed to read response body")?;
    file.write_all(&bytes).context("failed to write file")?;
    pb.set_position(bytes.len() as u64);
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;

    Ok(())
}
