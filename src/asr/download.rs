//! HuggingFace Hub fetch of the recognizer model artifacts.
//!
//! The runtime loads its transducer from a fixed local directory
//! (`~/.moves/models/asr/`). When any artifact is missing there, this module
//! downloads `tokens.txt` and the encoder/decoder/joiner networks from a
//! HuggingFace repository and copies them into place. Files land in the Hub
//! cache first (`~/.cache/huggingface/hub` by default), so re-runs are cheap.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use tracing::info;

use super::{DECODER_FILE, ENCODER_FILE, JOINER_FILE, TOKENS_FILE};

/// Default repository holding the streaming transducer.
pub const DEFAULT_MODEL_REPO: &str =
    "csukuangfj/sherpa-onnx-nemo-streaming-fast-conformer-transducer-en-480ms";

const ARTIFACTS: [&str; 4] = [TOKENS_FILE, ENCODER_FILE, DECODER_FILE, JOINER_FILE];

/// True when every artifact is already present in `model_dir`.
pub fn model_present(model_dir: &Path) -> bool {
    ARTIFACTS.iter().all(|name| model_dir.join(name).exists())
}

/// Download a single file from a HuggingFace repository.
fn hf_download(api: &Api, repo_id: &str, filename: &str) -> Result<PathBuf> {
    let repo = api.model(repo_id.to_string());
    repo.get(filename)
        .with_context(|| format!("Failed to download '{}' from '{}'", filename, repo_id))
}

/// Ensure every recognizer artifact exists under `model_dir`, fetching any
/// missing one from `repo_id`.
pub fn ensure_model(model_dir: &Path, repo_id: &str) -> Result<()> {
    if model_present(model_dir) {
        return Ok(());
    }

    fs::create_dir_all(model_dir)
        .with_context(|| format!("Cannot create model directory: {}", model_dir.display()))?;

    let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;

    for name in ARTIFACTS {
        let target = model_dir.join(name);
        if target.exists() {
            continue;
        }
        info!(artifact = name, repo = repo_id, "downloading recognizer artifact");
        let cached = hf_download(&api, repo_id, name)?;
        fs::copy(&cached, &target).with_context(|| {
            format!(
                "Cannot copy '{}' into model directory: {}",
                name,
                target.display()
            )
        })?;
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
