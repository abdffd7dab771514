//! Model acquisition for familiar.
//!
//! Models are verified by their required files (present and non-empty).
//! Downloads go to the primary source; when the primary does not answer
//! within a short bounded wait, acquisition switches to the mirror
//! automatically, without user intervention.

mod fetch;

pub use fetch::{ensure_model, primary_reachable};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown model: {0}")]
    NotFound(String),
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// One file a model needs on disk.
#[derive(Debug, Clone)]
pub struct ModelFile {
    /// Path within the remote repository.
    pub remote: String,
    /// Local file name inside the model directory.
    pub local: String,
}

/// A downloadable model: a repository on the primary and mirror sources
/// plus the files required for the model to count as present.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub dir_name: String,
    /// Repository path on the primary source (Hugging Face).
    pub primary_repo: String,
    /// Repository path on the mirror source (ModelScope).
    pub mirror_repo: String,
    pub files: Vec<ModelFile>,
}

/// Spec for a ggml whisper model of the given size ("base", "small", ...).
pub fn whisper_model(size: &str) -> ModelSpec {
    ModelSpec {
        name: format!("whisper-{size}"),
        dir_name: format!("whisper-{size}"),
        primary_repo: "ggerganov/whisper.cpp".to_string(),
        mirror_repo: "ggerganov/whisper.cpp".to_string(),
        files: vec![ModelFile {
            remote: format!("ggml-{size}.bin"),
            local: "model.bin".to_string(),
        }],
    }
}

/// Root directory for downloaded models.
pub fn models_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".familiar")
        .join("models")
}

/// Directory a spec's files live in.
pub fn model_dir(spec: &ModelSpec) -> PathBuf {
    models_dir().join(&spec.dir_name)
}

/// A model is present when every required file exists and is non-empty.
pub fn verify(spec: &ModelSpec) -> bool {
    verify_in(spec, &model_dir(spec))
}

pub(crate) fn verify_in(spec: &ModelSpec, dir: &std::path::Path) -> bool {
    spec.files.iter().all(|file| {
        dir.join(&file.local)
            .metadata()
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_spec() {
        let spec = whisper_model("base");
        assert_eq!(spec.dir_name, "whisper-base");
        assert_eq!(spec.files.len(), 1);
        assert_eq!(spec.files[0].remote, "ggml-base.bin");
        assert_eq!(spec.files[0].local, "model.bin");
    }

    #[test]
    fn test_verify_missing_dir() {
        let spec = whisper_model("nonexistent-size");
        assert!(!verify_in(&spec, std::path::Path::new("/nonexistent")));
    }

    #[test]
    fn test_verify_empty_file_fails() {
        let dir = std::env::temp_dir().join(format!("familiar-models-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let spec = whisper_model("base");
        std::fs::write(dir.join("model.bin"), b"").unwrap();
        assert!(!verify_in(&spec, &dir));

        std::fs::write(dir.join("model.bin"), b"weights").unwrap();
        assert!(verify_in(&spec, &dir));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
