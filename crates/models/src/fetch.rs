//! Streaming download with automatic primary → mirror fallback.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::{model_dir, verify_in, ModelError, ModelSpec, Result};

const PRIMARY_BASE: &str = "https://huggingface.co";
const MIRROR_BASE: &str = "https://modelscope.cn/models";

/// How long the primary source gets to answer before acquisition switches
/// to the mirror.
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Primary,
    Mirror,
}

fn file_url(source: Source, spec: &ModelSpec, remote: &str) -> String {
    match source {
        Source::Primary => format!(
            "{PRIMARY_BASE}/{}/resolve/main/{remote}",
            spec.primary_repo
        ),
        Source::Mirror => format!(
            "{MIRROR_BASE}/{}/resolve/master/{remote}",
            spec.mirror_repo
        ),
    }
}

/// Probe the primary source with a bounded wait.
pub async fn primary_reachable() -> bool {
    let client = match reqwest::Client::builder()
        .connect_timeout(REACHABILITY_TIMEOUT)
        .timeout(REACHABILITY_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };

    match client.head(PRIMARY_BASE).send().await {
        Ok(_) => true,
        Err(error) => {
            tracing::info!(%error, "primary model source not reachable");
            false
        }
    }
}

/// Make sure the model is on disk, downloading it if needed. Returns the
/// model directory. `on_progress(downloaded, total)` is called as bytes
/// arrive; total is 0 when the server does not report a length.
pub async fn ensure_model<F>(spec: &ModelSpec, on_progress: F) -> Result<PathBuf>
where
    F: Fn(u64, u64),
{
    let dir = model_dir(spec);

    if verify_in(spec, &dir) {
        return Ok(dir);
    }

    std::fs::create_dir_all(&dir)?;

    let source = if primary_reachable().await {
        Source::Primary
    } else {
        tracing::warn!(model = %spec.name, "switching to mirror source");
        Source::Mirror
    };

    for file in &spec.files {
        let dest = dir.join(&file.local);

        // Skip files a previous partial run already fetched.
        if dest
            .metadata()
            .map(|meta| meta.len() > 1000)
            .unwrap_or(false)
        {
            tracing::info!(file = %file.local, "skipping (already exists)");
            continue;
        }

        let url = file_url(source, spec, &file.remote);
        tracing::info!(%url, dest = %dest.display(), "downloading model file");
        download_file(&url, &dest, &on_progress).await?;
    }

    if !verify_in(spec, &dir) {
        return Err(ModelError::DownloadFailed(
            "download completed but verification failed".to_string(),
        ));
    }

    Ok(dir)
}

async fn download_file<F>(url: &str, dest: &Path, on_progress: &F) -> Result<u64>
where
    F: Fn(u64, u64),
{
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ModelError::DownloadFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ModelError::DownloadFailed(format!(
            "HTTP {}: {}",
            response.status(),
            url
        )));
    }

    let total = response.content_length().unwrap_or(0);

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(ModelError::IoError)?;

    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ModelError::DownloadFailed(e.to_string()))?;
        file.write_all(&chunk).await.map_err(ModelError::IoError)?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    file.flush().await.map_err(ModelError::IoError)?;

    Ok(downloaded)
}
