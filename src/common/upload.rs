use std::path::Path;

use anyhow::{Context, Result, anyhow};
use axum::extract::multipart::Field;
use mime::Mime;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

/// Streams a multipart file field to `dest` chunk by chunk. Only `video/*`
/// parts are accepted. On failure the partially written file is removed.
pub async fn stream_to_file(mut field: Field<'_>, dest: &Path) -> Result<u64> {
    let content_type: Mime = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .parse()
        .map_err(|_| anyhow!("Invalid content type"))?;

    if content_type.type_() != mime::VIDEO {
        return Err(anyhow!("Invalid content type: only video/* allowed"));
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("creating {}", dest.display()))?;
    let mut written = 0u64;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                error!("Upload stream error: {}", e);
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(anyhow!("Stream interrupted"));
            }
        };

        if let Err(e) = file.write_all(&chunk).await {
            error!("Upload write error: {}", e);
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e.into());
        }
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;

    info!("⬆️ Stored {} bytes at {}", written, dest.display());
    Ok(written)
}
