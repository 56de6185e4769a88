//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::Path;

use tracing::info;

/// Ensure the storage root exists, creating it (and parents) when missing.
pub async fn ensure_storage_dir(root: impl AsRef<Path>) -> anyhow::Result<()> {
    let root = root.as_ref();
    if tokio::fs::metadata(root).await.is_ok() {
        return Ok(());
    }
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", root.display()))?;
    info!(path = %root.display(), "created storage directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_nested_dir_once() -> anyhow::Result<()> {
        let root = std::env::temp_dir()
            .join(format!("wb_env_{}", std::process::id()))
            .join("nested");
        ensure_storage_dir(&root).await?;
        assert!(tokio::fs::metadata(&root).await?.is_dir());
        // second call is a no-op
        ensure_storage_dir(&root).await?;
        let _ = tokio::fs::remove_dir_all(root.parent().unwrap()).await;
        Ok(())
    }
}
