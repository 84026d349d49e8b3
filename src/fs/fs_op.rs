use crate::err::Result;
use crate::global_var::LOGGER;
use rand::random;
use std::path::Path;

/// Write `data` next to `dest` under a random temporary name, then rename it over `dest`.
pub async fn fs_save_bytes_atomic(dest: &Path, data: &[u8]) -> Result<()> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| format!("Invalid destination file name: {}", dest.display()))?;
    let tmp = dest.with_file_name(format!(
        "{}.tmp-{:x}",
        file_name.to_string_lossy(),
        random::<u64>()
    ));

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    LOGGER.trace(format!(
        "fs_save_bytes_atomic: saved {} bytes to {}",
        data.len(),
        dest.display()
    ));
    Ok(())
}

/// Read the whole file; `Ok(None)` when it does not exist.
pub async fn fs_read_bytes_if_exists(src: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(src).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::temp_dir::TmpDirGuard;

    #[tokio::test]
    async fn atomic_save_replaces_content_and_leaves_no_temp_files() {
        let dir = TmpDirGuard::new("fs_op_atomic");
        let dest = dir.join("default.tasks");
        fs_save_bytes_atomic(&dest, b"first").await.unwrap();
        fs_save_bytes_atomic(&dest, b"second").await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(dir.as_path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn read_missing_file_is_none() {
        let dir = TmpDirGuard::new("fs_op_missing");
        let res = fs_read_bytes_if_exists(&dir.join("nope.tasks")).await.unwrap();
        assert!(res.is_none());
    }
}
