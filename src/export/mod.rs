use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The export response body, opaque to us, plus the name it should be saved
/// under.
#[derive(Clone, Debug)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl ExportArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self::with_timestamp(bytes, millis)
    }

    pub fn with_timestamp(bytes: Vec<u8>, timestamp_millis: u128) -> Self {
        Self {
            bytes,
            filename: backup_filename(timestamp_millis),
        }
    }
}

pub fn backup_filename(timestamp_millis: u128) -> String {
    format!("backup_users_{timestamp_millis}.csv")
}

pub async fn write_artifact(
    dir: &Path,
    artifact: &ExportArtifact,
) -> Result<PathBuf, std::io::Error> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&artifact.filename);
    tokio::fs::write(&path, &artifact.bytes).await?;
    Ok(path)
}
