use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Write `data` as one JSON array. Returns the file size in bytes.
pub async fn export_json<T: Serialize>(data: &[T], output_path: &Path, pretty: bool) -> Result<u64> {
    debug!("Exporting {} records to JSON: {}", data.len(), output_path.display());

    let mut bytes = if pretty {
        serde_json::to_vec_pretty(data)?
    } else {
        serde_json::to_vec(data)?
    };
    bytes.push(b'\n');

    write_file(output_path, &bytes).await
}

/// Write `data` as JSON Lines, one record per line
pub async fn export_jsonl<T: Serialize>(data: &[T], output_path: &Path) -> Result<u64> {
    debug!("Exporting {} records to JSONL: {}", data.len(), output_path.display());

    let mut output = Vec::new();
    for item in data {
        serde_json::to_writer(&mut output, item)?;
        output.push(b'\n');
    }

    write_file(output_path, &output).await
}

async fn write_file(output_path: &Path, bytes: &[u8]) -> Result<u64> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output_path, bytes).await?;

    Ok(tokio::fs::metadata(output_path).await?.len())
}
