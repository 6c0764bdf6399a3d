use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::info;

use crate::error::BatchError;

const DATASETS_BASE_URL: &str = "https://ftp.ncbi.nlm.nih.gov/pub/datasets/command-line/v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapAction {
    AlreadyPresent,
    Downloaded,
}

/// Release URL of the datasets CLI for the host platform.
pub fn default_datasets_url() -> String {
    let os = match std::env::consts::OS {
        "macos" => "mac",
        "windows" => "win64",
        _ => "linux",
    };
    let arch = match std::env::consts::ARCH {
        "aarch64" => "arm64",
        _ => "amd64",
    };
    if os == "win64" {
        return format!("{DATASETS_BASE_URL}/win64/datasets.exe");
    }
    if os == "mac" {
        return format!("{DATASETS_BASE_URL}/mac/datasets");
    }
    format!("{DATASETS_BASE_URL}/{os}-{arch}/datasets")
}

/// Makes sure the datasets executable exists at `path`. An existing file is used as is:
/// no version or checksum check.
pub fn ensure_datasets_binary(path: &Path, url: &str) -> Result<BootstrapAction, BatchError> {
    if path.exists() {
        info!(path = %path.display(), "datasets binary present");
        return Ok(BootstrapAction::AlreadyPresent);
    }

    info!(url, path = %path.display(), "fetching datasets binary");
    let client = http_client()?;
    let mut response = client
        .get(url)
        .send()
        .map_err(|err| BatchError::BootstrapHttp(err.to_string()))?;
    if !response.status().is_success() {
        return Err(BatchError::BootstrapStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }

    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| BatchError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".datasets")
        .tempfile_in(parent)
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    std::io::copy(&mut response, &mut temp)
        .map_err(|err| BatchError::BootstrapHttp(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| BatchError::Filesystem(err.to_string()))?;
    mark_executable(path)?;

    Ok(BootstrapAction::Downloaded)
}

fn http_client() -> Result<Client, BatchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("kira-gb/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| BatchError::BootstrapHttp(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|err| BatchError::BootstrapHttp(err.to_string()))
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), BatchError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|err| BatchError::Filesystem(format!("chmod {}: {err}", path.display())))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), BatchError> {
    Ok(())
}
