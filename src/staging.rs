use async_trait::async_trait;
use futures::StreamExt;
use http::header;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

pub const VALID_DOWNLOAD_SCHEMES: [&str; 3] = ["file", "http", "https"];

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("extension url must use one of the following protocols: file, http, https (got {0})")]
    UnsupportedProtocol(String),
    #[error("invalid extension url {url}: {reason}")]
    InvalidSourceUrl { url: String, reason: String },
    #[error("file does not exist {0}")]
    ArtifactNotFound(String),
    #[error("could not stage {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a staging attempt that did not fail the request outright.
///
/// Transfer problems (unreachable hosts, dropped connections) are reported as
/// a value so the pipeline can mark the record failed, while invalid input
/// keeps surfacing through [StagingError].
#[derive(Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// The artifact is in the staging directory under this file name.
    Staged(String),
    TransferFailed(String),
}

/// Stages extension artifacts into the local staging directory for upload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStager: Send + Sync {
    async fn stage(&self, source_url: &str) -> Result<StageOutcome, StagingError>;
}

/// Parses a source URL and validates it against the allowed download schemes.
pub fn parse_source_url(raw: &str) -> Result<Url, StagingError> {
    let url = Url::parse(raw).map_err(|err| StagingError::InvalidSourceUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !VALID_DOWNLOAD_SCHEMES.contains(&url.scheme()) {
        return Err(StagingError::UnsupportedProtocol(url.scheme().to_string()));
    }
    Ok(url)
}

/// File name an artifact is staged under, the last segment of the URL path.
pub fn artifact_file_name(url: &Url) -> Result<String, StagingError> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StagingError::InvalidSourceUrl {
            url: url.to_string(),
            reason: "the url path has no file name".to_string(),
        })
}

/// Downloads artifacts over HTTP(S), following at most one redirect hop, or
/// links them from the local filesystem for `file:` URLs.
pub struct HttpArtifactStager {
    client: Client,
    staging_dir: PathBuf,
}

impl HttpArtifactStager {
    /// The client must have redirect handling disabled, redirect locations
    /// are resolved here against the original host.
    pub fn new(client: Client, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            staging_dir: staging_dir.into(),
        }
    }

    async fn stage_local_file(
        &self,
        url: &Url,
        dest: &Path,
        file_name: &str,
    ) -> Result<StageOutcome, StagingError> {
        let source = url
            .to_file_path()
            .map_err(|_| StagingError::InvalidSourceUrl {
                url: url.to_string(),
                reason: "the url does not name a local file".to_string(),
            })?;

        let exists = fs::try_exists(&source)
            .await
            .map_err(|err| stage_io_error(&source, err))?;
        if !exists {
            return Err(StagingError::ArtifactNotFound(
                source.display().to_string(),
            ));
        }

        // The artifact may already live in the staging directory.
        if source == dest {
            debug!(file = file_name, "artifact already staged");
            return Ok(StageOutcome::Staged(file_name.to_string()));
        }

        remove_stale(dest).await;
        #[cfg(unix)]
        fs::symlink(&source, dest)
            .await
            .map_err(|err| stage_io_error(dest, err))?;
        #[cfg(not(unix))]
        fs::copy(&source, dest)
            .await
            .map(|_| ())
            .map_err(|err| stage_io_error(dest, err))?;

        debug!(file = file_name, "staged local artifact");
        Ok(StageOutcome::Staged(file_name.to_string()))
    }

    async fn stage_remote(
        &self,
        url: &Url,
        dest: &Path,
        file_name: &str,
    ) -> Result<StageOutcome, StagingError> {
        remove_stale(dest).await;

        let mut response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => {
                return Ok(StageOutcome::TransferFailed(format!(
                    "download request failed: {err}"
                )));
            }
        };

        if let Some(redirect) = redirect_location(url, &response) {
            info!(redirect = %redirect, "following download redirect");
            response = match self.client.get(redirect).send().await {
                Ok(response) => response,
                Err(err) => {
                    return Ok(StageOutcome::TransferFailed(format!(
                        "redirected download request failed: {err}"
                    )));
                }
            };
        }

        self.stream_to_file(response, dest, file_name).await
    }

    async fn stream_to_file(
        &self,
        response: Response,
        dest: &Path,
        file_name: &str,
    ) -> Result<StageOutcome, StagingError> {
        let mut file = fs::File::create(dest)
            .await
            .map_err(|err| stage_io_error(dest, err))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => file
                    .write_all(&chunk)
                    .await
                    .map_err(|err| stage_io_error(dest, err))?,
                Err(err) => {
                    drop(file);
                    remove_stale(dest).await;
                    return Ok(StageOutcome::TransferFailed(format!(
                        "download stream failed: {err}"
                    )));
                }
            }
        }
        file.flush()
            .await
            .map_err(|err| stage_io_error(dest, err))?;
        Ok(StageOutcome::Staged(file_name.to_string()))
    }
}

#[async_trait]
impl ArtifactStager for HttpArtifactStager {
    async fn stage(&self, source_url: &str) -> Result<StageOutcome, StagingError> {
        let url = parse_source_url(source_url)?;
        let file_name = artifact_file_name(&url)?;
        let dest = self.staging_dir.join(&file_name);

        if url.scheme() == "file" {
            return self.stage_local_file(&url, &dest, &file_name).await;
        }

        info!(file = %file_name, url = source_url, "downloading extension artifact");
        self.stage_remote(&url, &dest, &file_name).await
    }
}

/// The redirect target of a response, if there is one. Relative locations are
/// qualified against the original request URL.
fn redirect_location(url: &Url, response: &Response) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    url.join(location).ok()
}

async fn remove_stale(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), %err, "could not remove stale staging file");
        }
    }
}

fn stage_io_error(path: &Path, source: std::io::Error) -> StagingError {
    StagingError::Io {
        path: path.display().to_string(),
        source,
    }
}
