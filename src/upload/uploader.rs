use super::token::UploadTokenProvider;
use super::{ExtensionUploader, UploadError};
use crate::devices::Target;
use crate::extension_control::defaults::{LOCAL_ADMIN_USER, UPLOADS_PATH};
use async_trait::async_trait;
use http::header;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Uploads staged artifacts in sequential `Content-Range` chunks.
///
/// The file is split into fixed-size parts uploaded in order. A token is
/// fetched once per upload and reused for every chunk, uploads without a
/// token authenticate with the fixed local admin credentials.
pub struct ChunkedUploader<P> {
    client: reqwest::Client,
    staging_dir: PathBuf,
    chunk_size: u64,
    tokens: P,
}

impl<P> ChunkedUploader<P>
where
    P: UploadTokenProvider,
{
    pub fn new(
        client: reqwest::Client,
        staging_dir: impl Into<PathBuf>,
        chunk_size: u64,
        tokens: P,
    ) -> Self {
        Self {
            client,
            staging_dir: staging_dir.into(),
            chunk_size,
            tokens,
        }
    }
}

#[async_trait]
impl<P> ExtensionUploader for ChunkedUploader<P>
where
    P: UploadTokenProvider,
{
    async fn upload(&self, target: &Target, rpm_file: &str) -> Result<(), UploadError> {
        let path = self.staging_dir.join(rpm_file);
        let mut file = File::open(&path)
            .await
            .map_err(|err| upload_io_error(&path, err))?;
        let size = file
            .metadata()
            .await
            .map_err(|err| upload_io_error(&path, err))?
            .len();
        if size == 0 {
            return Err(UploadError::EmptyArtifact(rpm_file.to_string()));
        }

        let token = self.tokens.upload_token(&target.host).await?;
        let mut upload_url = target.management_url(&format!("{UPLOADS_PATH}/{rpm_file}"));
        if let Some(token) = &token {
            upload_url = format!("{upload_url}?{}", token.query_param());
        }

        let mut start = 0u64;
        let mut end = size.min(self.chunk_size) - 1;
        loop {
            let len = (end - start + 1) as usize;
            let mut chunk = vec![0u8; len];
            file.read_exact(&mut chunk)
                .await
                .map_err(|err| upload_io_error(&path, err))?;

            debug!(
                file = rpm_file,
                range = %format_args!("{start}-{end}/{size}"),
                "uploading extension chunk"
            );
            let mut request = self
                .client
                .post(&upload_url)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_RANGE, format!("{start}-{end}/{size}"))
                .body(chunk);
            if token.is_none() {
                request = request.basic_auth(LOCAL_ADMIN_USER, Some(""));
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(UploadError::ChunkRejected {
                    chunk_start: start,
                    chunk_end: end,
                    status: response.status().as_u16(),
                });
            }

            if end == size - 1 {
                break;
            }
            start += self.chunk_size;
            end = (end + self.chunk_size).min(size - 1);
        }

        info!(file = rpm_file, target = %target, size, "uploaded extension artifact");
        Ok(())
    }
}

fn upload_io_error(path: &Path, source: std::io::Error) -> UploadError {
    UploadError::Io {
        path: path.display().to_string(),
        source,
    }
}
