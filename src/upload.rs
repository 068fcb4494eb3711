pub mod token;
pub mod uploader;

use crate::devices::Target;
use async_trait::async_trait;
use thiserror::Error;
use token::TokenError;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload part start: {chunk_start} end: {chunk_end} returned status: {status}")]
    ChunkRejected {
        chunk_start: u64,
        chunk_end: u64,
        status: u16,
    },
    #[error("the staged artifact {0} is empty")]
    EmptyArtifact(String),
    #[error("could not read staged artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upload request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Transfers staged artifacts to the target's file upload endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtensionUploader: Send + Sync {
    async fn upload(&self, target: &Target, rpm_file: &str) -> Result<(), UploadError>;
}
