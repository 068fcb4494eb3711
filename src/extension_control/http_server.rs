use thiserror::Error;

pub mod config;
pub mod handlers;
pub mod server;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error("server execution failed: {0}")]
    Run(#[from] std::io::Error),
}
