use std::time::Duration;

#[derive(Default)]
pub struct HttpConfig {
    pub(crate) timeout: Duration,
    pub(crate) conn_timeout: Duration,
    pub(crate) accept_invalid_certs: bool,
    pub(crate) manual_redirects: bool,
}

impl HttpConfig {
    pub fn new(timeout: Duration, conn_timeout: Duration) -> Self {
        Self {
            timeout,
            conn_timeout,
            accept_invalid_certs: false,
            manual_redirects: false,
        }
    }

    /// Fleet devices present self-signed management certificates.
    pub fn with_relaxed_tls(self) -> Self {
        Self {
            accept_invalid_certs: true,
            ..self
        }
    }

    /// Disables the client's own redirect handling so the caller can resolve
    /// redirect locations itself.
    pub fn with_manual_redirects(self) -> Self {
        Self {
            manual_redirects: true,
            ..self
        }
    }
}
