//! Per-call configuration (§3's "Call options").

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::credentials::CallCredentials;
use crate::deadline::Deadline;
use crate::framing::WriteOptions;
use crate::metadata::Metadata;

/// Configuration recognized per call. Built with `Default` + fluent
/// `with_*` setters, in the style of the teacher's `ConnectionConfig`.
#[derive(Clone)]
pub struct CallOptions {
    pub headers: Metadata,
    pub deadline: Deadline,
    pub cancellation_token: CancellationToken,
    pub credentials: Option<Arc<dyn CallCredentials>>,
    pub write_options: WriteOptions,
}

impl Default for CallOptions {
    fn default() -> Self {
        CallOptions {
            headers: Metadata::new(),
            deadline: Deadline::none(),
            cancellation_token: CancellationToken::new(),
            credentials: None,
            write_options: WriteOptions::NONE,
        }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, headers: Metadata) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CallCredentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_write_options(mut self, write_options: WriteOptions) -> Self {
        self.write_options = write_options;
        self
    }
}
