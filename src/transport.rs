//! The `Transport` capability (§1/§6): the HTTP/2 client collaborator this
//! crate treats as out-of-scope, plus the one production implementation
//! over `tonic::transport::Channel`.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use tower::ServiceExt;

/// A transport-level failure: connection refused, DNS failure, stream
/// reset, and the like. Distinct from a gRPC `Status` — this is what the
/// call engine maps into `Unavailable`/`Internal` per §7.
#[derive(Debug)]
pub struct TransportError {
    cause: Box<dyn std::error::Error + Send + Sync>,
    cause_type: &'static str,
}

impl TransportError {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        TransportError {
            cause: Box::new(err),
            cause_type: std::any::type_name::<E>(),
        }
    }

    /// The wrapped cause's unqualified type name, e.g. `ConnectionRefused`
    /// out of a fully-qualified `some::module::ConnectionRefused` — the
    /// `<CauseType>` half of the `"<CauseType>: <msg>"` detail shape used
    /// when a transport error is surfaced on a terminal `Status`.
    pub fn cause_type_name(&self) -> &'static str {
        self.cause_type.rsplit("::").next().unwrap_or(self.cause_type)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

pub type HttpBody = BoxBody<Bytes, TransportError>;

/// The underlying HTTP/2 client capability. Out of scope per §1: TLS
/// certificate configuration, connection pooling internals, and name
/// resolution are this trait's business, not the call engine's.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: http::Request<HttpBody>) -> Result<http::Response<HttpBody>, TransportError>;
}

/// Adapts `tonic::transport::Channel` (itself a `tower::Service`) to the
/// `Transport` trait, translating `Service::call` futures into the trait's
/// async method.
#[derive(Clone)]
pub struct TonicTransport {
    channel: tonic::transport::Channel,
}

impl TonicTransport {
    pub fn new(channel: tonic::transport::Channel) -> Self {
        TonicTransport { channel }
    }
}

#[async_trait]
impl Transport for TonicTransport {
    async fn send(&self, request: http::Request<HttpBody>) -> Result<http::Response<HttpBody>, TransportError> {
        let channel = self.channel.clone();
        let response = channel
            .oneshot(request)
            .await
            .map_err(|e| TransportError::new(ChannelCallError(e.to_string())))?;
        Ok(response.map(|body| {
            use http_body_util::BodyExt;
            body.map_err(|e| TransportError::new(ChannelCallError(e.to_string())))
                .boxed()
        }))
    }
}

#[derive(Debug)]
struct ChannelCallError(String);

impl fmt::Display for ChannelCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ChannelCallError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_displays_inner_message() {
        let err = TransportError::new(ChannelCallError("connection refused".to_string()));
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn transport_error_exposes_unqualified_cause_type_name() {
        let err = TransportError::new(ChannelCallError("boom".to_string()));
        assert_eq!(err.cause_type_name(), "ChannelCallError");
    }
}
