//! The public call handle (§3's "Call handle (async)"): the surface a user
//! actually programs against, regardless of method kind.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::call::reader::ResponseStreamReader;
use crate::call::state::CallShared;
use crate::call::writer::RequestStreamWriter;
use crate::error::{CallError, RpcError};
use crate::metadata::Metadata;
use crate::status::Status;

/// One in-flight (or finished) RPC. Unary/client-streaming calls use
/// [`CallHandle::response`]; server-/duplex-streaming calls use
/// [`CallHandle::response_stream`]. Client-/duplex-streaming calls expose
/// [`CallHandle::request_stream`].
pub struct CallHandle<Req, Resp> {
    shared: Arc<CallShared>,
    cancellation_token: CancellationToken,
    writer: Option<Arc<RequestStreamWriter<Req>>>,
    reader: Option<Arc<ResponseStreamReader<Resp>>>,
    driver_task: Option<tokio::task::JoinHandle<()>>,
}

impl<Req, Resp> CallHandle<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub(crate) fn new(
        shared: Arc<CallShared>,
        cancellation_token: CancellationToken,
        writer: Option<Arc<RequestStreamWriter<Req>>>,
        reader: Option<Arc<ResponseStreamReader<Resp>>>,
        driver_task: tokio::task::JoinHandle<()>,
    ) -> Self {
        CallHandle {
            shared,
            cancellation_token,
            writer,
            reader,
            driver_task: Some(driver_task),
        }
    }

    /// The request writer, for client-streaming and duplex-streaming calls.
    pub fn request_stream(&self) -> &RequestStreamWriter<Req> {
        self.writer.as_ref().expect("request_stream() is only valid for streamed-request calls")
    }

    /// The response reader, for server-streaming and duplex-streaming
    /// calls.
    pub fn response_stream(&self) -> &ResponseStreamReader<Resp> {
        self.reader.as_ref().expect("response_stream() is only valid for streamed-response calls")
    }

    /// The single terminal response, for unary and client-streaming calls.
    /// Enforces the "exactly one message" strictness from §4.5: zero or
    /// more than one response message is `Internal`.
    pub async fn response(&self) -> Result<Resp, CallError> {
        let reader = self.reader.as_ref().expect("response() is only valid for single-response calls");

        if !reader.move_next(&self.cancellation_token).await? {
            return Err(CallError::Status(Status::internal("Failed to deserialize response message.")));
        }
        let message = reader.take_current().expect("move_next returned true");

        if reader.move_next(&self.cancellation_token).await.unwrap_or(false) {
            return Err(CallError::Status(Status::internal("Failed to deserialize response message.")));
        }

        Ok(message)
    }

    /// Resolves once response headers arrive (or, for a trailers-only
    /// response, alongside the finishing status).
    pub async fn response_headers(&self) -> Metadata {
        (*self.shared.wait_response_headers().await).clone()
    }

    /// Fails with a well-known error before the call reaches a terminal
    /// state; succeeds with the frozen status afterward (§7).
    pub fn get_status(&self) -> Result<Status, RpcError> {
        self.shared
            .terminal_outcome()
            .map(|outcome| outcome.status.clone())
            .ok_or(RpcError::NotTerminal("Unable to get the status because the call is not complete."))
    }

    /// Fails with a well-known error before the call reaches a terminal
    /// state; succeeds with the frozen trailers afterward (§7).
    pub fn get_trailers(&self) -> Result<Metadata, RpcError> {
        self.shared
            .terminal_outcome()
            .map(|outcome| outcome.trailers.clone())
            .ok_or(RpcError::NotTerminal(
                "Can't get the call trailers because the call has not completed successfully.",
            ))
    }

    /// Idempotently cancels the underlying transport exchange (and any
    /// in-flight credentials task), transitioning the call to terminal
    /// `Cancelled` with detail `"gRPC call disposed."`.
    pub fn dispose(&self) {
        self.cancellation_token.cancel();
        self.shared.try_finish(crate::call::state::TerminalOutcome {
            status: Status::cancelled("gRPC call disposed."),
            trailers: Metadata::new(),
        });
    }
}

impl<Req, Resp> Drop for CallHandle<Req, Resp> {
    fn drop(&mut self) {
        if let Some(task) = self.driver_task.take() {
            task.abort();
        }
    }
}
