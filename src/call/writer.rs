//! The request stream writer (§4.6): serializes, frames, and forwards
//! messages onto the outgoing transport body, honouring write options and
//! mutual exclusion between writes.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::compression::CompressionProvider;
use crate::error::{CallError, RpcError};
use crate::framing::{frame_message, WriteOptions};
use crate::method::Marshaller;
use crate::serialization::SerializationContext;
use std::sync::Arc;

/// Writes typed request messages. `write` calls are mutually exclusive: a
/// second overlapping write is a contract violation, not queued.
pub struct RequestStreamWriter<Req> {
    marshaller: Arc<dyn Marshaller<Req>>,
    send_encoding: Option<Arc<dyn CompressionProvider>>,
    send_size_limit: Option<usize>,
    default_write_options: WriteOptions,
    sender: std::sync::Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    writing: AtomicBool,
}

impl<Req> RequestStreamWriter<Req> {
    pub(crate) fn new(
        sender: mpsc::UnboundedSender<Bytes>,
        marshaller: Arc<dyn Marshaller<Req>>,
        send_encoding: Option<Arc<dyn CompressionProvider>>,
        send_size_limit: Option<usize>,
        default_write_options: WriteOptions,
    ) -> Self {
        RequestStreamWriter {
            marshaller,
            send_encoding,
            send_size_limit,
            default_write_options,
            sender: std::sync::Mutex::new(Some(sender)),
            writing: AtomicBool::new(false),
        }
    }

    /// Writes one message using the call's default write options.
    pub async fn write(&self, message: &Req) -> Result<(), CallError> {
        self.write_with_options(message, self.default_write_options).await
    }

    /// Writes one message, overriding the call's default write options for
    /// just this message (notably `NO_COMPRESS`).
    pub async fn write_with_options(&self, message: &Req, write_options: WriteOptions) -> Result<(), CallError> {
        if self.writing.swap(true, Ordering::SeqCst) {
            return Err(CallError::Local(RpcError::ConcurrentWrite));
        }
        let result = self.do_write(message, write_options);
        self.writing.store(false, Ordering::SeqCst);
        result
    }

    fn do_write(&self, message: &Req, write_options: WriteOptions) -> Result<(), CallError> {
        let guard = self.sender.lock().unwrap();
        let sender = guard.as_ref().ok_or(CallError::Local(RpcError::AlreadyDisposed))?;

        let mut ctx = SerializationContext::new();
        self.marshaller.serialize(message, &mut ctx).map_err(CallError::Status)?;
        let payload = ctx.take_payload().unwrap_or_default();

        let framed = frame_message(&payload, self.send_encoding.as_deref(), write_options, self.send_size_limit)
            .map_err(CallError::Status)?;

        sender.send(framed).map_err(|_| CallError::Local(RpcError::AlreadyDisposed))?;
        Ok(())
    }

    /// Closes the outgoing body; no further writes are accepted. Idempotent.
    pub fn complete(&self) {
        let mut guard = self.sender.lock().unwrap();
        *guard = None;
    }

    pub fn is_complete(&self) -> bool {
        self.sender.lock().unwrap().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::ProstMarshaller;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(string, tag = "1")]
        name: String,
    }

    fn writer() -> (RequestStreamWriter<Ping>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = RequestStreamWriter::new(
            tx,
            Arc::new(ProstMarshaller::<Ping>::new()),
            None,
            None,
            WriteOptions::NONE,
        );
        (writer, rx)
    }

    #[tokio::test]
    async fn write_frames_and_forwards_the_message() {
        let (writer, mut rx) = writer();
        writer.write(&Ping { name: "hi".to_string() }).await.unwrap();
        let framed = rx.recv().await.unwrap();
        assert_eq!(framed[0], 0); // uncompressed: no encoding configured
    }

    #[tokio::test]
    async fn complete_is_idempotent_and_rejects_further_writes() {
        let (writer, _rx) = writer();
        writer.complete();
        writer.complete();
        let err = writer.write(&Ping { name: "late".to_string() }).await.unwrap_err();
        assert!(matches!(err, CallError::Local(RpcError::AlreadyDisposed)));
    }

    #[tokio::test]
    async fn overlapping_writes_are_rejected() {
        let (writer, _rx) = writer();
        writer.writing.store(true, Ordering::SeqCst);
        let err = writer.write(&Ping { name: "x".to_string() }).await.unwrap_err();
        assert!(matches!(err, CallError::Local(RpcError::ConcurrentWrite)));
    }
}
