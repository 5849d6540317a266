//! The serialization/deserialization contexts a `Marshaller<T>` drives
//! (§4.12).

use bytes::{BufMut, Bytes, BytesMut};

use crate::status::Status;

/// A reusable, stateful buffer a marshaller writes into, either via a
/// direct byte span ([`SerializationContext::complete`]) or incrementally
/// via [`SerializationContext::buffer_writer`].
#[derive(Default)]
pub struct SerializationContext {
    payload: Option<Bytes>,
    max_send_message_size: Option<usize>,
}

impl SerializationContext {
    pub fn new() -> Self {
        SerializationContext::default()
    }

    pub fn with_max_send_message_size(max: usize) -> Self {
        SerializationContext {
            payload: None,
            max_send_message_size: Some(max),
        }
    }

    /// Hands the marshaller a growable buffer pre-sized to `expected_len`.
    /// The marshaller writes into it directly, then calls
    /// [`SerializationContext::complete_from_buffer`].
    pub fn buffer_writer(&mut self, expected_len: usize) -> BytesMut {
        BytesMut::with_capacity(expected_len)
    }

    /// Completes the context from a direct byte span, matching the
    /// `complete(bytes)` entry point in the base design.
    pub fn complete(&mut self, bytes: impl Into<Bytes>) -> Result<(), Status> {
        let bytes = bytes.into();
        self.check_size(bytes.len())?;
        self.payload = Some(bytes);
        Ok(())
    }

    /// Completes the context from a buffer obtained via
    /// [`SerializationContext::buffer_writer`]. Size limits are enforced by
    /// the framing codec downstream, which already takes a
    /// `send_size_limit`.
    pub fn complete_from_buffer(&mut self, buffer: BytesMut) {
        self.payload = Some(buffer.freeze());
    }

    fn check_size(&self, len: usize) -> Result<(), Status> {
        if let Some(limit) = self.max_send_message_size {
            if len > limit {
                return Err(Status::resource_exhausted(
                    "Sending message exceeds the maximum configured message size.",
                ));
            }
        }
        Ok(())
    }

    /// Takes the completed payload, leaving the context empty.
    pub fn take_payload(&mut self) -> Option<Bytes> {
        self.payload.take()
    }

    pub fn reset(&mut self) {
        self.payload = None;
    }
}

/// The read-side counterpart: wraps one already-decoded message payload for
/// a marshaller's `deserialize`.
pub struct DeserializationContext {
    payload: Bytes,
}

impl DeserializationContext {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        DeserializationContext {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}
