//! Method descriptors and the `Marshaller<T>` serialization capability
//! (§3).

use std::sync::Arc;

use crate::serialization::{DeserializationContext, SerializationContext};
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ClientStreaming,
    ServerStreaming,
    DuplexStreaming,
}

impl MethodKind {
    pub fn requests_are_streamed(self) -> bool {
        matches!(self, MethodKind::ClientStreaming | MethodKind::DuplexStreaming)
    }

    pub fn responses_are_streamed(self) -> bool {
        matches!(self, MethodKind::ServerStreaming | MethodKind::DuplexStreaming)
    }
}

/// Serializer/deserializer capability for one concrete message type,
/// type-erased below the invoker by the engine (§9's design notes).
pub trait Marshaller<T>: Send + Sync {
    fn serialize(&self, value: &T, ctx: &mut SerializationContext) -> Result<(), Status>;
    fn deserialize(&self, ctx: &mut DeserializationContext) -> Result<T, Status>;
}

/// The canonical `Marshaller<T>` for `prost::Message` types.
pub struct ProstMarshaller<T>(std::marker::PhantomData<fn() -> T>);

impl<T> ProstMarshaller<T> {
    pub fn new() -> Self {
        ProstMarshaller(std::marker::PhantomData)
    }
}

impl<T> Default for ProstMarshaller<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Marshaller<T> for ProstMarshaller<T>
where
    T: prost::Message + Default,
{
    fn serialize(&self, value: &T, ctx: &mut SerializationContext) -> Result<(), Status> {
        let mut buf = ctx.buffer_writer(value.encoded_len());
        value
            .encode(&mut buf)
            .map_err(|e| Status::internal(format!("failed to encode request: {e}")))?;
        ctx.complete_from_buffer(buf);
        Ok(())
    }

    fn deserialize(&self, ctx: &mut DeserializationContext) -> Result<T, Status> {
        T::decode(ctx.payload()).map_err(|e| Status::internal(format!("failed to decode response message: {e}")))
    }
}

/// Identifies a call statically: service name, method name, kind, and the
/// two marshallers. `full_name` is derived once at construction. The
/// marshallers are `Arc`-held so a [`crate::call::writer::RequestStreamWriter`]
/// can hold its own independent clone for the life of the call.
pub struct MethodDescriptor<Req, Resp> {
    service: String,
    method: String,
    kind: MethodKind,
    full_name: String,
    request_marshaller: Arc<dyn Marshaller<Req>>,
    response_marshaller: Arc<dyn Marshaller<Resp>>,
}

impl<Req, Resp> MethodDescriptor<Req, Resp> {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        kind: MethodKind,
        request_marshaller: Arc<dyn Marshaller<Req>>,
        response_marshaller: Arc<dyn Marshaller<Resp>>,
    ) -> Self {
        let service = service.into();
        let method = method.into();
        let full_name = format!("/{service}/{method}");
        MethodDescriptor {
            service,
            method,
            kind,
            full_name,
            request_marshaller,
            response_marshaller,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn request_marshaller(&self) -> &dyn Marshaller<Req> {
        self.request_marshaller.as_ref()
    }

    pub fn response_marshaller(&self) -> &dyn Marshaller<Resp> {
        self.response_marshaller.as_ref()
    }

    /// An independently-owned clone of the request marshaller, for a
    /// [`crate::call::writer::RequestStreamWriter`] that outlives the
    /// borrow of `self`.
    pub fn request_marshaller_handle(&self) -> Arc<dyn Marshaller<Req>> {
        self.request_marshaller.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(string, tag = "1")]
        name: String,
    }

    #[test]
    fn full_name_is_slash_service_slash_method() {
        let desc = MethodDescriptor::new(
            "greeter.Greeter",
            "SayHello",
            MethodKind::Unary,
            Arc::new(ProstMarshaller::<Ping>::new()),
            Arc::new(ProstMarshaller::<Ping>::new()),
        );
        assert_eq!(desc.full_name(), "/greeter.Greeter/SayHello");
    }

    #[test]
    fn prost_marshaller_round_trips() {
        let marshaller = ProstMarshaller::<Ping>::new();
        let msg = Ping { name: "hello".to_string() };
        let mut ser_ctx = SerializationContext::new();
        marshaller.serialize(&msg, &mut ser_ctx).unwrap();
        let payload = ser_ctx.take_payload().unwrap();

        let mut de_ctx = DeserializationContext::new(payload);
        let restored: Ping = marshaller.deserialize(&mut de_ctx).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn kind_streaming_flags() {
        assert!(!MethodKind::Unary.requests_are_streamed());
        assert!(!MethodKind::Unary.responses_are_streamed());
        assert!(MethodKind::ClientStreaming.requests_are_streamed());
        assert!(!MethodKind::ClientStreaming.responses_are_streamed());
        assert!(!MethodKind::ServerStreaming.requests_are_streamed());
        assert!(MethodKind::ServerStreaming.responses_are_streamed());
        assert!(MethodKind::DuplexStreaming.requests_are_streamed());
        assert!(MethodKind::DuplexStreaming.responses_are_streamed());
    }
}
