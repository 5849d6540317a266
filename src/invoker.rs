//! The call invoker (§4.8, §6): dispatches by method kind, applies the
//! configured interceptor chain to outgoing metadata, resolves the call's
//! chosen send encoding, and spawns the driver that runs the call.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::call::driver::{drive_call, CallDriverConfig, OutgoingRequest};
use crate::call::handle::CallHandle;
use crate::call::options::CallOptions;
use crate::call::reader::ResponseStreamReader;
use crate::call::state::CallShared;
use crate::call::writer::RequestStreamWriter;
use crate::channel::Channel;
use crate::compression::ENCODING_REQUEST_METADATA_KEY;
use crate::error::RpcError;
use crate::interceptor::{InterceptorChain, InterceptorContext};
use crate::method::MethodDescriptor;

/// Dispatches typed calls against one [`Channel`], running every call's
/// outgoing metadata through an optional interceptor chain before the
/// request ever reaches the wire.
pub struct CallInvoker {
    channel: Arc<Channel>,
    interceptors: InterceptorChain,
}

impl CallInvoker {
    pub fn new(channel: Arc<Channel>) -> Self {
        CallInvoker {
            channel,
            interceptors: InterceptorChain::new(),
        }
    }

    pub fn with_interceptors(channel: Arc<Channel>, interceptors: InterceptorChain) -> Self {
        CallInvoker { channel, interceptors }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// One request in, exactly one response out.
    pub fn unary_call<Req, Resp>(
        &self,
        method: Arc<MethodDescriptor<Req, Resp>>,
        options: CallOptions,
        request: Req,
    ) -> Result<CallHandle<Req, Resp>, RpcError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        self.start(method, options, OutgoingRequest::Single(request), None)
    }

    /// A writer the caller drives to completion; exactly one response out.
    pub fn client_streaming_call<Req, Resp>(
        &self,
        method: Arc<MethodDescriptor<Req, Resp>>,
        options: CallOptions,
    ) -> Result<CallHandle<Req, Resp>, RpcError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.start(method, options, OutgoingRequest::Streamed(receiver), Some(sender))
    }

    /// One request in, a reader the caller drains for as many responses as
    /// the server sends.
    pub fn server_streaming_call<Req, Resp>(
        &self,
        method: Arc<MethodDescriptor<Req, Resp>>,
        options: CallOptions,
        request: Req,
    ) -> Result<CallHandle<Req, Resp>, RpcError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        self.start(method, options, OutgoingRequest::Single(request), None)
    }

    /// Both a writer and a reader the caller drives independently.
    pub fn duplex_streaming_call<Req, Resp>(
        &self,
        method: Arc<MethodDescriptor<Req, Resp>>,
        options: CallOptions,
    ) -> Result<CallHandle<Req, Resp>, RpcError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.start(method, options, OutgoingRequest::Streamed(receiver), Some(sender))
    }

    /// Common setup for all four call shapes: reserves a call slot,
    /// applies interceptors, resolves send compression, builds the
    /// reader/writer pair, and spawns the driver. The response reader is
    /// always constructed — unary and client-streaming calls enforce
    /// "exactly one message" through the same machinery (§4.5); only
    /// which accessor method on `CallHandle` a caller is expected to use
    /// differs by shape.
    fn start<Req, Resp>(
        &self,
        method: Arc<MethodDescriptor<Req, Resp>>,
        mut options: CallOptions,
        outgoing: OutgoingRequest<Req>,
        write_sender: Option<mpsc::UnboundedSender<Bytes>>,
    ) -> Result<CallHandle<Req, Resp>, RpcError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let call_id = self
            .channel
            .begin_call(options.credentials.is_some(), options.cancellation_token.clone())?;

        let send_provider = match self.prepare(&mut options) {
            Ok(provider) => provider,
            Err(err) => {
                self.channel.release_call(call_id);
                return Err(err);
            }
        };

        let shared = CallShared::new();
        let cancellation_token = options.cancellation_token.clone();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let reader = Arc::new(ResponseStreamReader::new(response_rx, shared.clone()));

        let channel_options = self.channel.options();
        let writer = write_sender.map(|sender| {
            Arc::new(RequestStreamWriter::new(
                sender,
                method.request_marshaller_handle(),
                send_provider.clone(),
                channel_options.max_send_message_size,
                options.write_options,
            ))
        });

        let config = CallDriverConfig {
            authority: self.channel.authority().to_string(),
            scheme: self.channel.scheme(),
            base_path: self.channel.base_path().to_string(),
            send_provider,
            send_size_limit: channel_options.max_send_message_size,
            receive_size_limit: channel_options.max_receive_message_size,
            user_agent: self.channel.user_agent().to_string(),
            channel_credentials: channel_options.credentials.clone(),
            unsafe_use_insecure_channel_call_credentials: channel_options.unsafe_use_insecure_channel_call_credentials,
            is_browser_host: self.channel.is_browser_host(),
        };

        let transport = self.channel.transport();
        let registry = self.channel.compression_providers();
        let clock = self.channel.clock();
        let channel = self.channel.clone();

        let driver_shared = shared.clone();
        let driver_options = options.clone();
        let driver_task = tokio::spawn(async move {
            drive_call(transport, driver_shared, method, driver_options, registry, clock, config, outgoing, response_tx).await;
            channel.release_call(call_id);
        });

        Ok(CallHandle::new(shared, cancellation_token, writer, Some(reader), driver_task))
    }

    /// Runs the interceptor chain over the call's outgoing metadata, then
    /// pulls out and resolves the `grpc-internal-encoding-request`
    /// synthetic entry (§4.2), which never reaches the wire.
    fn prepare(
        &self,
        options: &mut CallOptions,
    ) -> Result<Option<Arc<dyn crate::compression::CompressionProvider>>, RpcError> {
        let ctx = InterceptorContext { metadata: std::mem::take(&mut options.headers) };
        let ctx = self
            .interceptors
            .apply(ctx)
            .map_err(|status| RpcError::Configuration(format!("an interceptor rejected the call: {status}")))?;
        options.headers = ctx.metadata;

        match options.headers.take_ascii(ENCODING_REQUEST_METADATA_KEY) {
            Some(name) => {
                let registry = self.channel.compression_providers();
                registry
                    .require_for_send(&name)
                    .map(Some)
                    .map_err(|status| RpcError::Configuration(status.detail().to_string()))
            }
            None => Ok(None),
        }
    }
}
