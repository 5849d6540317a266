//! Drives one call end-to-end (§4.5): composes the request, consults
//! credentials, exchanges bytes with the transport, demultiplexes framed
//! response messages, and finalises status/trailers. This is the engine
//! underneath `CallInvoker`/`CallHandle`.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::call::options::CallOptions;
use crate::call::reader::ReaderItem;
use crate::call::state::{CallShared, CallState, TerminalOutcome};
use crate::compression::{CompressionProvider, CompressionRegistry};
use crate::credentials::{should_invoke_call_credentials, AuthContext, ChannelCredentials};
use crate::deadline::{Clock, DeadlineManager, DeadlineTick};
use crate::framing::{decode_frame_body, frame_message, parse_header, FrameHeader, HEADER_LEN};
use crate::metadata::Metadata;
use crate::method::{Marshaller, MethodDescriptor};
use crate::serialization::{DeserializationContext, SerializationContext};
use crate::status::{Status, StatusCode};
use crate::trailers::{parse_trailers, ResponseContext};
use crate::transport::{HttpBody, Transport};

/// Per-call configuration the driver needs beyond the method descriptor and
/// call options; the rest is channel-derived.
pub struct CallDriverConfig {
    pub authority: String,
    pub scheme: &'static str,
    /// The channel address's path component, if any — folded into
    /// `auth_context.service_url` (§4.7), never into the dispatched request
    /// URI.
    pub base_path: String,
    /// Resolved once by the invoker from the call's
    /// `grpc-internal-encoding-request` synthetic metadata entry, which is
    /// stripped from `options.headers` before the driver ever sees it.
    pub send_provider: Option<Arc<dyn CompressionProvider>>,
    pub send_size_limit: Option<usize>,
    pub receive_size_limit: Option<usize>,
    pub user_agent: String,
    pub channel_credentials: ChannelCredentials,
    pub unsafe_use_insecure_channel_call_credentials: bool,
    pub is_browser_host: bool,
}

/// How the single request (unary/server-streaming) or request stream
/// (client-/duplex-streaming) reaches the driver.
pub(crate) enum OutgoingRequest<Req> {
    Single(Req),
    Streamed(mpsc::UnboundedReceiver<Bytes>),
}

/// Builds the outgoing body for a streamed request direction (client- or
/// duplex-streaming): frames arrive on `receiver` as they're written and
/// are forwarded to the transport body as they come.
fn streamed_outgoing_body(receiver: mpsc::UnboundedReceiver<Bytes>) -> HttpBody {
    let stream = UnboundedReceiverStream::new(receiver).map(|bytes| Ok(Frame::data(bytes)));
    StreamBody::new(stream).boxed()
}

/// Builds the outgoing body for a single already-framed request message
/// (unary / server-streaming).
fn single_message_outgoing_body(framed: Bytes) -> HttpBody {
    let stream = tokio_stream::once(Ok(Frame::data(framed)));
    StreamBody::new(stream).boxed()
}

/// Strips a scheme's default port (443 for `https`, 80 for `http`) from
/// `authority`, leaving any other port (or an IPv6 bracketed host) intact.
/// Used to build `auth_context.service_url` (§4.7), never the dispatched
/// request URI, which always carries the authority verbatim.
fn elide_default_port(scheme: &str, authority: &str) -> String {
    let default_port = match scheme {
        "https" => 443,
        "http" => 80,
        _ => return authority.to_string(),
    };
    match authority.parse::<http::uri::Authority>() {
        Ok(parsed) if parsed.port_u16() == Some(default_port) => {
            let host = parsed.host();
            if host.contains(':') {
                format!("[{host}]")
            } else {
                host.to_string()
            }
        }
        _ => authority.to_string(),
    }
}

/// Runs the call to completion, pushing decoded response messages into
/// `response_sender` and finishing `shared` exactly once.
pub(crate) async fn drive_call<Req, Resp>(
    transport: Arc<dyn Transport>,
    shared: Arc<CallShared>,
    method: Arc<MethodDescriptor<Req, Resp>>,
    options: CallOptions,
    registry: Arc<CompressionRegistry>,
    clock: Arc<dyn Clock>,
    config: CallDriverConfig,
    outgoing: OutgoingRequest<Req>,
    response_sender: mpsc::UnboundedSender<ReaderItem<Resp>>,
) where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    if options.deadline.is_past(clock.as_ref()) {
        shared.try_finish(TerminalOutcome {
            status: Status::deadline_exceeded("Deadline exceeded before the call started."),
            trailers: Metadata::new(),
        });
        tracing::debug!(name: "DeadlineExceeded", "deadline already past at call creation");
        return;
    }

    shared.advance(CallState::SendingHeaders);

    let mut outgoing_metadata = options.headers.clone();
    let service_url = format!(
        "{}://{}{}/{}",
        config.scheme,
        elide_default_port(config.scheme, &config.authority),
        config.base_path,
        method.service()
    );
    let auth_ctx = AuthContext {
        service_url,
        method_name: method.method().to_string(),
    };

    if let Some(credentials) = options.credentials.clone() {
        if should_invoke_call_credentials(
            &config.channel_credentials,
            config.unsafe_use_insecure_channel_call_credentials,
        ) {
            tokio::select! {
                biased;
                _ = options.cancellation_token.cancelled() => {
                    finish_disposed(&shared);
                    return;
                }
                result = credentials.get_metadata(&auth_ctx, &mut outgoing_metadata) => {
                    if let Err(err) = result {
                        shared.try_finish(TerminalOutcome {
                            status: Status::with_exception(
                                StatusCode::Internal,
                                format!("Error starting gRPC call. {err}"),
                                err,
                            ),
                            trailers: Metadata::new(),
                        });
                        return;
                    }
                }
            }
        } else {
            tracing::debug!(name: "CallCredentialsNotUsed", "call credentials configured on a non-secure channel");
        }
    }

    let outgoing_body = match outgoing {
        OutgoingRequest::Single(request) => {
            let mut ctx = SerializationContext::new();
            if let Err(status) = method.request_marshaller().serialize(&request, &mut ctx) {
                shared.try_finish(TerminalOutcome { status, trailers: Metadata::new() });
                return;
            }
            let payload = ctx.take_payload().unwrap_or_default();
            let framed = match frame_message(&payload, config.send_provider.as_deref(), options.write_options, config.send_size_limit) {
                Ok(framed) => framed,
                Err(status) => {
                    shared.try_finish(TerminalOutcome { status, trailers: Metadata::new() });
                    return;
                }
            };
            single_message_outgoing_body(framed)
        }
        OutgoingRequest::Streamed(receiver) => streamed_outgoing_body(receiver),
    };

    let mut request_builder = http::Request::builder()
        .method(http::Method::POST)
        .uri(format!("{}://{}{}", config.scheme, config.authority, method.full_name()))
        .version(http::Version::HTTP_2)
        .header("content-type", "application/grpc+proto")
        .header("te", "trailers")
        .header("user-agent", config.user_agent.clone())
        .header("grpc-accept-encoding", registry.accept_encoding_header());

    if let Some(provider) = &config.send_provider {
        request_builder = request_builder.header("grpc-encoding", provider.name());
    }

    if let Some((token, clamped)) = options.deadline.encode_header(clock.as_ref()) {
        if clamped {
            tracing::warn!(
                name: "DeadlineTimerRescheduled",
                "Deadline timeout is above maximum allowed timeout of 99999999 seconds. Maximum timeout will be used."
            );
        }
        request_builder = request_builder.header("grpc-timeout", token);
    }

    for (key, value) in outgoing_metadata.to_wire_pairs() {
        request_builder = request_builder.header(key, value);
    }

    let request = match request_builder.body(outgoing_body) {
        Ok(request) => request,
        Err(err) => {
            shared.try_finish(TerminalOutcome {
                status: Status::internal(format!("failed to build request: {err}")),
                trailers: Metadata::new(),
            });
            return;
        }
    };

    shared.advance(CallState::Streaming);

    let deadline_manager = DeadlineManager::new(clock.clone(), options.deadline);

    let response = tokio::select! {
        biased;
        _ = options.cancellation_token.cancelled() => {
            finish_disposed(&shared);
            return;
        }
        _ = wait_for_deadline(&deadline_manager) => {
            shared.try_finish(TerminalOutcome {
                status: Status::deadline_exceeded("Deadline exceeded."),
                trailers: Metadata::new(),
            });
            tracing::warn!(name: "DeadlineExceeded", "call deadline exceeded");
            return;
        }
        result = transport.send(request) => result,
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            shared.try_finish(TerminalOutcome {
                status: Status::unavailable(format!("Error reading next message. {}: {err}", err.cause_type_name())),
                trailers: Metadata::new(),
            });
            return;
        }
    };

    let http_status = response.status();
    let http_version = response.version();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let response_headers = response.headers().clone();

    shared.set_response_headers(headers_to_metadata(&response_headers));

    let receive_provider = match resolve_receive_provider(&response_headers, &registry) {
        Ok(provider) => provider,
        Err(status) => {
            shared.try_finish(TerminalOutcome { status, trailers: Metadata::new() });
            return;
        }
    };

    let mut body = response.into_body();
    let mut buffer = BytesMut::new();
    let mut trailers_seen: Option<http::HeaderMap> = None;

    'read: loop {
        tokio::select! {
            biased;
            _ = options.cancellation_token.cancelled() => {
                finish_disposed(&shared);
                return;
            }
            frame = body.frame() => {
                match frame {
                    Some(Ok(frame)) => {
                        if let Some(data) = frame.data_ref() {
                            buffer.extend_from_slice(data);
                            if let Err(status) = drain_frames(
                                &mut buffer,
                                receive_provider.as_ref(),
                                config.receive_size_limit,
                                method.as_ref(),
                                &response_sender,
                            ) {
                                shared.try_finish(TerminalOutcome { status, trailers: Metadata::new() });
                                return;
                            }
                        } else if let Ok(trailers) = frame.into_trailers() {
                            trailers_seen = Some(trailers);
                        }
                    }
                    Some(Err(err)) => {
                        let _ = response_sender.send(Err(Status::unavailable(format!(
                            "Error reading next message. {}: {err}",
                            err.cause_type_name()
                        ))));
                        break 'read;
                    }
                    None => break 'read,
                }
            }
        }
    }

    shared.advance(CallState::TrailersRead);

    let source = trailers_seen.unwrap_or(response_headers);
    let response_ctx = ResponseContext {
        http_status,
        http_version,
        content_type,
        is_browser_host: config.is_browser_host,
    };
    let parsed = parse_trailers(&source, &response_ctx, |detail| {
        tracing::warn!(name: "ErrorParsingTrailers", detail);
    });

    shared.try_finish(TerminalOutcome {
        status: parsed.status,
        trailers: parsed.metadata,
    });
}

fn finish_disposed(shared: &CallShared) {
    shared.try_finish(TerminalOutcome {
        status: Status::cancelled("gRPC call disposed."),
        trailers: Metadata::new(),
    });
}

async fn wait_for_deadline(manager: &DeadlineManager) {
    loop {
        tokio::time::sleep_until(manager.next_arm_instant()).await;
        match manager.on_timer_fired() {
            DeadlineTick::Expired => return,
            DeadlineTick::Rescheduled { next_wait } => {
                tracing::debug!(name: "DeadlineTimerRescheduled", wait_ms = next_wait.as_millis() as u64);
            }
        }
    }
}

fn headers_to_metadata(headers: &http::HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            if let Some((key, parsed)) = Metadata::from_wire_pair(name.as_str(), value) {
                metadata.merge(Metadata::from_iter([(key, parsed)]));
            }
        }
    }
    metadata
}

/// Resolves the provider named by the response's `grpc-encoding` header, if
/// any. `None` means the response is uncompressed.
fn resolve_receive_provider(
    headers: &http::HeaderMap,
    registry: &CompressionRegistry,
) -> Result<Option<Arc<dyn CompressionProvider>>, Status> {
    match headers.get("grpc-encoding").and_then(|v| v.to_str().ok()) {
        Some(name) if name != "identity" => registry.require_for_receive(name).map(Some),
        _ => Ok(None),
    }
}

fn drain_frames<Req, Resp>(
    buffer: &mut BytesMut,
    receive_provider: Option<&Arc<dyn CompressionProvider>>,
    receive_size_limit: Option<usize>,
    method: &MethodDescriptor<Req, Resp>,
    response_sender: &mpsc::UnboundedSender<ReaderItem<Resp>>,
) -> Result<(), Status> {
    loop {
        if buffer.len() < HEADER_LEN {
            return Ok(());
        }
        let header: FrameHeader = parse_header(&buffer[..HEADER_LEN]);

        if let Some(limit) = receive_size_limit {
            if header.length as usize > limit {
                return Err(Status::resource_exhausted(
                    "Received message exceeds the maximum configured message size.",
                ));
            }
        }

        let total = HEADER_LEN + header.length as usize;
        if buffer.len() < total {
            return Ok(());
        }

        let body = buffer.split_to(total).split_off(HEADER_LEN).freeze();
        let receive_encoding = receive_provider.map(|p| p.as_ref());
        let decoded = decode_frame_body(header, body, receive_encoding)?;

        let mut de_ctx = DeserializationContext::new(decoded);
        let message = method.response_marshaller().deserialize(&mut de_ctx)?;
        let _ = response_sender.send(Ok(message));
    }
}
