//! A client-side gRPC-over-HTTP/2 call engine over a generic `Transport`.
//!
//! This crate implements the wire codec, compression negotiation, deadline
//! handling, credential injection, interceptor composition, and the call
//! state machine underneath the four canonical call shapes — unary,
//! client-streaming, server-streaming, and duplex-streaming. It does not
//! implement an HTTP/2 client, a protobuf code generator, or a server; the
//! [`transport::Transport`] and [`method::Marshaller`] traits are the seams
//! where those plug in.

pub mod call;
pub mod channel;
pub mod compression;
pub mod credentials;
pub mod deadline;
pub mod error;
pub mod framing;
pub mod host_platform;
pub mod interceptor;
pub mod invoker;
pub mod metadata;
pub mod method;
pub mod serialization;
pub mod status;
pub mod timeout;
pub mod trailers;
pub mod transport;
pub mod user_agent;

pub use call::{CallHandle, CallOptions};
pub use channel::{Channel, ChannelOptions};
pub use error::{CallError, RpcError};
pub use invoker::CallInvoker;
pub use method::{MethodDescriptor, MethodKind};
pub use metadata::{Metadata, MetadataValue};
pub use status::{Status, StatusCode};
pub use transport::{Transport, TransportError};
