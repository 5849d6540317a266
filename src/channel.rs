//! The channel: a validated, reusable binding to one address, owning the
//! transport, compression registry, and the set of calls it has started
//! (§4.9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::compression::CompressionRegistry;
use crate::credentials::{validate_credentials_combination, ChannelCredentials};
use crate::deadline::{Clock, SystemClock};
use crate::error::RpcError;
use crate::host_platform::{HostPlatform, NativeHostPlatform};
use crate::transport::Transport;
use crate::user_agent::cached_user_agent;

const DEFAULT_MAX_RECEIVE_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Opaque per-method call configuration (retry policy, hedging, timeouts)
/// keyed by service/method. Parsing and application are out of scope here;
/// the channel only carries it through for a future interceptor or
/// transport layer to consult.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig(pub serde_json::Value);

/// Construction-time configuration for a [`Channel`] (§3's "Channel
/// options").
#[derive(Clone)]
pub struct ChannelOptions {
    pub credentials: ChannelCredentials,
    pub max_send_message_size: Option<usize>,
    pub max_receive_message_size: Option<usize>,
    pub compression_providers: Arc<CompressionRegistry>,
    pub throw_operation_canceled_on_cancellation: bool,
    pub unsafe_use_insecure_channel_call_credentials: bool,
    pub dispose_http_client: bool,
    pub service_config: Option<ServiceConfig>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions {
            credentials: ChannelCredentials::Insecure,
            max_send_message_size: None,
            max_receive_message_size: Some(DEFAULT_MAX_RECEIVE_MESSAGE_SIZE),
            compression_providers: Arc::new(CompressionRegistry::with_defaults()),
            throw_operation_canceled_on_cancellation: false,
            unsafe_use_insecure_channel_call_credentials: false,
            dispose_http_client: true,
            service_config: None,
        }
    }
}

/// An address resolved into the pieces the call driver needs: scheme,
/// authority, and a `base_path` that is never used for call dispatch (the
/// wire request always targets `/Service/Method` directly) but does feed
/// into `auth_context.service_url` (§4.7).
#[derive(Debug, Clone)]
pub(crate) struct ParsedAddress {
    pub scheme: String,
    pub authority: String,
    pub base_path: String,
    pub has_unused_path: bool,
}

/// Parses and validates a channel address. Only absolute `scheme://host`
/// URIs are supported; a path or query is accepted but never dispatched on
/// (§4.9).
pub(crate) fn parse_address(raw: &str) -> Result<ParsedAddress, RpcError> {
    let uri: http::Uri = raw
        .parse()
        .map_err(|e| RpcError::InvalidAddress(format!("Address '{raw}' could not be parsed: {e}")))?;

    if uri.host().is_none() {
        return Err(RpcError::InvalidAddress(format!(
            "Address '{raw}' doesn't have a host. Only absolute URIs with a scheme and host are supported."
        )));
    }

    let scheme = uri
        .scheme_str()
        .ok_or_else(|| RpcError::InvalidAddress(format!("Address '{raw}' doesn't have a scheme.")))?
        .to_string();

    let base_path = if matches!(uri.path(), "" | "/") {
        String::new()
    } else {
        uri.path().trim_end_matches('/').to_string()
    };
    let has_unused_path = uri.query().is_some() || !base_path.is_empty();

    Ok(ParsedAddress {
        scheme,
        authority: uri.authority().expect("host present implies authority").to_string(),
        base_path,
        has_unused_path,
    })
}

fn validate_scheme_credentials(scheme: &str, credentials: &ChannelCredentials) -> Result<(), RpcError> {
    match (scheme, credentials.is_secure()) {
        ("https", false) => Err(RpcError::Configuration(format!(
            "Address scheme is 'https' but the channel credentials are insecure."
        ))),
        ("http", true) => Err(RpcError::Configuration(format!(
            "Address scheme is 'http' but the channel credentials are secure."
        ))),
        _ => Ok(()),
    }
}

/// A reusable, validated binding to one address. Tracks every call it has
/// started — keyed by id to that call's own [`CancellationToken`] — so
/// [`Channel::dispose`] can fan cancellation out to them (§4.9). Cancelling
/// a call's token here is the same token `drive_call` selects on, so
/// cancelling it from here finishes that call exactly as if the caller had
/// disposed its own `CallHandle`.
pub struct Channel {
    transport: Arc<dyn Transport>,
    options: ChannelOptions,
    address: ParsedAddress,
    clock: Arc<dyn Clock>,
    host_platform: Arc<dyn HostPlatform>,
    user_agent: String,
    active_calls: std::sync::Mutex<HashMap<u64, CancellationToken>>,
    next_call_id: AtomicU64,
    disposed: AtomicBool,
}

impl Channel {
    /// Builds a channel bound to `address`, validating the address itself
    /// and its compatibility with `options.credentials`.
    pub fn new(address: &str, transport: Arc<dyn Transport>, options: ChannelOptions) -> Result<Arc<Self>, RpcError> {
        let parsed = parse_address(address)?;
        validate_scheme_credentials(&parsed.scheme, &options.credentials)?;

        if parsed.has_unused_path {
            tracing::debug!(
                name: "AddressPathUnused",
                address,
                "the path/query component of a channel address is never used for call dispatch"
            );
        }

        Ok(Arc::new(Channel {
            transport,
            options,
            address: parsed,
            clock: Arc::new(SystemClock),
            host_platform: Arc::new(NativeHostPlatform),
            user_agent: cached_user_agent().to_string(),
            active_calls: std::sync::Mutex::new(HashMap::new()),
            next_call_id: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }))
    }

    pub fn is_secure(&self) -> bool {
        self.options.credentials.is_secure()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn scheme(&self) -> &'static str {
        if self.is_secure() {
            "https"
        } else {
            "http"
        }
    }

    pub(crate) fn authority(&self) -> &str {
        &self.address.authority
    }

    /// The address's path component, trimmed of a trailing slash, or empty
    /// if none — feeds `auth_context.service_url`, never call dispatch.
    pub(crate) fn base_path(&self) -> &str {
        &self.address.base_path
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub(crate) fn compression_providers(&self) -> Arc<CompressionRegistry> {
        self.options.compression_providers.clone()
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub(crate) fn is_browser_host(&self) -> bool {
        self.host_platform.is_browser()
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn options(&self) -> &ChannelOptions {
        &self.options
    }

    /// Validates the channel isn't disposed and the call's credentials
    /// combination is legal, then registers `cancellation_token` under a
    /// fresh call id so [`Channel::dispose`] can cancel it later. Returns
    /// the id the caller must later release with
    /// [`Channel::release_call`].
    pub(crate) fn begin_call(
        &self,
        has_call_credentials: bool,
        cancellation_token: CancellationToken,
    ) -> Result<u64, RpcError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RpcError::AlreadyDisposed);
        }
        validate_credentials_combination(
            &self.options.credentials,
            has_call_credentials,
            self.options.unsafe_use_insecure_channel_call_credentials,
        )?;

        let id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        self.active_calls.lock().unwrap().insert(id, cancellation_token);
        Ok(id)
    }

    pub(crate) fn release_call(&self, id: u64) {
        self.active_calls.lock().unwrap().remove(&id);
    }

    /// Cancels every tracked in-flight call's token — the same token
    /// `drive_call` races against its deadline/transport futures — so each
    /// finishes with `Cancelled`/`"gRPC call disposed."`, then marks the
    /// channel unusable for further calls. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let calls = std::mem::take(&mut *self.active_calls.lock().unwrap());
        for (_, token) in calls {
            token.cancel();
        }
    }

    pub fn owns_transport_disposal(&self) -> bool {
        self.options.dispose_http_client
    }
}
