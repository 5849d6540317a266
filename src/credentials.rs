//! Call and channel credentials (§4.7).

use async_trait::async_trait;

use crate::error::RpcError;
use crate::metadata::Metadata;

/// Context handed to a credentials provider: the normalized service URL and
/// the method's short name.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub service_url: String,
    pub method_name: String,
}

/// Per-call metadata producer, run after dispatch and before headers are
/// flushed (§4.5, §4.7).
#[async_trait]
pub trait CallCredentials: Send + Sync {
    async fn get_metadata(&self, ctx: &AuthContext, metadata: &mut Metadata) -> Result<(), RpcError>;
}

/// Runs a sequence of [`CallCredentials`] in insertion order, accumulating
/// into one [`Metadata`].
pub struct CompositeCallCredentials {
    providers: Vec<std::sync::Arc<dyn CallCredentials>>,
}

impl CompositeCallCredentials {
    pub fn new(providers: Vec<std::sync::Arc<dyn CallCredentials>>) -> Self {
        CompositeCallCredentials { providers }
    }
}

#[async_trait]
impl CallCredentials for CompositeCallCredentials {
    async fn get_metadata(&self, ctx: &AuthContext, metadata: &mut Metadata) -> Result<(), RpcError> {
        for provider in &self.providers {
            provider.get_metadata(ctx, metadata).await?;
        }
        Ok(())
    }
}

/// TLS-specific channel credential detail. No custom root certificates are
/// accepted — trust is delegated entirely to the transport (§1 non-goal).
#[derive(Debug, Clone, Default)]
pub struct TlsChannelCredentials {
    pub domain_name: Option<String>,
}

/// Whether the channel is plaintext or TLS, and (if TLS) with what detail.
#[derive(Debug, Clone)]
pub enum ChannelCredentials {
    Insecure,
    Tls(TlsChannelCredentials),
}

impl ChannelCredentials {
    pub fn is_secure(&self) -> bool {
        matches!(self, ChannelCredentials::Tls(_))
    }
}

/// Validates the combination of channel credentials, call credentials, and
/// the insecure-override flag at construction time, per §4.7's "composing
/// call credentials with insecure channel credentials…is a configuration
/// error".
pub fn validate_credentials_combination(
    channel_credentials: &ChannelCredentials,
    has_call_credentials: bool,
    unsafe_use_insecure_channel_call_credentials: bool,
) -> Result<(), RpcError> {
    if has_call_credentials
        && !channel_credentials.is_secure()
        && !unsafe_use_insecure_channel_call_credentials
    {
        return Err(RpcError::Configuration(
            "Call credentials were configured on an insecure channel without the unsafe override."
                .to_string(),
        ));
    }
    Ok(())
}

/// Whether call credentials should be consulted at all for this call, per
/// §4.7's policy. When `false`, callers should emit the
/// `CallCredentialsNotUsed` log event and skip the credentials task
/// entirely.
pub fn should_invoke_call_credentials(
    channel_credentials: &ChannelCredentials,
    unsafe_use_insecure_channel_call_credentials: bool,
) -> bool {
    channel_credentials.is_secure() || unsafe_use_insecure_channel_call_credentials
}
