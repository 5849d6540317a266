//! Named compression providers and the registry that negotiates between them
//! (§4.2).

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::status::Status;

/// A named compression algorithm, matching one `grpc-encoding` token.
pub trait CompressionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>>;
    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// The implicit no-op provider. Always present; never listed as removable.
pub struct IdentityProvider;

impl CompressionProvider for IdentityProvider {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

pub struct GzipProvider;

impl CompressionProvider for GzipProvider {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(input)?;
        encoder.finish()
    }

    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = flate2::read::GzDecoder::new(input);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(feature = "deflate")]
pub struct DeflateProvider;

#[cfg(feature = "deflate")]
impl CompressionProvider for DeflateProvider {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(input)?;
        encoder.finish()
    }

    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = flate2::read::ZlibDecoder::new(input);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Client-only synthetic metadata key a caller sets on `CallOptions.headers`
/// to pick the send encoding for one call. Never forwarded on the wire —
/// the driver pulls it out before building the outgoing request (§4.2).
pub const ENCODING_REQUEST_METADATA_KEY: &str = "grpc-internal-encoding-request";

/// Maps encoding name → provider. `identity` is always implicitly present,
/// even if not explicitly registered, matching §4.2's "`identity` always
/// implicit".
#[derive(Clone)]
pub struct CompressionRegistry {
    providers: BTreeMap<&'static str, Arc<dyn CompressionProvider>>,
}

impl CompressionRegistry {
    pub fn new() -> Self {
        let mut providers: BTreeMap<&'static str, Arc<dyn CompressionProvider>> = BTreeMap::new();
        providers.insert("identity", Arc::new(IdentityProvider));
        CompressionRegistry { providers }
    }

    /// `identity` + `gzip` (and `deflate` under the `deflate` feature),
    /// matching §3's channel-options default set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GzipProvider));
        #[cfg(feature = "deflate")]
        registry.register(Arc::new(DeflateProvider));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn CompressionProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CompressionProvider>> {
        self.providers.get(name).cloned()
    }

    /// `identity` first, then the rest in registration order, for the
    /// `grpc-accept-encoding` header.
    pub fn accept_encoding_header(&self) -> String {
        let mut names: Vec<&str> = vec!["identity"];
        names.extend(self.providers.keys().filter(|n| **n != "identity"));
        names.join(",")
    }

    /// Looks up a provider by name for sending, mapping a miss to the exact
    /// `Internal` wording from §4.2.
    pub fn require_for_send(&self, name: &str) -> Result<Arc<dyn CompressionProvider>, Status> {
        self.get(name).ok_or_else(|| {
            Status::internal(format!("Could not find compression provider for '{name}'."))
        })
    }

    /// Looks up a provider by name for receiving, mapping a miss to the
    /// exact `Unimplemented` wording from §4.1.
    pub fn require_for_receive(&self, name: &str) -> Result<Arc<dyn CompressionProvider>, Status> {
        self.get(name).ok_or_else(|| {
            Status::unimplemented(format!(
                "Unsupported grpc-encoding value '{name}'. Supported encodings: {}",
                self.accept_encoding_header()
            ))
        })
    }
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_always_present() {
        let registry = CompressionRegistry::new();
        assert!(registry.get("identity").is_some());
    }

    #[test]
    fn default_registry_advertises_identity_first() {
        let registry = CompressionRegistry::with_defaults();
        let header = registry.accept_encoding_header();
        assert!(header.starts_with("identity"));
        assert!(header.contains("gzip"));
    }

    #[test]
    fn gzip_round_trips() {
        let gzip = GzipProvider;
        let payload = b"hello world, this is compressible compressible compressible";
        let compressed = gzip.compress(payload).unwrap();
        let restored = gzip.decompress(&compressed).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn identity_round_trips() {
        let identity = IdentityProvider;
        let payload = b"raw bytes";
        assert_eq!(identity.compress(payload).unwrap(), payload);
        assert_eq!(identity.decompress(payload).unwrap(), payload);
    }

    #[test]
    fn missing_send_provider_reports_exact_message() {
        let registry = CompressionRegistry::new();
        let err = registry.require_for_send("snappy").unwrap_err();
        assert_eq!(
            err.detail(),
            "Could not find compression provider for 'snappy'."
        );
    }

    #[test]
    fn missing_receive_provider_reports_exact_message() {
        let registry = CompressionRegistry::with_defaults();
        let err = registry.require_for_receive("snappy").unwrap_err();
        assert!(err
            .detail()
            .starts_with("Unsupported grpc-encoding value 'snappy'. Supported encodings:"));
    }
}
