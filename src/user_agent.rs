//! Builds the `user-agent` header value from runtime info (§4.10).

use std::sync::OnceLock;

/// Runtime facts the generator needs; callers normally supply
/// [`RuntimeInfo::detect`], tests supply a fixed value.
#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    pub crate_version: String,
    pub rustc_info: String,
    pub os: String,
    pub arch: String,
}

impl RuntimeInfo {
    pub fn detect() -> Self {
        RuntimeInfo {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            rustc_info: "rustc".to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Strips any `+build-metadata` suffix from a semver string, per §4.10.
fn strip_build_metadata(version: &str) -> &str {
    version.split('+').next().unwrap_or(version)
}

/// Builds `grpc-rust/<version> (<runtime-info>; <os>; <arch>)`, omitting any
/// parenthesized field that ends up empty.
pub fn build_user_agent(info: &RuntimeInfo) -> String {
    let version = strip_build_metadata(&info.crate_version);
    let fields: Vec<&str> = [info.rustc_info.as_str(), info.os.as_str(), info.arch.as_str()]
        .into_iter()
        .filter(|f| !f.is_empty())
        .collect();

    if fields.is_empty() {
        format!("grpc-rust/{version}")
    } else {
        format!("grpc-rust/{version} ({})", fields.join("; "))
    }
}

static CACHED_USER_AGENT: OnceLock<String> = OnceLock::new();

/// The process-wide user-agent string, computed once and cached, per §9's
/// "reads runtime info once and caches".
pub fn cached_user_agent() -> &'static str {
    CACHED_USER_AGENT.get_or_init(|| build_user_agent(&RuntimeInfo::detect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_build_metadata_suffix() {
        assert_eq!(strip_build_metadata("1.2.3+abcdef"), "1.2.3");
        assert_eq!(strip_build_metadata("1.2.3"), "1.2.3");
    }

    #[test]
    fn omits_empty_fields() {
        let info = RuntimeInfo {
            crate_version: "1.0.0".to_string(),
            rustc_info: String::new(),
            os: "linux".to_string(),
            arch: String::new(),
        };
        assert_eq!(build_user_agent(&info), "grpc-rust/1.0.0 (linux)");
    }

    #[test]
    fn all_fields_present() {
        let info = RuntimeInfo {
            crate_version: "2.1.0+deadbeef".to_string(),
            rustc_info: "rustc 1.75".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        };
        assert_eq!(
            build_user_agent(&info),
            "grpc-rust/2.1.0 (rustc 1.75; linux; x86_64)"
        );
    }

    #[test]
    fn cached_user_agent_is_stable_across_calls() {
        assert_eq!(cached_user_agent(), cached_user_agent());
    }
}
