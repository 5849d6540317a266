//! Parses gRPC status and trailing metadata out of an HTTP response (§4.4):
//! trailers if present, headers otherwise (a "trailers-only" response).

use http::{HeaderMap, StatusCode as HttpStatusCode, Version};

use crate::metadata::Metadata;
use crate::status::{status_code_from_http, Status, StatusCode};

/// A completed parse: the terminal status plus whatever trailing metadata
/// survived.
pub struct ParsedTrailers {
    pub status: Status,
    pub metadata: Metadata,
}

/// Everything the parser needs about the response that isn't carried in the
/// header map itself.
pub struct ResponseContext {
    pub http_status: HttpStatusCode,
    pub http_version: Version,
    pub content_type: Option<String>,
    pub is_browser_host: bool,
}

/// Parses `grpc-status`/`grpc-message`/binary trailers out of `source`
/// (either real trailers or, for a trailers-only response, the leading
/// headers), per §4.4's precedence rules.
///
/// `on_parse_error` is invoked with the `ErrorParsingTrailers` log detail
/// when a binary trailer fails to base64-decode; callers wire this to
/// `tracing::warn!`.
pub fn parse_trailers(
    source: &HeaderMap,
    ctx: &ResponseContext,
    mut on_parse_error: impl FnMut(&str),
) -> ParsedTrailers {
    if ctx.http_version == Version::HTTP_11 {
        return ParsedTrailers {
            status: Status::internal("Bad gRPC response. Response protocol downgraded to HTTP/1.1."),
            metadata: Metadata::new(),
        };
    }

    if ctx.http_status == HttpStatusCode::OK {
        if let Some(content_type) = &ctx.content_type {
            if !is_valid_grpc_content_type(content_type) {
                return ParsedTrailers {
                    status: Status::cancelled(format!(
                        "Bad gRPC response. Invalid content-type value: {content_type}"
                    )),
                    metadata: Metadata::new(),
                };
            }
        }
    }

    let grpc_status_values: Vec<&str> = source
        .get_all("grpc-status")
        .filter_map(|v| v.to_str().ok())
        .collect();

    let status = match grpc_status_values.first() {
        None => {
            if ctx.http_status != HttpStatusCode::OK {
                Status::new(
                    status_code_from_http(ctx.http_status.as_u16()),
                    format!("Bad gRPC response. HTTP status code: {}", ctx.http_status.as_u16()),
                )
            } else {
                let mut detail = "No grpc-status found on response.".to_string();
                if ctx.is_browser_host {
                    detail.push_str(" This can happen if the server does not set CORS headers correctly, or the browser rejected the response for another reason.");
                }
                Status::cancelled(detail)
            }
        }
        Some(raw) => match StatusCode::from_raw(raw) {
            Some(code) => {
                let message = match grpc_message(source) {
                    Ok(message) => message,
                    Err(status) => return ParsedTrailers { status, metadata: Metadata::new() },
                };
                Status::new(code, message.unwrap_or_default())
            }
            None => Status::cancelled(format!("Unexpected grpc-status value: {raw}")),
        },
    };

    let metadata = match collect_binary_safe_metadata(source) {
        Ok(metadata) => metadata,
        Err(()) => {
            on_parse_error("failed to base64-decode a binary trailer value");
            Metadata::new()
        }
    };

    ParsedTrailers { status, metadata }
}

fn is_valid_grpc_content_type(content_type: &str) -> bool {
    let ct = content_type.split(';').next().unwrap_or("").trim();
    ct == "application/grpc" || ct.starts_with("application/grpc+") || ct.starts_with("application/grpc-")
}

/// Returns `Ok(None)` if there's no `grpc-message` header, `Ok(Some(text))`
/// percent-decoded, or an `Err` status for the multiple-headers case.
fn grpc_message(source: &HeaderMap) -> Result<Option<String>, Status> {
    let values: Vec<&str> = source
        .get_all("grpc-message")
        .filter_map(|v| v.to_str().ok())
        .collect();

    match values.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(
            percent_encoding::percent_decode_str(single)
                .decode_utf8_lossy()
                .into_owned(),
        )),
        _ => Err(Status::cancelled("Multiple grpc-message headers.")),
    }
}

/// Collects every trailer other than `grpc-status`/`grpc-message` into
/// [`Metadata`], base64-decoding `-bin` keys. Fails the whole batch (per
/// §4.4: "decoding failure -> trailers is empty") if any binary value is
/// malformed.
fn collect_binary_safe_metadata(source: &HeaderMap) -> Result<Metadata, ()> {
    let mut metadata = Metadata::new();
    for (name, value) in source.iter() {
        let name = name.as_str();
        if name.eq_ignore_ascii_case("grpc-status") || name.eq_ignore_ascii_case("grpc-message") {
            continue;
        }
        let value_str = value.to_str().map_err(|_| ())?;
        let (key, parsed) = Metadata::from_wire_pair(name, value_str).ok_or(())?;
        metadata.merge(Metadata::from_iter([(key, parsed)]));
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn base_ctx() -> ResponseContext {
        ResponseContext {
            http_status: HttpStatusCode::OK,
            http_version: Version::HTTP_2,
            content_type: Some("application/grpc".to_string()),
            is_browser_host: false,
        }
    }

    #[test]
    fn missing_grpc_status_on_http_200_is_cancelled() {
        let headers = HeaderMap::new();
        let ctx = base_ctx();
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Cancelled);
        assert_eq!(parsed.status.detail(), "No grpc-status found on response.");
    }

    #[test]
    fn invalid_grpc_status_value_is_cancelled() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("nope"));
        let ctx = base_ctx();
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Cancelled);
        assert_eq!(parsed.status.detail(), "Unexpected grpc-status value: nope");
    }

    #[test]
    fn multiple_grpc_message_headers_is_cancelled() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("0"));
        headers.append("grpc-message", HeaderValue::from_static("one"));
        headers.append("grpc-message", HeaderValue::from_static("two"));
        let ctx = base_ctx();
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Cancelled);
        assert_eq!(parsed.status.detail(), "Multiple grpc-message headers.");
    }

    #[test]
    fn percent_decodes_grpc_message() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("2"));
        headers.insert("grpc-message", HeaderValue::from_static("%C2%A3"));
        let ctx = base_ctx();
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Unknown);
        assert_eq!(parsed.status.detail(), "\u{a3}");
    }

    #[test]
    fn binary_trailer_decode_failure_empties_metadata_but_keeps_status() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("0"));
        headers.insert("x-data-bin", HeaderValue::from_static("not base64!!"));
        let ctx = base_ctx();
        let mut logged = Vec::new();
        let parsed = parse_trailers(&headers, &ctx, |msg| logged.push(msg.to_string()));
        assert_eq!(parsed.status.code(), StatusCode::Ok);
        assert!(parsed.metadata.is_empty());
        assert_eq!(logged.len(), 1);
    }

    #[test]
    fn http_status_fallback_mapping_applies_when_no_grpc_status() {
        let headers = HeaderMap::new();
        let mut ctx = base_ctx();
        ctx.http_status = HttpStatusCode::NOT_FOUND;
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Unimplemented);
        assert_eq!(parsed.status.detail(), "Bad gRPC response. HTTP status code: 404");
    }

    #[test]
    fn http11_downgrade_is_internal() {
        let headers = HeaderMap::new();
        let mut ctx = base_ctx();
        ctx.http_version = Version::HTTP_11;
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Internal);
        assert_eq!(
            parsed.status.detail(),
            "Bad gRPC response. Response protocol downgraded to HTTP/1.1."
        );
    }

    #[test]
    fn invalid_content_type_on_200_is_cancelled() {
        let headers = HeaderMap::new();
        let mut ctx = base_ctx();
        ctx.content_type = Some("text/plain".to_string());
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Cancelled);
        assert_eq!(
            parsed.status.detail(),
            "Bad gRPC response. Invalid content-type value: text/plain"
        );
    }

    #[test]
    fn browser_host_appends_cors_note() {
        let headers = HeaderMap::new();
        let mut ctx = base_ctx();
        ctx.is_browser_host = true;
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert!(parsed.status.detail().starts_with("No grpc-status found on response."));
        assert!(parsed.status.detail().contains("CORS"));
    }

    #[test]
    fn grpc_status_in_leading_headers_overrides_http_status() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("12"));
        let mut ctx = base_ctx();
        ctx.http_status = HttpStatusCode::NOT_FOUND;
        let parsed = parse_trailers(&headers, &ctx, |_| {});
        assert_eq!(parsed.status.code(), StatusCode::Unimplemented);
    }
}
