//! The gRPC-over-HTTP/2 message framing codec (§4.1): one byte compression
//! flag, a 4-byte big-endian length, then the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::compression::CompressionProvider;
use crate::status::Status;

pub const HEADER_LEN: usize = 5;

/// Per-message write flags. Only `NO_COMPRESS` exists today, per §3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub no_compress: bool,
}

impl WriteOptions {
    pub const NONE: WriteOptions = WriteOptions { no_compress: false };

    pub fn no_compress() -> Self {
        WriteOptions { no_compress: true }
    }
}

/// Frames one already-serialized message payload into the gRPC wire format.
///
/// `send_encoding` is `None` for `identity`, `Some(provider)` otherwise.
/// `send_size_limit` enforces §4.1's "Sending message exceeds..." check.
pub fn frame_message(
    payload: &[u8],
    send_encoding: Option<&dyn CompressionProvider>,
    write_options: WriteOptions,
    send_size_limit: Option<usize>,
) -> Result<Bytes, Status> {
    let should_compress = send_encoding.is_some() && !write_options.no_compress;

    let (compressed_flag, body): (u8, Bytes) = if should_compress {
        let provider = send_encoding.expect("checked above");
        let compressed = provider
            .compress(payload)
            .map_err(|e| Status::internal(format!("failed to compress message: {e}")))?;
        (1, Bytes::from(compressed))
    } else {
        (0, Bytes::copy_from_slice(payload))
    };

    if let Some(limit) = send_size_limit {
        if body.len() > limit {
            return Err(Status::resource_exhausted(
                "Sending message exceeds the maximum configured message size.",
            ));
        }
    }

    let mut framed = BytesMut::with_capacity(HEADER_LEN + body.len());
    framed.put_u8(compressed_flag);
    framed.put_u32(body.len() as u32);
    framed.extend_from_slice(&body);
    Ok(framed.freeze())
}

/// The parsed, but not yet decompressed, header of one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub compressed: bool,
    pub length: u32,
}

/// Parses a 5-byte frame header. Caller guarantees exactly 5 bytes are
/// supplied (§4.1's "read exactly 5 bytes").
pub fn parse_header(header: &[u8]) -> FrameHeader {
    debug_assert_eq!(header.len(), HEADER_LEN);
    let compressed = header[0] == 1;
    let mut len_bytes = &header[1..5];
    let length = len_bytes.get_u32();
    FrameHeader { compressed, length }
}

/// Decodes one complete frame body (post-header) into the logical message
/// bytes, decompressing if the header's flag demands it.
///
/// `receive_size_limit` is checked against the *framed* length by the
/// caller before this is invoked (it needs the length before reading the
/// body at all); this function focuses on the decompression step and the
/// "unknown encoding" / "incomplete body" failure modes.
pub fn decode_frame_body(
    header: FrameHeader,
    body: Bytes,
    receive_encoding: Option<&dyn CompressionProvider>,
) -> Result<Bytes, Status> {
    if body.len() as u64 != header.length as u64 {
        return Err(Status::internal(format!(
            "Error reading next message. Expected {} bytes but got {}.",
            header.length,
            body.len()
        )));
    }

    if !header.compressed {
        return Ok(body);
    }

    let provider = receive_encoding.ok_or_else(|| {
        Status::internal("received a compressed message but no grpc-encoding was negotiated")
    })?;

    let decompressed = provider
        .decompress(&body)
        .map_err(|e| Status::internal(format!("failed to decompress message: {e}")))?;
    Ok(Bytes::from(decompressed))
}
