use std::convert::TryFrom;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use httparse::Header;

pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header]) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name).map_err(|err| crate::Error::DecodeHeaderName {
            name: raw_header.name.to_owned(),
            cause: err.into(),
        })?;

        let value = HeaderValue::from_bytes(raw_header.value).map_err(|err| crate::Error::DecodeHeaderValue {
            value: raw_header.value.to_owned(),
            cause: err.into(),
        })?;

        headers.insert(name, value);
    }

    Ok(headers)
}

/// Rewrites a raw header block before it reaches `httparse`: folded
/// continuation lines (leading SP/HT) are unfolded onto their parent line,
/// and lines without a colon are dropped instead of failing the decode.
pub(crate) fn sanitize_header_block(block: &[u8]) -> Vec<u8> {
    let mut logical: Vec<Vec<u8>> = Vec::new();

    for line in block.split(|&b| b == b'\n') {
        let line = match line.last() {
            Some(b'\r') => &line[..line.len() - 1],
            _ => line,
        };

        if line.is_empty() {
            continue;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            // Continuation line: unfold onto the previous one. A fold with
            // no line to fold into is dropped.
            if let Some(prev) = logical.last_mut() {
                let folded = line.iter().position(|&b| b != b' ' && b != b'\t').unwrap_or(line.len());
                prev.push(b' ');
                prev.extend_from_slice(&line[folded..]);
            }
            continue;
        }

        logical.push(line.to_vec());
    }

    let mut sanitized = Vec::with_capacity(block.len());

    for line in logical {
        if memchr::memchr(b':', &line).is_none() {
            #[cfg(feature = "log")]
            log::warn!(
                "skipping malformed header line: {:?}",
                String::from_utf8_lossy(&line)
            );
            continue;
        }

        sanitized.extend_from_slice(&line);
        sanitized.extend_from_slice(b"\r\n");
    }

    sanitized.extend_from_slice(b"\r\n");
    sanitized
}

#[cfg(test)]
mod tests {
    use super::sanitize_header_block;

    #[test]
    fn test_unfolds_continuation_lines() {
        let block = b"Content-Disposition: form-data;\r\n name=\"field1\"\r\n\r\n";
        let sanitized = sanitize_header_block(block);
        assert_eq!(
            sanitized,
            b"Content-Disposition: form-data; name=\"field1\"\r\n\r\n"
        );
    }

    #[test]
    fn test_drops_lines_without_colon() {
        let block = b"garbage line\r\nContent-Type: text/plain\r\n\r\n";
        let sanitized = sanitize_header_block(block);
        assert_eq!(sanitized, b"Content-Type: text/plain\r\n\r\n");
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(sanitize_header_block(b"\r\n"), b"\r\n");
    }
}
