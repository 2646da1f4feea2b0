//! An async streaming decoder for `multipart/form-data` request bodies.
//!
//! `formpart` consumes a byte stream plus the boundary token from the
//! request's `Content-Type` header and produces an ordered sequence of
//! [`Part`] values, each carrying its recognized headers and body bytes.
//! A body with no recognizable boundary falls back to
//! [`ParsedBody::Raw`], and a part that is itself `multipart/*` decodes
//! recursively into nested parts. The input is processed incrementally, so
//! large uploads are never buffered whole.
//!
//! # Examples
//!
//! ```
//! use formpart::{MultipartDecoder, ParsedBody};
//! use bytes::Bytes;
//! use std::convert::Infallible;
//! use futures_util::stream::once;
//!
//! # async fn run() {
//! let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//! let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
//!
//! let decoder = MultipartDecoder::new(stream, "X-BOUNDARY").unwrap();
//!
//! match decoder.decode().await.unwrap() {
//!     ParsedBody::Parts(parts) => {
//!         for part in parts {
//!             println!("{}: {:?}", part.name().to_owned(), part.text());
//!         }
//!     }
//!     ParsedBody::Raw(bytes) => println!("not multipart: {} bytes", bytes.len()),
//! }
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(run());
//! ```

pub use bytes;

pub use constraints::Constraints;
pub use decoder::MultipartDecoder;
pub use error::Error;
pub use part::{HeaderKind, ParsedBody, Part};
pub use size_limit::SizeLimit;

mod buffer;
mod constants;
mod constraints;
mod content_disposition;
mod decoder;
mod error;
mod helpers;
mod part;
mod size_limit;
mod state;

/// A Result type often returned from methods that can have `formpart`
/// errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(crate::Error::DecodeContentType)?;

    if !(m.type_() == mime::MULTIPART_FORM_DATA.type_() && m.subtype() == mime::MULTIPART_FORM_DATA.subtype()) {
        return Err(crate::Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(crate::Error::NoBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("ABCDEFG".to_owned()));

        let content_type = "multipart/form-data; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("------ABCDEFG".to_owned()));

        let content_type = "boundary=------ABCDEFG";
        assert!(parse_boundary(content_type).is_err());

        let content_type = "text/plain";
        assert!(parse_boundary(content_type).is_err());

        let content_type = "text/plain; boundary=------ABCDEFG";
        assert!(parse_boundary(content_type).is_err());
    }
}
