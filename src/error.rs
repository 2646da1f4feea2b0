use std::fmt::{self, Debug, Display, Formatter};

use crate::Part;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while decoding a multipart stream and in
/// other operations.
#[non_exhaustive]
pub enum Error {
    /// The caller-supplied boundary is empty or longer than the 70 bytes
    /// RFC 2046 allows.
    InvalidBoundary,

    /// No opening boundary was found anywhere in the stream.
    ///
    /// [`MultipartDecoder::decode`](crate::MultipartDecoder::decode) recovers
    /// from this by returning the whole input as
    /// [`ParsedBody::Raw`](crate::ParsedBody::Raw); it only surfaces from the
    /// incremental [`next_part`](crate::MultipartDecoder::next_part) API.
    BoundaryNotFound,

    /// An unknown field is detected when an
    /// [`allowed_fields`](crate::Constraints::allowed_fields) constraint is
    /// added.
    UnknownField { field_name: Option<String> },

    /// The stream ended before the current part's body was terminated by a
    /// boundary.
    IncompleteFieldData { field_name: Option<String> },

    /// Couldn't read the part headers completely.
    IncompleteHeaders,

    /// Failed to read headers.
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode a part's raw header name to a
    /// [`HeaderName`](http::header::HeaderName).
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode a part's raw header value to a
    /// [`HeaderValue`](http::header::HeaderValue).
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// The multipart stream ended before the terminal boundary.
    ///
    /// `decoded` holds every part that was fully decoded before the
    /// truncation point, so valid leading parts survive a malformed tail.
    IncompleteStream { decoded: Vec<Part> },

    /// An incoming part exceeded the maximum per-field size limit.
    FieldSizeExceeded { limit: u64, field_name: Option<String> },

    /// The incoming stream exceeded the maximum whole-stream size limit.
    StreamSizeExceeded { limit: u64 },

    /// Stream read failed.
    StreamReadFailed(BoxError),

    /// The `Content-Type` header is not `multipart/form-data`.
    NoMultipart,

    /// Failed to convert the `Content-Type` to a [`mime::Mime`].
    DecodeContentType(mime::FromStrError),

    /// No boundary found in the `Content-Type` header.
    NoBoundary,

    /// The part's body holds nested parts, so it cannot be read as raw
    /// bytes or text.
    NestedBody,

    /// Failed to decode a part's body as JSON in
    /// [`Part::json`](crate::Part::json).
    #[cfg(feature = "json")]
    DecodeJson(serde_json::Error),
}

impl Error {
    /// Whether this error means the input ended too early, in which case
    /// [`decode`](crate::MultipartDecoder::decode) re-raises it as
    /// [`IncompleteStream`](Error::IncompleteStream) carrying the parts
    /// decoded so far.
    pub(crate) fn is_truncation(&self) -> bool {
        matches!(
            self,
            Error::IncompleteStream { .. } | Error::IncompleteFieldData { .. } | Error::IncompleteHeaders
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidBoundary => write!(f, "invalid multipart boundary"),
            Error::BoundaryNotFound => write!(f, "multipart boundary not found in the stream"),
            Error::UnknownField { field_name } => {
                let name = field_name.as_deref().unwrap_or("<unknown>");
                write!(f, "unknown field received: {}", name)
            }
            Error::IncompleteFieldData { field_name } => {
                let name = field_name.as_deref().unwrap_or("<unknown>");
                write!(f, "field '{}' received with incomplete data", name)
            }
            Error::IncompleteHeaders => write!(f, "failed to read part's complete headers"),
            Error::ReadHeaderFailed(err) => write!(f, "failed to read headers: {}", err),
            Error::DecodeHeaderName { name, cause } => {
                write!(f, "failed to decode part's raw header name: {:?} {}", name, cause)
            }
            Error::DecodeHeaderValue { cause, .. } => {
                write!(f, "failed to decode part's raw header value: {}", cause)
            }
            Error::IncompleteStream { .. } => write!(f, "incomplete multipart stream"),
            Error::FieldSizeExceeded { limit, field_name } => {
                let name = field_name.as_deref().unwrap_or("<unknown>");
                write!(f, "field '{}' exceeded the maximum size limit: {} bytes", name, limit)
            }
            Error::StreamSizeExceeded { limit } => {
                write!(f, "stream size exceeded the maximum limit: {} bytes", limit)
            }
            Error::StreamReadFailed(err) => write!(f, "stream read failed: {}", err),
            Error::NoMultipart => write!(f, "Content-Type is not multipart/form-data"),
            Error::DecodeContentType(err) => {
                write!(f, "failed to convert Content-Type to `mime::Mime` type: {}", err)
            }
            Error::NoBoundary => write!(f, "multipart boundary not found in Content-Type"),
            Error::NestedBody => write!(f, "part body holds nested parts, not raw bytes"),
            #[cfg(feature = "json")]
            Error::DecodeJson(err) => write!(f, "failed to decode part's body as JSON: {}", err),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
