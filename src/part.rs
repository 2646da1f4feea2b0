use std::borrow::Cow;
use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use http::header::HeaderName;
use mime::Mime;
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;

/// The header kinds that are recognized and retained on a [`Part`].
///
/// Any other header line found in a part's header block is discarded during
/// decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    /// A `Content-Disposition` header (multipart/form-data bodies).
    Disposition,

    /// A `Content-Type` header (multipart/form-data bodies).
    Type,

    /// A `Content-Transfer-Encoding` header (multipart/form-data bodies).
    TransferEncoding,

    /// A `Content-Range` header (multipart/byteranges bodies).
    ContentRange,
}

impl HeaderKind {
    pub(crate) fn from_name(name: &HeaderName) -> Option<HeaderKind> {
        match name.as_str() {
            "content-disposition" => Some(HeaderKind::Disposition),
            "content-type" => Some(HeaderKind::Type),
            "content-transfer-encoding" => Some(HeaderKind::TransferEncoding),
            "content-range" => Some(HeaderKind::ContentRange),
            _ => None,
        }
    }

    /// The on-wire header name this kind corresponds to.
    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderKind::Disposition => "content-disposition",
            HeaderKind::Type => "content-type",
            HeaderKind::TransferEncoding => "content-transfer-encoding",
            HeaderKind::ContentRange => "content-range",
        }
    }
}

/// The decoded contents of a request body.
///
/// A multipart body decodes to [`Parts`](ParsedBody::Parts); a body with no
/// recognizable boundary stays [`Raw`](ParsedBody::Raw). A part whose own
/// content type is `multipart/*` (byte-range responses, mostly) carries its
/// nested parts here as well, which is what makes the type recursive.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// The body as it appeared on the wire.
    Raw(Bytes),

    /// The decoded parts, in stream order.
    Parts(Vec<Part>),
}

impl ParsedBody {
    /// Returns the raw bytes, or `None` for a nested multipart body.
    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            ParsedBody::Raw(bytes) => Some(bytes),
            ParsedBody::Parts(_) => None,
        }
    }

    /// Returns the nested parts, or `None` for a raw body.
    pub fn as_parts(&self) -> Option<&[Part]> {
        match self {
            ParsedBody::Raw(_) => None,
            ParsedBody::Parts(parts) => Some(parts),
        }
    }
}

impl Default for ParsedBody {
    fn default() -> Self {
        ParsedBody::Raw(Bytes::new())
    }
}

/// One decoded section of a multipart body.
///
/// Parts are produced by [`MultipartDecoder`](crate::MultipartDecoder) and
/// are immutable once emitted.
///
/// # Examples
///
/// ```
/// use formpart::MultipartDecoder;
/// use bytes::Bytes;
/// use std::convert::Infallible;
/// use futures_util::stream::once;
///
/// # async fn run() {
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
/// let mut decoder = MultipartDecoder::new(stream, "X-BOUNDARY").unwrap();
///
/// while let Some(part) = decoder.next_part().await.unwrap() {
///     println!("{}: {:?}", part.name().to_owned(), part.text());
/// }
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    name: String,
    file_name: String,
    content_type: Mime,
    headers: HashMap<HeaderKind, String>,
    body: ParsedBody,
    idx: usize,
}

impl Part {
    /// The `name` parameter of the part's `Content-Disposition` header, or
    /// `""` if absent.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `filename` parameter of the part's `Content-Disposition` header,
    /// or `""` if absent.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The part's content type, defaulting to `text/plain` when the part
    /// carries no usable `Content-Type` header.
    pub fn content_type(&self) -> &Mime {
        &self.content_type
    }

    /// The recognized headers present on this part, at most one value per
    /// [`HeaderKind`].
    pub fn headers(&self) -> &HashMap<HeaderKind, String> {
        &self.headers
    }

    /// The value of one recognized header, if the part carried it.
    pub fn header(&self, kind: HeaderKind) -> Option<&str> {
        self.headers.get(&kind).map(|val| val.as_str())
    }

    /// The part's body.
    pub fn body(&self) -> &ParsedBody {
        &self.body
    }

    /// The zero-based position of this part in the stream.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Consumes the part and returns its raw body bytes.
    ///
    /// Fails with [`Error::NestedBody`](crate::Error::NestedBody) when the
    /// body was recursively decoded into nested parts.
    pub fn bytes(self) -> crate::Result<Bytes> {
        match self.body {
            ParsedBody::Raw(bytes) => Ok(bytes),
            ParsedBody::Parts(_) => Err(crate::Error::NestedBody),
        }
    }

    /// Consumes the part and returns its body as text, decoded per the
    /// `charset` parameter of its content type, defaulting to UTF-8.
    pub fn text(self) -> crate::Result<String> {
        self.text_with_charset("utf-8")
    }

    /// Consumes the part and returns its body as text, decoded per the
    /// `charset` parameter of its content type, falling back to
    /// `default_encoding`.
    pub fn text_with_charset(self, default_encoding: &str) -> crate::Result<String> {
        let encoding_name = self
            .content_type
            .get_param(mime::CHARSET)
            .map(|charset| charset.as_str().to_owned())
            .unwrap_or_else(|| default_encoding.to_owned());

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let bytes = self.bytes()?;

        let (text, _, _) = encoding.decode(&bytes);

        match text {
            Cow::Owned(s) => Ok(s),
            Cow::Borrowed(s) => Ok(String::from(s)),
        }
    }

    /// Consumes the part and deserializes its body as JSON.
    ///
    /// # Optional
    ///
    /// This requires the optional `json` feature to be enabled.
    #[cfg(feature = "json")]
    pub fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        let bytes = self.bytes()?;
        serde_json::from_slice(&bytes).map_err(crate::Error::DecodeJson)
    }
}

/// Construction-time view of a [`Part`], usable only inside the decoder.
/// Callers only ever see the finished immutable value.
#[derive(Debug)]
pub(crate) struct PartBuilder {
    pub(crate) name: Option<String>,
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<Mime>,
    pub(crate) headers: HashMap<HeaderKind, String>,
    pub(crate) body: BytesMut,
    pub(crate) idx: usize,
}

impl PartBuilder {
    pub(crate) fn new(idx: usize) -> Self {
        PartBuilder {
            name: None,
            file_name: None,
            content_type: None,
            headers: HashMap::new(),
            body: BytesMut::new(),
            idx,
        }
    }

    pub(crate) fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body).freeze()
    }

    pub(crate) fn finish(self, body: ParsedBody) -> Part {
        Part {
            name: self.name.unwrap_or_default(),
            file_name: self.file_name.unwrap_or_default(),
            content_type: self.content_type.unwrap_or(mime::TEXT_PLAIN),
            headers: self.headers,
            body,
            idx: self.idx,
        }
    }
}
