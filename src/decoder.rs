use std::convert::Infallible;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use http::header;
use mime::Mime;
#[cfg(feature = "tokio-io")]
use tokio::io::AsyncRead;
#[cfg(feature = "tokio-io")]
use tokio_util::io::ReaderStream;

use crate::buffer::StreamBuffer;
use crate::constants;
use crate::content_disposition::ContentDisposition;
use crate::helpers;
use crate::part::{HeaderKind, ParsedBody, Part, PartBuilder};
use crate::state::{DecoderState, StreamingStage};
use crate::Constraints;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Decodes a `multipart/form-data` byte stream into [`Part`] values.
///
/// The input is consumed incrementally: only the current part's body is
/// buffered, boundary markers are matched across chunk boundaries, and the
/// same sequence of parts comes out no matter how the input is chunked.
/// Parts can be pulled one at a time with [`next_part`](Self::next_part),
/// or the whole body can be driven to a [`ParsedBody`] with
/// [`decode`](Self::decode).
///
/// Dropping the decoder cancels the decode; a partially accumulated part is
/// released without being emitted.
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
///     println!("Part: {:?}", part.text());
/// }
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
pub struct MultipartDecoder {
    state: DecoderState,
    constraints: Constraints,
}

impl std::fmt::Debug for MultipartDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartDecoder").finish_non_exhaustive()
    }
}

enum PollEvent {
    Part(PartBuilder),
    Raw(Bytes),
    Done,
}

enum Event {
    Part(Part),
    Raw(Bytes),
    Done,
}

impl MultipartDecoder {
    /// Constructs a new `MultipartDecoder` from a
    /// [`Bytes`](bytes::Bytes) stream and the boundary taken from the
    /// request's `Content-Type` header (see
    /// [`parse_boundary`](crate::parse_boundary)).
    ///
    /// Fails with [`Error::InvalidBoundary`](crate::Error::InvalidBoundary)
    /// when the boundary is empty or longer than the 70 bytes RFC 2046
    /// allows; nothing is read from the stream in that case.
    pub fn new<S, O, E, B>(stream: S, boundary: B) -> crate::Result<MultipartDecoder>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
        B: Into<String>,
    {
        MultipartDecoder::with_constraints(stream, boundary, Constraints::default())
    }

    /// Constructs a new `MultipartDecoder` with the given [`Constraints`].
    pub fn with_constraints<S, O, E, B>(
        stream: S,
        boundary: B,
        constraints: Constraints,
    ) -> crate::Result<MultipartDecoder>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
        B: Into<String>,
    {
        let boundary = boundary.into();

        if boundary.is_empty() || boundary.len() > constants::MAX_BOUNDARY_LEN {
            return Err(crate::Error::InvalidBoundary);
        }

        let stream = stream
            .map_ok(|b| b.into())
            .map_err(|err| crate::Error::StreamReadFailed(err.into()))
            .boxed();

        let state = DecoderState {
            buffer: StreamBuffer::new(stream, constraints.size_limit.whole_stream),
            boundary,
            stage: StreamingStage::FindingFirstBoundary,
            preamble_scanned: 0,
            next_part_idx: 0,
            curr_part: None,
            curr_field_size_limit: constraints.size_limit.per_field,
        };

        Ok(MultipartDecoder { state, constraints })
    }

    /// Constructs a new `MultipartDecoder` from an
    /// [`AsyncRead`](tokio::io::AsyncRead) reader and the boundary.
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    pub fn with_reader<R, B>(reader: R, boundary: B) -> crate::Result<MultipartDecoder>
    where
        R: AsyncRead + Send + 'static,
        B: Into<String>,
    {
        let stream = ReaderStream::new(reader);
        MultipartDecoder::new(stream, boundary)
    }

    /// Constructs a new `MultipartDecoder` from an
    /// [`AsyncRead`](tokio::io::AsyncRead) reader with the given
    /// [`Constraints`].
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    pub fn with_reader_with_constraints<R, B>(
        reader: R,
        boundary: B,
        constraints: Constraints,
    ) -> crate::Result<MultipartDecoder>
    where
        R: AsyncRead + Send + 'static,
        B: Into<String>,
    {
        let stream = ReaderStream::new(reader);
        MultipartDecoder::with_constraints(stream, boundary, constraints)
    }

    /// Yields the next [`Part`] if available, `None` once the terminal
    /// boundary has been read.
    ///
    /// When the stream holds no opening boundary at all, this fails with
    /// [`Error::BoundaryNotFound`](crate::Error::BoundaryNotFound); use
    /// [`decode`](Self::decode) to fall back to the raw body instead.
    pub async fn next_part(&mut self) -> crate::Result<Option<Part>> {
        match self.next_event().await? {
            Event::Part(part) => Ok(Some(part)),
            Event::Raw(bytes) if bytes.is_empty() => Ok(None),
            Event::Raw(_) => Err(crate::Error::BoundaryNotFound),
            Event::Done => Ok(None),
        }
    }

    /// Yields the next [`Part`] with its positioning index as a tuple
    /// `(usize, Part)`.
    pub async fn next_part_with_index(&mut self) -> crate::Result<Option<(usize, Part)>> {
        self.next_part().await.map(|p| p.map(|part| (part.index(), part)))
    }

    /// Drives the stream to completion and returns the decoded body.
    ///
    /// - Parts delimited by the boundary decode to
    ///   [`ParsedBody::Parts`] in stream order.
    /// - A non-empty body with no opening boundary anywhere becomes
    ///   [`ParsedBody::Raw`] holding the entire input.
    /// - An empty body decodes to an empty part sequence.
    /// - A truncated stream fails with
    ///   [`Error::IncompleteStream`](crate::Error::IncompleteStream)
    ///   carrying every part that was fully decoded before the truncation
    ///   point.
    pub async fn decode(mut self) -> crate::Result<ParsedBody> {
        let mut parts = Vec::new();

        loop {
            match self.next_event().await {
                Ok(Event::Part(part)) => parts.push(part),
                Ok(Event::Done) => return Ok(ParsedBody::Parts(parts)),
                Ok(Event::Raw(bytes)) => {
                    return if bytes.is_empty() {
                        Ok(ParsedBody::Parts(parts))
                    } else {
                        Ok(ParsedBody::Raw(bytes))
                    };
                }
                Err(err) if err.is_truncation() => {
                    return Err(crate::Error::IncompleteStream { decoded: parts });
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn next_event(&mut self) -> crate::Result<Event> {
        let event = future::poll_fn(|cx| self.poll_event(cx)).await?;

        match event {
            PollEvent::Part(mut builder) => {
                let body = builder.take_body();

                if let Some(nested) = nested_boundary(builder.content_type.as_ref()) {
                    if let Ok(ParsedBody::Parts(parts)) = decode_nested(body.clone(), nested).await {
                        return Ok(Event::Part(builder.finish(ParsedBody::Parts(parts))));
                    }

                    // A malformed nested body does not fail the outer part.
                    #[cfg(feature = "log")]
                    log::trace!("nested multipart decode failed, keeping the raw body");
                }

                Ok(Event::Part(builder.finish(ParsedBody::Raw(body))))
            }
            PollEvent::Raw(bytes) => Ok(Event::Raw(bytes)),
            PollEvent::Done => Ok(Event::Done),
        }
    }

    fn poll_event(&mut self, cx: &mut Context) -> Poll<crate::Result<PollEvent>> {
        let state = &mut self.state;

        if state.stage == StreamingStage::Eof {
            return Poll::Ready(Ok(PollEvent::Done));
        }

        if let Err(err) = state.buffer.poll_stream(cx) {
            return Poll::Ready(Err(err));
        }

        if state.stage == StreamingStage::FindingFirstBoundary {
            match state.buffer.find_first_boundary(&state.boundary, &mut state.preamble_scanned) {
                Some(idx) => {
                    // Preamble before the first boundary is discarded.
                    drop(state.buffer.read_exact(idx));
                    state.stage = StreamingStage::ReadingBoundary;
                }
                None => {
                    return if state.buffer.eof {
                        state.stage = StreamingStage::Eof;
                        Poll::Ready(Ok(PollEvent::Raw(state.buffer.read_full_buf())))
                    } else {
                        Poll::Pending
                    };
                }
            }
        }

        if state.stage == StreamingStage::ReadingBoundary {
            let boundary = &state.boundary;
            let boundary_deriv_len = constants::BOUNDARY_EXT.len() + boundary.len() + 2;

            let boundary_bytes = match state.buffer.read_exact(boundary_deriv_len) {
                Some(bytes) => bytes,
                None => {
                    return if state.buffer.eof {
                        Poll::Ready(Err(crate::Error::IncompleteStream { decoded: Vec::new() }))
                    } else {
                        Poll::Pending
                    };
                }
            };

            if &boundary_bytes[..]
                == format!("{}{}{}", constants::BOUNDARY_EXT, boundary, constants::BOUNDARY_EXT).as_bytes()
            {
                // Terminal boundary; anything after it is epilogue and is
                // dropped unread.
                state.stage = StreamingStage::Eof;
                return Poll::Ready(Ok(PollEvent::Done));
            }

            if &boundary_bytes[..] != format!("{}{}{}", constants::BOUNDARY_EXT, boundary, constants::CRLF).as_bytes() {
                return Poll::Ready(Err(crate::Error::IncompleteStream { decoded: Vec::new() }));
            }

            state.stage = StreamingStage::ReadingPartHeaders;
        }

        if state.stage == StreamingStage::ReadingPartHeaders {
            // A part with no headers opens directly with the blank line.
            let header_bytes = if state.buffer.buf.len() >= constants::CRLF.len()
                && &state.buffer.buf[..constants::CRLF.len()] == constants::CRLF.as_bytes()
            {
                match state.buffer.read_exact(constants::CRLF.len()) {
                    Some(bytes) => bytes,
                    None => return Poll::Pending,
                }
            } else {
                match state.buffer.read_until(constants::CRLF_CRLF.as_bytes()) {
                    Some(bytes) => bytes,
                    None => {
                        return if state.buffer.eof {
                            Poll::Ready(Err(crate::Error::IncompleteStream { decoded: Vec::new() }))
                        } else {
                            Poll::Pending
                        };
                    }
                }
            };

            let sanitized = helpers::sanitize_header_block(&header_bytes);

            let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

            let headers = match httparse::parse_headers(&sanitized, &mut headers) {
                Ok(httparse::Status::Complete((_, raw_headers))) => {
                    match helpers::convert_raw_headers_to_header_map(raw_headers) {
                        Ok(headers) => headers,
                        Err(err) => {
                            return Poll::Ready(Err(err));
                        }
                    }
                }
                Ok(httparse::Status::Partial) => {
                    return Poll::Ready(Err(crate::Error::IncompleteHeaders));
                }
                Err(err) => {
                    return Poll::Ready(Err(crate::Error::ReadHeaderFailed(err)));
                }
            };

            let content_disposition = ContentDisposition::parse(&headers);

            if !self.constraints.is_it_allowed(content_disposition.field_name.as_deref()) {
                return Poll::Ready(Err(crate::Error::UnknownField {
                    field_name: content_disposition.field_name,
                }));
            }

            let mut builder = PartBuilder::new(state.next_part_idx);
            state.next_part_idx += 1;

            for (name, value) in headers.iter() {
                if let Some(kind) = HeaderKind::from_name(name) {
                    builder
                        .headers
                        .insert(kind, String::from_utf8_lossy(value.as_bytes()).into_owned());
                }
            }

            builder.content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|val| val.to_str().ok())
                .and_then(|val| val.parse::<Mime>().ok());
            builder.name = content_disposition.field_name;
            builder.file_name = content_disposition.file_name;

            state.curr_field_size_limit = self
                .constraints
                .size_limit
                .extract_size_limit_for(builder.name.as_deref());
            state.curr_part = Some(builder);

            state.stage = StreamingStage::ReadingPartBody;
        }

        if state.stage == StreamingStage::ReadingPartBody {
            while let Some(builder) = state.curr_part.as_mut() {
                match state.buffer.read_body_data(&state.boundary, builder.name.as_deref()) {
                    Ok(Some((done, bytes))) => {
                        if (builder.body.len() + bytes.len()) as u64 > state.curr_field_size_limit {
                            return Poll::Ready(Err(crate::Error::FieldSizeExceeded {
                                limit: state.curr_field_size_limit,
                                field_name: builder.name.clone(),
                            }));
                        }

                        builder.body.extend_from_slice(&bytes);

                        if done {
                            state.stage = StreamingStage::ReadingBoundary;
                            break;
                        }
                    }
                    Ok(None) => return Poll::Pending,
                    Err(err) => return Poll::Ready(Err(err)),
                }
            }

            if state.stage == StreamingStage::ReadingBoundary {
                if let Some(builder) = state.curr_part.take() {
                    return Poll::Ready(Ok(PollEvent::Part(builder)));
                }
            }
        }

        Poll::Pending
    }
}

fn nested_boundary(content_type: Option<&Mime>) -> Option<String> {
    let m = content_type?;

    if m.type_() == mime::MULTIPART {
        m.get_param(mime::BOUNDARY).map(|b| b.as_str().to_owned())
    } else {
        None
    }
}

fn decode_nested(bytes: Bytes, boundary: String) -> BoxFuture<'static, crate::Result<ParsedBody>> {
    Box::pin(async move {
        let stream = stream::once(future::ready(Ok::<Bytes, Infallible>(bytes)));
        let decoder = MultipartDecoder::new(stream, boundary)?;
        decoder.decode().await
    })
}
