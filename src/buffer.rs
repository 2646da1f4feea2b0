use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use memchr::memmem;

use crate::constants;

/// Buffers the erased input stream and hands out exactly the byte shapes the
/// decoder stages need, without ever re-scanning consumed input.
pub(crate) struct StreamBuffer {
    pub(crate) eof: bool,
    pub(crate) buf: BytesMut,
    pub(crate) stream: BoxStream<'static, crate::Result<Bytes>>,
    whole_stream_size_limit: u64,
    stream_size_counter: u64,
}

impl StreamBuffer {
    pub fn new(stream: BoxStream<'static, crate::Result<Bytes>>, whole_stream_size_limit: u64) -> Self {
        StreamBuffer {
            eof: false,
            buf: BytesMut::new(),
            stream,
            whole_stream_size_limit,
            stream_size_counter: 0,
        }
    }

    pub fn poll_stream(&mut self, cx: &mut Context) -> crate::Result<()> {
        if self.eof {
            return Ok(());
        }

        loop {
            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => {
                    self.stream_size_counter += data.len() as u64;

                    if self.stream_size_counter > self.whole_stream_size_limit {
                        return Err(crate::Error::StreamSizeExceeded {
                            limit: self.whole_stream_size_limit,
                        });
                    }

                    self.buf.extend_from_slice(&data);
                }
                Poll::Ready(Some(Err(err))) => return Err(err),
                Poll::Ready(None) => {
                    self.eof = true;
                    return Ok(());
                }
                Poll::Pending => return Ok(()),
            }
        }
    }

    pub fn read_exact(&mut self, size: usize) -> Option<Bytes> {
        if size <= self.buf.len() {
            Some(self.buf.split_to(size).freeze())
        } else {
            None
        }
    }

    pub fn read_until(&mut self, pattern: &[u8]) -> Option<Bytes> {
        memmem::find(&self.buf, pattern).map(|idx| self.buf.split_to(idx + pattern.len()).freeze())
    }

    pub fn read_full_buf(&mut self) -> Bytes {
        self.buf.split_to(self.buf.len()).freeze()
    }

    /// Locates the opening `--boundary` marker at a line start.
    ///
    /// Nothing is consumed; the preamble has to stay buffered until a match
    /// is confirmed so the caller can still fall back to the whole input as
    /// a raw body. `scanned` is the resume offset for match candidates,
    /// advanced past everything that can no longer start a marker, so bytes
    /// are not re-scanned when the marker straddles two reads.
    pub fn find_first_boundary(&mut self, boundary: &str, scanned: &mut usize) -> Option<usize> {
        let marker = format!("{}{}", constants::BOUNDARY_EXT, boundary);
        let marker = marker.as_bytes();

        for rel_idx in memmem::find_iter(&self.buf[*scanned..], marker) {
            let idx = *scanned + rel_idx;

            // A marker counts only at the stream start or right after CRLF.
            if idx == 0 || (idx >= 2 && &self.buf[idx - 2..idx] == constants::CRLF.as_bytes()) {
                return Some(idx);
            }
        }

        let rescan_window = marker.len() - 1;
        *scanned = (*scanned).max(self.buf.len().saturating_sub(rescan_window));

        None
    }

    /// Reads the next run of body bytes for the current part.
    ///
    /// Returns `(true, bytes)` once the `\r\n--boundary` delimiter is
    /// reached, with the delimiter's CRLF stripped from the body and the
    /// buffer positioned at `--boundary`. Until then it returns
    /// `(false, bytes)` for everything that cannot be a delimiter prefix,
    /// holding back any tail that still might be one.
    pub fn read_body_data(
        &mut self,
        boundary: &str,
        field_name: Option<&str>,
    ) -> crate::Result<Option<(bool, Bytes)>> {
        let boundary_deriv = format!("{}{}{}", constants::CRLF, constants::BOUNDARY_EXT, boundary);
        let delim = boundary_deriv.as_bytes();

        if let Some(idx) = memmem::find(&self.buf, delim) {
            let bytes = self.buf.split_to(idx).freeze();

            // Discard the CRLF; it belongs to the delimiter, not the body.
            drop(self.buf.split_to(constants::CRLF.len()));

            return Ok(Some((true, bytes)));
        }

        if self.eof {
            return Err(crate::Error::IncompleteFieldData {
                field_name: field_name.map(|name| name.to_owned()),
            });
        }

        let tail_start = self.buf.len().saturating_sub(delim.len() - 1);
        let mut emit_to = self.buf.len();

        for idx in tail_start..self.buf.len() {
            if delim.starts_with(&self.buf[idx..]) {
                emit_to = idx;
                break;
            }
        }

        if emit_to == 0 {
            return Ok(None);
        }

        Ok(Some((false, self.buf.split_to(emit_to).freeze())))
    }
}
