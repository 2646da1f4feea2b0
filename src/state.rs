use crate::buffer::StreamBuffer;
use crate::part::PartBuilder;

pub(crate) struct DecoderState {
    pub(crate) buffer: StreamBuffer,
    pub(crate) boundary: String,
    pub(crate) stage: StreamingStage,
    pub(crate) preamble_scanned: usize,
    pub(crate) next_part_idx: usize,
    pub(crate) curr_part: Option<PartBuilder>,
    pub(crate) curr_field_size_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    FindingFirstBoundary,
    ReadingBoundary,
    ReadingPartHeaders,
    ReadingPartBody,
    Eof,
}
