use crate::event::WorkflowEvent;

/// ASCII record separator delimiting envelopes on the watch stream.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Incremental splitter for record-separator framed streams.
///
/// Envelopes may straddle transport chunks, so bytes are buffered until a
/// delimiter arrives.
#[derive(Default)]
pub(crate) struct RecordDecoder {
    buf: Vec<u8>,
}

impl RecordDecoder {
    /// Appends `chunk` and returns every segment completed by it, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let scan_from = self.buf.len();
        self.buf.extend_from_slice(chunk);
        let mut segments = Vec::new();
        let mut start = 0;
        for idx in scan_from..self.buf.len() {
            if self.buf[idx] == RECORD_SEPARATOR {
                segments.push(self.buf[start..idx].to_vec());
                start = idx + 1;
            }
        }
        self.buf.drain(..start);
        segments
    }

    /// Takes whatever is left without a closing delimiter.
    pub fn take_remainder(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Result of decoding one framed segment.
#[derive(Debug)]
pub(crate) enum Segment {
    Event(WorkflowEvent),
    /// Whitespace-only segment (keep-alives, trailing newlines).
    Blank,
    Malformed(String),
}

pub(crate) fn decode_segment(bytes: &[u8]) -> Segment {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Segment::Blank;
    }
    match serde_json::from_slice::<WorkflowEvent>(bytes) {
        Ok(event) => Segment::Event(event),
        Err(e) => Segment::Malformed(e.to_string()),
    }
}
