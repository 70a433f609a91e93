//! Log stream reassembly
//!
//! Turns the chunked, lossy transport stream back into a ULog byte stream:
//! - sequence numbers are checked over the wrapping 16-bit space to suppress
//!   duplicates and stale deliveries and to count dropped chunks
//! - the 16-byte file header is copied verbatim from the first chunk
//! - gaps are papered over with a synthetic dropout record
//! - records that straddle chunk boundaries are buffered until complete

use std::io::Write;
use tracing::{debug, error, warn};

use crate::errors::{MavlogError, Result};
use crate::types::{LogChunk, NO_MESSAGE_START};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the ULog file header carried at the start of the first chunk
pub const HEADER_LEN: usize = 16;

/// Framing overhead of one ULog record (u16 size + u8 type)
pub const RECORD_HEADER_LEN: usize = 3;

/// Upper bound on dropped chunks represented by one dropout record
pub const MAX_DROPOUT_CHUNKS: u16 = 25;

/// Approximate milliseconds of data assumed lost per dropped chunk
pub const DROPOUT_MS_PER_CHUNK: u16 = 10;

/// ULog message type of a dropout record ('O')
const DROPOUT_MESSAGE_TYPE: u8 = b'O';

/// Half of the 16-bit sequence space; larger forward jumps are treated as reordering
const SEQUENCE_HALF_RANGE: u32 = 1 << 15;

/// Size of the 16-bit sequence space
const SEQUENCE_RANGE: u32 = 1 << 16;

// ----------------------------------------------------------------------------
// Sequence Check
// ----------------------------------------------------------------------------

/// Verdict on a chunk's sequence number relative to the last accepted one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Newer than the last chunk; `drops` chunks were lost in between
    Accepted { drops: u16 },
    /// Same sequence number as the last accepted chunk
    Duplicate,
    /// Older than the last chunk (reordered or stale delivery)
    Stale,
}

/// Classify `seq` against the last accepted sequence number.
///
/// A forward distance above 2^15 is assumed to be a late delivery rather than a
/// gap, and a backward distance above 2^15 is assumed to be a wraparound. Large
/// genuine gaps are therefore misread as reordering; the thresholds must stay
/// as they are for compatibility with existing captures.
pub fn check_sequence(last: Option<u16>, seq: u16) -> SequenceCheck {
    let Some(last) = last else {
        return SequenceCheck::Accepted { drops: 0 };
    };
    if seq == last {
        return SequenceCheck::Duplicate;
    }

    let (last, seq) = (u32::from(last), u32::from(seq));
    if seq > last {
        let distance = seq - last;
        if distance > SEQUENCE_HALF_RANGE {
            SequenceCheck::Stale
        } else {
            SequenceCheck::Accepted {
                drops: (distance - 1) as u16,
            }
        }
    } else if last - seq > SEQUENCE_HALF_RANGE {
        SequenceCheck::Accepted {
            drops: (SEQUENCE_RANGE - last - 1 + seq) as u16,
        }
    } else {
        SequenceCheck::Stale
    }
}

/// Build the placeholder record written in place of `drops` missing chunks
pub fn dropout_record(drops: u16) -> [u8; 5] {
    dropout_record_capped(drops, MAX_DROPOUT_CHUNKS)
}

/// Like [`dropout_record`] with a lower cap on the represented chunk count
pub fn dropout_record_capped(drops: u16, cap: u16) -> [u8; 5] {
    let duration_ms = drops.min(cap.min(MAX_DROPOUT_CHUNKS)) * DROPOUT_MS_PER_CHUNK;
    // u16 size (2), type, u16 duration; the duration always fits in the low byte
    [2, 0, DROPOUT_MESSAGE_TYPE, duration_ms as u8, 0]
}

/// Total length of the record starting at `data`, if its size prefix is present
fn framed_record_len(data: &[u8]) -> Option<usize> {
    if data.len() < RECORD_HEADER_LEN {
        return None;
    }
    Some(usize::from(u16::from_le_bytes([data[0], data[1]])) + RECORD_HEADER_LEN)
}

// ----------------------------------------------------------------------------
// Chunk Outcome
// ----------------------------------------------------------------------------

/// What a session did with a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The chunk was accepted; `drops` chunks before it were missing
    Processed { drops: u16 },
    /// Already seen; nothing written
    Duplicate,
    /// Reordered or stale; nothing written
    Stale,
}

// ----------------------------------------------------------------------------
// Reassembly Session
// ----------------------------------------------------------------------------

/// Reassembly state for one capture, writing into `sink`
#[derive(Debug)]
pub struct ReassemblySession<W: Write> {
    sink: Option<W>,
    bytes_written: u64,
    last_sequence: Option<u16>,
    drop_count: u64,
    header_received: bool,
    failed: bool,
    pending: Vec<u8>,
    dropout_cap: u16,
}

impl<W: Write> ReassemblySession<W> {
    /// Begin a session writing the reconstructed stream into `sink`
    pub fn new(sink: W) -> Self {
        Self {
            sink: Some(sink),
            bytes_written: 0,
            last_sequence: None,
            drop_count: 0,
            header_received: false,
            failed: false,
            pending: Vec::new(),
            dropout_cap: MAX_DROPOUT_CHUNKS,
        }
    }

    /// Limit the chunk count a single dropout record represents (at most 25)
    pub fn with_dropout_cap(mut self, cap: u16) -> Self {
        self.dropout_cap = cap.min(MAX_DROPOUT_CHUNKS);
        self
    }

    /// Total bytes written to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Chunks lost over the lifetime of the session
    pub fn drop_count(&self) -> u64 {
        self.drop_count
    }

    pub fn last_sequence(&self) -> Option<u16> {
        self.last_sequence
    }

    pub fn header_received(&self) -> bool {
        self.header_received
    }

    /// Whether a write or header error has ended the session
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Bytes of an incomplete record waiting for the next chunk
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one chunk into the session.
    ///
    /// Any error is terminal: the session stops writing and the caller is
    /// expected to close and discard it.
    pub fn process_chunk(&mut self, chunk: &LogChunk) -> Result<ChunkOutcome> {
        if self.failed {
            return Err(MavlogError::SessionFailed);
        }
        if self.sink.is_none() {
            return Err(MavlogError::SessionClosed);
        }

        let drops = match check_sequence(self.last_sequence, chunk.sequence) {
            SequenceCheck::Accepted { drops } => drops,
            SequenceCheck::Duplicate => {
                debug!(sequence = chunk.sequence, "Duplicate log chunk ignored");
                return Ok(ChunkOutcome::Duplicate);
            }
            SequenceCheck::Stale => {
                debug!(
                    sequence = chunk.sequence,
                    last = ?self.last_sequence,
                    "Stale log chunk ignored"
                );
                return Ok(ChunkOutcome::Stale);
            }
        };
        self.last_sequence = Some(chunk.sequence);
        self.drop_count += u64::from(drops);

        match self.consume(drops, chunk.first_message, &chunk.data) {
            Ok(()) => Ok(ChunkOutcome::Processed { drops }),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Close the session, returning the sink on the first call.
    ///
    /// A complete record still sitting in the pending buffer is written out
    /// before the sink is flushed. Later calls are no-ops.
    pub fn close(&mut self) -> Result<Option<W>> {
        if self.sink.is_none() {
            return Ok(None);
        }
        if !self.failed && !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            let leftover = self.write_records(&pending)?.len();
            if leftover > 0 {
                debug!(leftover, "Discarding incomplete record at end of log");
            }
        }
        self.pending.clear();

        let Some(mut sink) = self.sink.take() else {
            return Ok(None);
        };
        if !self.failed {
            sink.flush().map_err(MavlogError::SinkWrite)?;
        }
        debug!(
            bytes_written = self.bytes_written,
            drop_count = self.drop_count,
            "Reassembly session closed"
        );
        Ok(Some(sink))
    }

    // ------------------------------------------------------------------------
    // Chunk Processing
    // ------------------------------------------------------------------------

    fn consume(&mut self, drops: u16, first_message: u8, data: &[u8]) -> Result<()> {
        let mut payload = data;
        let mut offset = first_message;

        if !self.header_received {
            if payload.len() < HEADER_LEN {
                error!(len = payload.len(), "Corrupt log header, cancelling capture");
                return Err(MavlogError::CorruptHeader { len: payload.len() });
            }
            let (header, rest) = payload.split_at(HEADER_LEN);
            self.write(header)?;
            payload = rest;
            self.header_received = true;
            // The offset is not rebased onto the stripped payload. Only the
            // sentinel is special: the bytes right after the header start the
            // definitions section, so they are record-aligned.
            if offset == NO_MESSAGE_START {
                offset = 0;
            }
        }

        if drops > 0 {
            warn!(drops, "Log chunks dropped, writing dropout record");
            self.write(&dropout_record_capped(drops, self.dropout_cap))?;

            // A gap invalidates the record being assembled
            let pending = std::mem::take(&mut self.pending);
            self.write_records(&pending)?;

            if offset == NO_MESSAGE_START {
                return Ok(());
            }
            payload = skip(payload, offset);
            offset = 0;
        }

        if offset == NO_MESSAGE_START && !self.pending.is_empty() {
            self.pending.extend_from_slice(payload);
            return Ok(());
        }

        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.write(&pending)?;
            if offset != 0 {
                let tail = &payload[..usize::from(offset).min(payload.len())];
                self.write(tail)?;
            }
        }

        // With no record in progress, a chunk without a boundary is the
        // continuation of a record whose start was never seen
        if offset != 0 {
            payload = skip(payload, offset);
        }

        let rest = self.write_records(payload)?;
        self.pending = rest.to_vec();
        Ok(())
    }

    /// Write every complete record at the front of `data`, returning the rest
    fn write_records<'a>(&mut self, mut data: &'a [u8]) -> Result<&'a [u8]> {
        while let Some(len) = framed_record_len(data) {
            if len > data.len() {
                break;
            }
            let (record, rest) = data.split_at(len);
            self.write(record)?;
            data = rest;
        }
        Ok(data)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.failed {
            return Err(MavlogError::SessionFailed);
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(MavlogError::SessionClosed);
        };
        if let Err(e) = sink.write_all(bytes) {
            error!(len = bytes.len(), "Log file I/O error: {}", e);
            self.failed = true;
            return Err(MavlogError::SinkWrite(e));
        }
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}

fn skip(data: &[u8], count: u8) -> &[u8] {
    &data[usize::from(count).min(data.len())..]
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn header() -> Vec<u8> {
        (0u8..16).collect()
    }

    /// A complete record: u16 size, type byte, then `body_len` body bytes
    fn record(msg_type: u8, body_len: u16, fill: u8) -> Vec<u8> {
        let mut out = body_len.to_le_bytes().to_vec();
        out.push(msg_type);
        out.extend(std::iter::repeat(fill).take(usize::from(body_len)));
        out
    }

    fn session() -> ReassemblySession<Vec<u8>> {
        ReassemblySession::new(Vec::new())
    }

    fn output(mut session: ReassemblySession<Vec<u8>>) -> Vec<u8> {
        session.close().unwrap().unwrap()
    }

    /// Sink that fails every write after `limit` bytes
    struct FailingSink {
        written: Vec<u8>,
        limit: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.limit {
                return Err(io::Error::other("disk full"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_first_sequence_is_accepted() {
        assert_eq!(
            check_sequence(None, 1234),
            SequenceCheck::Accepted { drops: 0 }
        );
    }

    #[test]
    fn test_duplicate_sequence() {
        assert_eq!(check_sequence(Some(10), 10), SequenceCheck::Duplicate);
    }

    #[test]
    fn test_forward_gap() {
        assert_eq!(
            check_sequence(Some(10), 11),
            SequenceCheck::Accepted { drops: 0 }
        );
        assert_eq!(
            check_sequence(Some(10), 15),
            SequenceCheck::Accepted { drops: 4 }
        );
        assert_eq!(
            check_sequence(Some(0), 32768),
            SequenceCheck::Accepted { drops: 32767 }
        );
        assert_eq!(check_sequence(Some(0), 32769), SequenceCheck::Stale);
    }

    #[test]
    fn test_wraparound() {
        assert_eq!(
            check_sequence(Some(65530), 3),
            SequenceCheck::Accepted { drops: 8 }
        );
        assert_eq!(
            check_sequence(Some(65535), 0),
            SequenceCheck::Accepted { drops: 0 }
        );
    }

    #[test]
    fn test_reordering() {
        assert_eq!(check_sequence(Some(100), 50), SequenceCheck::Stale);
        assert_eq!(check_sequence(Some(40000), 7232), SequenceCheck::Stale);
    }

    #[test]
    fn test_dropout_record_is_capped() {
        assert_eq!(dropout_record(1), [2, 0, b'O', 10, 0]);
        assert_eq!(dropout_record(25), [2, 0, b'O', 250, 0]);
        assert_eq!(dropout_record(40), [2, 0, b'O', 250, 0]);
        assert_eq!(dropout_record_capped(40, 5), [2, 0, b'O', 50, 0]);
        assert_eq!(dropout_record_capped(40, 90), [2, 0, b'O', 250, 0]);
    }

    #[test]
    fn test_header_written_once() {
        let mut session = session();
        let mut data = header();
        data.extend(record(b'I', 4, 0xAA));

        let outcome = session.process_chunk(&LogChunk::new(0, 0, data.clone())).unwrap();
        assert_eq!(outcome, ChunkOutcome::Processed { drops: 0 });
        assert!(session.header_received());
        assert_eq!(session.bytes_written(), data.len() as u64);
        assert_eq!(output(session), data);
    }

    #[test]
    fn test_short_first_chunk_is_corrupt_header() {
        let mut session = session();
        let err = session
            .process_chunk(&LogChunk::new(0, 0, vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, MavlogError::CorruptHeader { len: 3 }));
        assert!(session.is_failed());
        assert_eq!(session.bytes_written(), 0);

        // Terminal: later chunks are refused without writing
        let err = session
            .process_chunk(&LogChunk::new(1, 0, header()))
            .unwrap_err();
        assert!(matches!(err, MavlogError::SessionFailed));
        assert_eq!(session.bytes_written(), 0);
    }

    #[test]
    fn test_duplicate_and_stale_chunks_write_nothing() {
        let mut session = session();
        session.process_chunk(&LogChunk::new(5, 0, header())).unwrap();
        let written = session.bytes_written();

        let dup = session.process_chunk(&LogChunk::new(5, 0, record(b'A', 2, 1))).unwrap();
        assert_eq!(dup, ChunkOutcome::Duplicate);
        let stale = session.process_chunk(&LogChunk::new(3, 0, record(b'A', 2, 1))).unwrap();
        assert_eq!(stale, ChunkOutcome::Stale);

        assert_eq!(session.bytes_written(), written);
        assert_eq!(session.last_sequence(), Some(5));
    }

    #[test]
    fn test_record_split_across_chunks() {
        let mut session = session();
        let big = record(b'D', 20, 0x55);
        let next = record(b'D', 2, 0x66);

        let mut first = header();
        first.extend_from_slice(&big[..10]);
        session.process_chunk(&LogChunk::new(0, 0, first)).unwrap();
        assert_eq!(session.pending_len(), 10);

        // Middle of the record: no boundary in this chunk
        session
            .process_chunk(&LogChunk::new(1, NO_MESSAGE_START, big[10..18].to_vec()))
            .unwrap();
        assert_eq!(session.pending_len(), 18);

        // Tail of the record, then a new record at offset 5
        let mut last = big[18..].to_vec();
        assert_eq!(last.len(), 5);
        last.extend_from_slice(&next);
        session.process_chunk(&LogChunk::new(2, 5, last)).unwrap();
        assert_eq!(session.pending_len(), 0);

        let mut expected = header();
        expected.extend_from_slice(&big);
        expected.extend_from_slice(&next);
        assert_eq!(output(session), expected);
    }

    #[test]
    fn test_multiple_records_in_one_chunk() {
        let mut session = session();
        let mut data = header();
        for i in 0..4 {
            data.extend(record(b'D', 3, i));
        }
        session.process_chunk(&LogChunk::new(0, 0, data.clone())).unwrap();
        assert_eq!(session.pending_len(), 0);
        assert_eq!(output(session), data);
    }

    #[test]
    fn test_gap_writes_single_dropout_and_discards_partial() {
        let mut session = session();
        let partial = record(b'D', 30, 0x11);
        let mut first = header();
        first.extend_from_slice(&partial[..10]);
        session.process_chunk(&LogChunk::new(0, 0, first)).unwrap();

        // 40 chunks lost; the new chunk starts with 4 bytes of an unknown record
        let fresh = record(b'D', 2, 0x22);
        let mut data = vec![0xEE; 4];
        data.extend_from_slice(&fresh);
        let outcome = session.process_chunk(&LogChunk::new(41, 4, data)).unwrap();
        assert_eq!(outcome, ChunkOutcome::Processed { drops: 40 });
        assert_eq!(session.drop_count(), 40);

        let mut expected = header();
        expected.extend_from_slice(&[2, 0, b'O', 250, 0]);
        expected.extend_from_slice(&fresh);
        assert_eq!(output(session), expected);
    }

    #[test]
    fn test_gap_with_no_boundary_drops_chunk() {
        let mut session = session();
        session.process_chunk(&LogChunk::new(0, 0, header())).unwrap();
        session
            .process_chunk(&LogChunk::new(3, NO_MESSAGE_START, vec![9; 40]))
            .unwrap();

        let mut expected = header();
        expected.extend_from_slice(&dropout_record(2));
        assert_eq!(output(session), expected);
    }

    #[test]
    fn test_orphan_continuation_is_dropped() {
        let mut session = session();
        let mut first = header();
        first.extend(record(b'D', 1, 7));
        session.process_chunk(&LogChunk::new(0, 0, first.clone())).unwrap();

        session
            .process_chunk(&LogChunk::new(1, NO_MESSAGE_START, vec![1, 2, 3, 4]))
            .unwrap();
        assert_eq!(output(session), first);
    }

    #[test]
    fn test_sink_failure_is_sticky() {
        let sink = FailingSink {
            written: Vec::new(),
            limit: HEADER_LEN + 2,
        };
        let mut session = ReassemblySession::new(sink);
        let mut data = header();
        data.extend(record(b'D', 8, 1));

        let err = session.process_chunk(&LogChunk::new(0, 0, data)).unwrap_err();
        assert!(matches!(err, MavlogError::SinkWrite(_)));
        assert!(session.is_failed());
        assert_eq!(session.bytes_written(), HEADER_LEN as u64);

        let err = session
            .process_chunk(&LogChunk::new(1, 0, record(b'D', 1, 1)))
            .unwrap_err();
        assert!(matches!(err, MavlogError::SessionFailed));

        let sink = session.close().unwrap().unwrap();
        assert_eq!(sink.written.len(), HEADER_LEN);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = session();
        session.process_chunk(&LogChunk::new(0, 0, header())).unwrap();
        assert!(session.close().unwrap().is_some());
        assert!(!session.is_open());
        assert!(session.close().unwrap().is_none());

        let err = session.process_chunk(&LogChunk::new(1, 0, header())).unwrap_err();
        assert!(matches!(err, MavlogError::SessionClosed));
        assert_eq!(session.bytes_written(), HEADER_LEN as u64);
    }

    #[test]
    fn test_close_flushes_completed_pending_record() {
        let mut session = session();
        let rec = record(b'D', 20, 3);
        let mut first = header();
        first.extend_from_slice(&rec[..8]);
        session.process_chunk(&LogChunk::new(0, 0, first)).unwrap();
        session
            .process_chunk(&LogChunk::new(1, NO_MESSAGE_START, rec[8..].to_vec()))
            .unwrap();
        assert_eq!(session.bytes_written(), HEADER_LEN as u64);

        let mut expected = header();
        expected.extend_from_slice(&rec);
        assert_eq!(output(session), expected);
    }
}
