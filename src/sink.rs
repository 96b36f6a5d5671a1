//! The sink end of the playback chain.
//!
//! Every stage of the pipeline (decode, volume, fade) implements
//! [`AudioSink`] and wraps the next stage, so the whole chain is itself a
//! sink the copier can write raw source bytes into.

use crate::common::AudioFormat;

/// A byte sink at the end (or in the middle) of the playback chain.
///
/// Writes are infallible: a sink that cannot accept data reports it through
/// [`available_for_write`](AudioSink::available_for_write) and by accepting
/// fewer bytes, never through an error. The orchestrator turns "no space"
/// into backpressure.
pub trait AudioSink {
    /// Writes `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Free space in bytes. `usize::MAX` means unbounded.
    fn available_for_write(&self) -> usize {
        usize::MAX
    }

    /// The format this sink currently expects.
    fn format(&self) -> AudioFormat;

    /// Called when the upstream decoder announces a new stream format.
    fn set_format(&mut self, format: AudioFormat);

    /// Writes `len` bytes of silence, returning how many were accepted.
    fn write_silence(&mut self, len: usize) -> usize {
        const ZEROS: [u8; 256] = [0; 256];
        let mut written = 0;
        while written < len {
            let chunk = (len - written).min(ZEROS.len());
            let accepted = self.write(&ZEROS[..chunk]);
            written += accepted;
            if accepted < chunk {
                break;
            }
        }
        written
    }
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn write(&mut self, buf: &[u8]) -> usize {
        (**self).write(buf)
    }

    fn available_for_write(&self) -> usize {
        (**self).available_for_write()
    }

    fn format(&self) -> AudioFormat {
        (**self).format()
    }

    fn set_format(&mut self, format: AudioFormat) {
        (**self).set_format(format)
    }

    fn write_silence(&mut self, len: usize) -> usize {
        (**self).write_silence(len)
    }
}

/// In-memory sink, optionally capacity-bounded.
///
/// Bounded instances report real free space from
/// [`available_for_write`](AudioSink::available_for_write) and accept only
/// what fits, which makes them the natural stand-in for a hardware output
/// in tests of the orchestrator's backpressure and silence policies.
#[derive(Debug, Default)]
pub struct MemorySink {
    data: Vec<u8>,
    capacity: Option<usize>,
    format: AudioFormat,
}

impl MemorySink {
    /// Creates an unbounded sink with the default format.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that accepts at most `capacity` bytes until drained.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Everything written so far.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discards buffered bytes, freeing capacity on bounded sinks.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Consumes the sink and returns its contents.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, buf: &[u8]) -> usize {
        let accepted = buf.len().min(self.available_for_write());
        self.data.extend_from_slice(&buf[..accepted]);
        accepted
    }

    fn available_for_write(&self) -> usize {
        match self.capacity {
            Some(cap) => cap.saturating_sub(self.data.len()),
            None => usize::MAX,
        }
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn set_format(&mut self, format: AudioFormat) {
        self.format = format;
    }
}
