//! Bounded byte transfer from a stream into the sink chain.

use std::io::Read;

use tracing::{debug, trace};

use crate::sink::AudioSink;

/// Default transfer buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Moves bytes from a [`Read`] stream into an [`AudioSink`] in bounded
/// steps.
///
/// The copier owns the transfer buffer but not the endpoints: the
/// orchestrator passes its current stream and pipeline into every call,
/// which is what lets navigation rewire the pipeline onto a new stream
/// between ticks. An optional per-call tap sees every raw chunk before it
/// enters the sink, the hook used for metadata mirroring and format
/// sniffing.
pub struct Copier {
    buffer: Vec<u8>,
}

impl Default for Copier {
    fn default() -> Self {
        Self::new()
    }
}

impl Copier {
    /// Creates a copier with the default buffer size.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a copier with a custom buffer size.
    pub fn with_buffer_size(size: usize) -> Self {
        Self {
            buffer: vec![0; size.max(1)],
        }
    }

    /// The per-step transfer size in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Resizes the transfer buffer.
    pub fn resize(&mut self, size: usize) {
        self.buffer.resize(size.max(1), 0);
    }

    /// Copies one buffer's worth of bytes. Returns the number read.
    pub fn copy(
        &mut self,
        from: &mut dyn Read,
        to: &mut dyn AudioSink,
        tap: Option<&mut dyn FnMut(&[u8])>,
    ) -> usize {
        let max = self.buffer_size();
        self.copy_bytes(from, to, max, tap)
    }

    /// Copies up to `max` bytes. Returns the number read from the stream.
    ///
    /// Read errors are logged and reported as end-of-data; a sink that
    /// stops accepting mid-chunk ends the step early.
    pub fn copy_bytes(
        &mut self,
        from: &mut dyn Read,
        to: &mut dyn AudioSink,
        max: usize,
        mut tap: Option<&mut dyn FnMut(&[u8])>,
    ) -> usize {
        let mut transferred = 0;
        while transferred < max {
            let want = (max - transferred).min(self.buffer.len());
            let got = match from.read(&mut self.buffer[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    debug!(%err, "stream read failed, treating as end of data");
                    break;
                }
            };
            transferred += got;

            let chunk = &self.buffer[..got];
            if let Some(tap) = tap.as_deref_mut() {
                tap(chunk);
            }

            let mut written = 0;
            while written < got {
                let accepted = to.write(&chunk[written..]);
                if accepted == 0 {
                    trace!(
                        dropped = got - written,
                        "sink stopped accepting mid-chunk"
                    );
                    return transferred;
                }
                written += accepted;
            }
        }
        transferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::io::Cursor;

    #[test]
    fn copies_in_bounded_steps() {
        let data: Vec<u8> = (0..100).collect();
        let mut from = Cursor::new(data.clone());
        let mut to = MemorySink::new();
        let mut copier = Copier::with_buffer_size(16);

        assert_eq!(copier.copy(&mut from, &mut to, None), 16);
        assert_eq!(copier.copy_bytes(&mut from, &mut to, 100, None), 84);
        assert_eq!(copier.copy(&mut from, &mut to, None), 0);
        assert_eq!(to.data(), &data[..]);
    }

    #[test]
    fn tap_sees_every_chunk() {
        let mut from = Cursor::new(vec![7u8; 40]);
        let mut to = MemorySink::new();
        let mut copier = Copier::with_buffer_size(16);

        let mut tapped = Vec::new();
        let mut tap = |chunk: &[u8]| tapped.extend_from_slice(chunk);
        copier.copy_bytes(&mut from, &mut to, 40, Some(&mut tap));
        assert_eq!(tapped, vec![7u8; 40]);
    }

    #[test]
    fn full_sink_ends_the_step() {
        let mut from = Cursor::new(vec![1u8; 64]);
        let mut to = MemorySink::with_capacity(10);
        let mut copier = Copier::with_buffer_size(16);

        let read = copier.copy_bytes(&mut from, &mut to, 64, None);
        assert_eq!(to.len(), 10);
        // the first chunk was read even though only part of it fit
        assert_eq!(read, 16);
    }
}
