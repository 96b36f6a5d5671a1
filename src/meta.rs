//! Metadata extraction contract and a compact ID3 reference implementation.
//!
//! The orchestrator does not parse tags itself. It mirrors raw source bytes
//! into a [`MetadataParser`], but only when the source has declined
//! ownership of metadata handling (an internet-radio source with in-band
//! metadata keeps the callback for itself; see
//! [`MediaSource::register_metadata_callback`]).
//!
//! [`MediaSource::register_metadata_callback`]: crate::MediaSource::register_metadata_callback

use tracing::debug;

/// Kind of a textual tag reported through the metadata callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Title,
    Artist,
    Album,
    Genre,
}

/// Receives `(kind, text)` for every extracted tag.
pub type MetadataCallback = Box<dyn FnMut(TagKind, &str) + Send>;

/// Consumes raw stream bytes and emits tag callbacks.
pub trait MetadataParser: Send {
    /// Prepares the parser for a fresh stream.
    fn begin(&mut self) {}

    /// Finishes the current stream.
    fn end(&mut self) {}

    /// Observes a chunk of raw (pre-decode) stream bytes.
    fn write(&mut self, data: &[u8]);

    /// Registers the tag callback.
    fn set_callback(&mut self, callback: MetadataCallback);
}

const ID3_HEADER_LEN: usize = 10;
const FRAME_HEADER_LEN: usize = 10;

/// Default accumulation cap in bytes.
pub const DEFAULT_META_SIZE: usize = 1024;

#[derive(Debug, PartialEq, Eq)]
enum ScanState {
    Gathering,
    Done,
}

/// Extracts the common text frames (TIT2/TPE1/TALB/TCON) from an ID3v2.3
/// or v2.4 tag at the start of a stream.
///
/// A reference implementation of [`MetadataParser`], not a tag library:
/// accumulation is capped, UTF-16 encodings and unsynchronised tags are
/// skipped, and anything unparseable is dropped silently. Each tag of a
/// stream is emitted at most once.
pub struct Id3Scanner {
    callback: Option<MetadataCallback>,
    buffer: Vec<u8>,
    max_size: usize,
    state: ScanState,
}

impl Default for Id3Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Id3Scanner {
    /// Creates a scanner with the default accumulation cap.
    pub fn new() -> Self {
        Self {
            callback: None,
            buffer: Vec::new(),
            max_size: DEFAULT_META_SIZE,
            state: ScanState::Gathering,
        }
    }

    /// Changes the accumulation cap. Tags larger than the cap are parsed up
    /// to the cap; frames beyond it are lost.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(ID3_HEADER_LEN);
    }

    /// Bytes still needed before the buffered tag can be parsed, or `None`
    /// when the tag header is not complete yet.
    fn target_len(&self) -> Option<usize> {
        if self.buffer.len() < ID3_HEADER_LEN {
            return None;
        }
        let size = syncsafe(&self.buffer[6..10]);
        Some((ID3_HEADER_LEN + size).min(self.max_size))
    }

    fn parse(&mut self) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        let buffer = &self.buffer;
        let version = buffer[3];
        let flags = buffer[5];
        if flags & 0xC0 != 0 {
            // unsynchronised or extended-header tags are out of scope here
            debug!(flags, "skipping ID3 tag with unsupported layout");
            return;
        }

        let mut pos = ID3_HEADER_LEN;
        while pos + FRAME_HEADER_LEN <= buffer.len() {
            let id = &buffer[pos..pos + 4];
            if id[0] == 0 {
                break; // padding
            }
            let size_bytes = &buffer[pos + 4..pos + 8];
            let size = if version >= 4 {
                syncsafe(size_bytes)
            } else {
                u32::from_be_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
                    as usize
            };
            let body_start = pos + FRAME_HEADER_LEN;
            if size == 0 || body_start + size > buffer.len() {
                break;
            }
            let kind = match id {
                b"TIT2" => Some(TagKind::Title),
                b"TPE1" => Some(TagKind::Artist),
                b"TALB" => Some(TagKind::Album),
                b"TCON" => Some(TagKind::Genre),
                _ => None,
            };
            if let Some(kind) = kind {
                if let Some(text) = decode_text(&buffer[body_start..body_start + size]) {
                    callback(kind, text.trim_end_matches('\0'));
                }
            }
            pos = body_start + size;
        }
    }
}

impl MetadataParser for Id3Scanner {
    fn begin(&mut self) {
        self.buffer.clear();
        self.state = ScanState::Gathering;
    }

    fn write(&mut self, data: &[u8]) {
        if self.state == ScanState::Done {
            return;
        }
        let room = self.max_size.saturating_sub(self.buffer.len());
        self.buffer.extend_from_slice(&data[..data.len().min(room)]);

        if self.buffer.len() >= 3 && !self.buffer.starts_with(b"ID3") {
            self.state = ScanState::Done;
            return;
        }
        let Some(target) = self.target_len() else {
            return;
        };
        if self.buffer.len() >= target {
            self.parse();
            self.state = ScanState::Done;
        }
    }

    fn set_callback(&mut self, callback: MetadataCallback) {
        self.callback = Some(callback);
    }
}

/// 28-bit syncsafe integer: four bytes, high bit of each unused.
fn syncsafe(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | (b & 0x7F) as usize)
}

/// Decodes a text-frame body: one encoding byte, then the text. Latin-1 and
/// UTF-8 are supported; UTF-16 flavors are skipped.
fn decode_text(body: &[u8]) -> Option<String> {
    let (&encoding, text) = body.split_first()?;
    match encoding {
        0 => Some(text.iter().map(|&b| b as char).collect()),
        3 => Some(String::from_utf8_lossy(text).into_owned()),
        other => {
            debug!(encoding = other, "skipping text frame encoding");
            None
        }
    }
}
