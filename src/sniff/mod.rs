//! Content-based format sniffing.
//!
//! On constrained devices and network streams the encoded format of an
//! audio byte stream often has to be inferred from its content: file
//! extensions are missing and MIME headers unreliable. [`FormatSniffer`]
//! classifies a byte prefix by running an ordered registry of label /
//! predicate pairs over it (first match wins) and reports the result
//! through an accessor and an optional notification callback.
//!
//! The sniffer sits beside the playback pipeline, not in it: [`feed`]
//! inspects only the first chunk after a [`reset`] and is a pure
//! pass-through afterwards, so it can tap the hot copy path at no cost.
//!
//! ```
//! use tonearm::sniff::{labels, FormatSniffer};
//!
//! let sniffer = FormatSniffer::new();
//! assert_eq!(sniffer.classify(b"OggS\0\0\0\0"), Some(labels::OGG));
//! assert_eq!(sniffer.classify(b"RIFF....WAVEfmt "), Some(labels::WAVE));
//! ```
//!
//! [`feed`]: FormatSniffer::feed
//! [`reset`]: FormatSniffer::reset

pub mod adts;
pub mod mpeg;

use tracing::debug;

/// Labels produced by the built-in checks.
pub mod labels {
    /// RIFF/WAVE container.
    pub const WAVE: &str = "container/wave";
    /// Ogg container.
    pub const OGG: &str = "container/ogg";
    /// MPEG transport stream.
    pub const MPEG_TS: &str = "stream/mpeg-ts";
    /// Commodore 64 SID tune.
    pub const SID: &str = "chiptune/sid";
    /// MP4/M4A container.
    pub const M4A: &str = "container/m4a";
    /// MPEG audio (MP3 and friends).
    pub const MPEG: &str = "audio/mpeg";
    /// AAC, raw ADTS or MP4-flavored.
    pub const AAC: &str = "audio/aac";
}

/// A registered content predicate.
pub type CheckFn = Box<dyn Fn(&[u8]) -> bool + Send>;

struct Check {
    label: String,
    check: CheckFn,
}

/// Classifies byte streams by their content.
///
/// The registry is ordered and order is significant: [`classify`] returns
/// the label of the *first* matching predicate, so earlier entries take
/// precedence over later ones. Re-registering an existing label replaces
/// its predicate in place without changing its position.
///
/// [`classify`]: FormatSniffer::classify
pub struct FormatSniffer {
    checks: Vec<Check>,
    default_label: Option<String>,
    detected: Option<String>,
    sniffed: bool,
    on_detect: Option<Box<dyn FnMut(&str) + Send>>,
}

impl Default for FormatSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatSniffer {
    /// Creates a sniffer with the built-in checks registered.
    ///
    /// Registration order fixes precedence: WAVE, Ogg, MPEG-TS, SID, M4A,
    /// MPEG audio, AAC. In particular MPEG audio is checked before AAC, so
    /// input that could be read as either comes back as [`labels::MPEG`].
    /// That tie-break is deliberately lossy: sync words of the two formats
    /// can collide and downstream behavior depends on MPEG winning.
    pub fn new() -> Self {
        let mut sniffer = Self::bare();
        sniffer.register_check(labels::WAVE, |data: &[u8]| data.starts_with(b"RIFF"));
        sniffer.register_check(labels::OGG, |data: &[u8]| data.starts_with(b"OggS"));
        sniffer.register_check(labels::MPEG_TS, is_mpeg_ts);
        sniffer.register_check(labels::SID, is_sid);
        sniffer.register_check(labels::M4A, is_m4a);
        sniffer.register_check(labels::MPEG, mpeg::is_valid);
        sniffer.register_check(labels::AAC, is_aac);
        sniffer
    }

    /// Creates a sniffer with an empty registry.
    pub fn bare() -> Self {
        Self {
            checks: Vec::new(),
            default_label: None,
            detected: None,
            sniffed: false,
            on_detect: None,
        }
    }

    /// Adds or replaces the check for `label`.
    ///
    /// A new label is appended to the end of the registry; an existing one
    /// keeps its position and gets the new predicate.
    pub fn register_check(
        &mut self,
        label: impl Into<String>,
        check: impl Fn(&[u8]) -> bool + Send + 'static,
    ) {
        let label = label.into();
        match self.checks.iter_mut().find(|c| c.label == label) {
            Some(existing) => existing.check = Box::new(check),
            None => self.checks.push(Check {
                label,
                check: Box::new(check),
            }),
        }
    }

    /// Label reported when no check matches. Unset by default, meaning
    /// "unknown": [`classify`](FormatSniffer::classify) returns `None`.
    pub fn set_default_label(&mut self, label: impl Into<String>) {
        self.default_label = Some(label.into());
    }

    /// Registers a callback invoked with the detected label, at most once
    /// per [`reset`](FormatSniffer::reset) cycle.
    pub fn set_detect_callback(&mut self, callback: impl FnMut(&str) + Send + 'static) {
        self.on_detect = Some(Box::new(callback));
    }

    /// Re-arms the sniffer for the next stream.
    pub fn reset(&mut self) {
        self.sniffed = false;
        self.detected = None;
    }

    /// Observes a chunk of the stream; returns its length.
    ///
    /// Only the first chunk after a [`reset`](FormatSniffer::reset) is
    /// inspected. Later calls pass through untouched and never change the
    /// stored result, however different their bytes look.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        if !self.sniffed {
            self.sniffed = true;
            self.detected = self.classify(data).map(str::to_owned);
            match self.detected.as_deref() {
                Some(label) => {
                    debug!(label, len = data.len(), "format detected");
                    if let Some(callback) = self.on_detect.as_mut() {
                        callback(label);
                    }
                }
                None => debug!(len = data.len(), "no format match"),
            }
        }
        data.len()
    }

    /// Runs the registry over `data` in registration order.
    ///
    /// Returns the first matching label, the default label when nothing
    /// matches, or `None` when there is no default either.
    pub fn classify(&self, data: &[u8]) -> Option<&str> {
        self.checks
            .iter()
            .find(|c| (c.check)(data))
            .map(|c| c.label.as_str())
            .or(self.default_label.as_deref())
    }

    /// The label stored by the first [`feed`](FormatSniffer::feed) of the
    /// current cycle.
    pub fn detected(&self) -> Option<&str> {
        self.detected.as_deref()
    }
}

/// MPEG transport stream: sync byte, confirmed one packet (188 bytes) later
/// when the buffer reaches that far.
fn is_mpeg_ts(data: &[u8]) -> bool {
    if data.len() < 189 {
        return data.first() == Some(&0x47);
    }
    data[0] == 0x47 && data[188] == 0x47
}

fn is_sid(data: &[u8]) -> bool {
    data.starts_with(b"PSID") || data.starts_with(b"RSID")
}

fn is_m4a(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    // an mp3 with a leading ID3 tag is not an MP4 container
    if data.starts_with(b"ID3") {
        return false;
    }
    // a prefix taken mid-file (positioned past the moov box) no longer
    // starts with an atom we know; anything that is not an mdat atom counts
    // as a match
    if &data[4..8] != b"mdat" {
        return true;
    }
    // otherwise insist on an ftyp atom with a known major brand
    &data[4..8] == b"ftyp" && matches!(&data[8..12], b"M4A " | b"mp42" | b"isom")
}

fn is_aac(data: &[u8]) -> bool {
    // MP4-contained AAC announces itself with an ftyp brand
    if data.len() >= 11 && &data[4..11] == b"ftypM4A" {
        return true;
    }
    // raw streams: an ADTS sync word, as long as the same bytes do not also
    // read as a legal MPEG audio frame (those go to audio/mpeg)
    match adts::find_sync_word(data) {
        Some(pos) => !mpeg::is_valid(&data[pos..]),
        None => false,
    }
}
