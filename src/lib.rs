//! Audio playback plumbing for streams that arrive as bare bytes.
//!
//! `tonearm` solves the two problems that dominate embedded and streaming
//! playback once the codec math is taken off the table:
//!
//! * **What is this stream?** File extensions and MIME headers are missing
//!   or wrong often enough on constrained devices that the format has to be
//!   read out of the bytes themselves. [`FormatSniffer`] classifies a byte
//!   prefix through an ordered registry of content predicates; see
//!   [`sniff`].
//! * **Who moves the bytes, and when?** [`Player`] wires a pipeline from a
//!   [`MediaSource`] through a [`Decoder`] and the volume/fade stages into
//!   an [`AudioSink`], and drives it from a cooperative tick loop: volume,
//!   click-free transitions, metadata extraction and automatic playlist
//!   advancement all happen inside [`Player::copy`] calls; see [`player`].
//!
//! Codecs, physical outputs and real playlist backends stay outside the
//! crate, behind the [`Decoder`], [`AudioSink`] and [`MediaSource`] traits.
//!
//! # Example
//!
//! ```
//! use tonearm::{FormatSniffer, MemorySink, MemorySource, PassthroughDecoder, Player};
//!
//! let mut source = MemorySource::new();
//! source.add_track("a.wav", b"RIFF....WAVEfmt data".to_vec());
//!
//! let mut player = Player::new(source, PassthroughDecoder::new(), MemorySink::new());
//! player.set_sniffer(FormatSniffer::new());
//!
//! assert!(player.start(0));
//! player.copy_all();
//!
//! assert_eq!(player.sniffer().unwrap().detected(), Some("container/wave"));
//! assert!(!player.output().is_empty());
//! ```
//!
//! The crate is single-threaded by design: no internal threads, no async.
//! One external loop calls [`Player::copy`] often enough to keep the output
//! fed, and every control operation takes effect on the next tick.

#![forbid(unsafe_code)]

mod common;
mod error;

pub mod copier;
pub mod decoder;
pub mod fade;
pub mod meta;
pub mod player;
pub mod sink;
pub mod sniff;
pub mod source;
pub mod volume;

pub use common::{AudioFormat, ChannelCount, SampleRate};
pub use copier::Copier;
pub use decoder::{DecodeSink, Decoder, PassthroughDecoder};
pub use error::Error;
pub use fade::Fade;
pub use meta::{Id3Scanner, MetadataCallback, MetadataParser, TagKind};
pub use player::{PlaybackPhase, Player};
pub use sink::{AudioSink, MemorySink};
pub use sniff::FormatSniffer;
pub use source::{DirSource, MediaSource, MediaStream, MemorySource};
pub use volume::{LinearVolumeControl, SquaredVolumeControl, Volume, VolumeControl};
