//! The source side of the pipeline: something that enumerates playable
//! items and opens byte streams onto them.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::Error;
use crate::meta::MetadataCallback;

/// Byte stream for one playable item.
pub type MediaStream = Box<dyn Read + Send>;

/// Default inactivity window before the orchestrator auto-advances.
pub const DEFAULT_AUTO_ADVANCE_TIMEOUT: Duration = Duration::from_millis(500);

/// Enumerates playable items and opens streams onto them.
///
/// All selection methods return `None` when no item exists at the requested
/// position. That is an expected condition (empty playlist, end of album),
/// not an error. The orchestrator reacts by going inactive.
pub trait MediaSource {
    /// Called once when playback starts, before the first selection.
    fn begin(&mut self) {}

    /// Opens the item at `index`.
    fn stream_by_index(&mut self, index: usize) -> Option<MediaStream>;

    /// Opens the item named `path` without disturbing enumeration order.
    fn stream_by_path(&mut self, path: &str) -> Option<MediaStream>;

    /// Moves by `offset` items (negative moves backwards) and opens the
    /// item there.
    fn next_stream(&mut self, offset: i64) -> Option<MediaStream>;

    /// Moves back by `offset` items and opens the item there.
    fn previous_stream(&mut self, offset: i64) -> Option<MediaStream> {
        self.next_stream(-offset.abs())
    }

    /// Whether the orchestrator should advance automatically when a stream
    /// runs dry.
    fn is_auto_advance(&self) -> bool {
        true
    }

    /// Inactivity window after which the orchestrator considers the current
    /// stream exhausted.
    fn auto_advance_timeout(&self) -> Duration {
        DEFAULT_AUTO_ADVANCE_TIMEOUT
    }

    /// Offers the metadata callback to the source.
    ///
    /// A source that handles metadata itself (in-band tags on a network
    /// stream, say) keeps the callback and returns `None`; the orchestrator
    /// then stays out of metadata entirely. The default declines by handing
    /// the callback back.
    fn register_metadata_callback(
        &mut self,
        callback: MetadataCallback,
    ) -> Option<MetadataCallback> {
        Some(callback)
    }
}

/// In-memory source: a list of named byte buffers.
///
/// The reference source for tests, docs and embedded assets. Auto-advance
/// policy and timeout are configurable so tests can exercise the
/// orchestrator's timing behavior.
pub struct MemorySource {
    tracks: Vec<(String, Arc<[u8]>)>,
    position: usize,
    auto_advance: bool,
    timeout: Duration,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            position: 0,
            auto_advance: true,
            timeout: DEFAULT_AUTO_ADVANCE_TIMEOUT,
        }
    }

    /// Appends a named track.
    pub fn add_track(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.tracks.push((name.into(), data.into().into()));
        self
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True when the source holds no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Index of the current track.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Overrides the auto-advance policy reported to the orchestrator.
    pub fn set_auto_advance(&mut self, auto_advance: bool) {
        self.auto_advance = auto_advance;
    }

    /// Overrides the auto-advance timeout reported to the orchestrator.
    pub fn set_auto_advance_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn open(&mut self, index: usize) -> Option<MediaStream> {
        let (_, data) = self.tracks.get(index)?;
        let stream = Cursor::new(data.clone());
        self.position = index;
        Some(Box::new(stream))
    }
}

impl MediaSource for MemorySource {
    fn stream_by_index(&mut self, index: usize) -> Option<MediaStream> {
        self.open(index)
    }

    fn stream_by_path(&mut self, path: &str) -> Option<MediaStream> {
        let index = self.tracks.iter().position(|(name, _)| name == path)?;
        self.open(index)
    }

    fn next_stream(&mut self, offset: i64) -> Option<MediaStream> {
        let target = self.position as i64 + offset;
        if target < 0 || target >= self.tracks.len() as i64 {
            return None;
        }
        self.open(target as usize)
    }

    fn is_auto_advance(&self) -> bool {
        self.auto_advance
    }

    fn auto_advance_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Directory-backed source: every regular file in one directory, in
/// lexicographic order.
pub struct DirSource {
    files: Vec<PathBuf>,
    position: usize,
}

impl DirSource {
    /// Enumerates `dir`. Fails when `dir` cannot be read or is not a
    /// directory; individual files failing to open later only log a
    /// warning.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::NotADirectory(dir.to_path_buf()));
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(Self { files, position: 0 })
    }

    /// Number of files found at construction.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when the directory held no regular files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn open(&mut self, index: usize) -> Option<MediaStream> {
        let path = self.files.get(index)?;
        match File::open(path) {
            Ok(file) => {
                self.position = index;
                Some(Box::new(file))
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to open file");
                None
            }
        }
    }
}

impl MediaSource for DirSource {
    fn stream_by_index(&mut self, index: usize) -> Option<MediaStream> {
        self.open(index)
    }

    fn stream_by_path(&mut self, path: &str) -> Option<MediaStream> {
        let index = self
            .files
            .iter()
            .position(|p| p == Path::new(path) || p.file_name().is_some_and(|n| n == path))?;
        self.open(index)
    }

    fn next_stream(&mut self, offset: i64) -> Option<MediaStream> {
        let target = self.position as i64 + offset;
        if target < 0 || target >= self.files.len() as i64 {
            return None;
        }
        self.open(target as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_tracks() -> MemorySource {
        let mut source = MemorySource::new();
        source
            .add_track("one", vec![1u8; 8])
            .add_track("two", vec![2u8; 8])
            .add_track("three", vec![3u8; 8]);
        source
    }

    fn read_all(stream: &mut MediaStream) -> Vec<u8> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn selection_by_index_and_path() {
        let mut source = three_tracks();
        let mut stream = source.stream_by_index(1).unwrap();
        assert_eq!(read_all(&mut stream), vec![2u8; 8]);
        assert_eq!(source.position(), 1);

        let mut stream = source.stream_by_path("three").unwrap();
        assert_eq!(read_all(&mut stream), vec![3u8; 8]);

        assert!(source.stream_by_index(3).is_none());
        assert!(source.stream_by_path("nope").is_none());
    }

    #[test]
    fn offsets_move_relative_to_position() {
        let mut source = three_tracks();
        source.stream_by_index(0).unwrap();

        assert!(source.next_stream(1).is_some());
        assert_eq!(source.position(), 1);
        assert!(source.next_stream(1).is_some());
        assert_eq!(source.position(), 2);

        // walking off either end fails and stays put
        assert!(source.next_stream(1).is_none());
        assert_eq!(source.position(), 2);

        assert!(source.previous_stream(2).is_some());
        assert_eq!(source.position(), 0);
        assert!(source.previous_stream(1).is_none());
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn empty_source_yields_nothing() {
        let mut source = MemorySource::new();
        assert!(source.stream_by_index(0).is_none());
        assert!(source.next_stream(1).is_none());
    }

    #[test]
    fn default_callback_registration_declines() {
        let mut source = three_tracks();
        let callback: MetadataCallback = Box::new(|_, _| {});
        assert!(source.register_metadata_callback(callback).is_some());
    }

    #[test]
    fn dir_source_enumerates_sorted_files() {
        let dir = std::env::temp_dir().join(format!("tonearm-dirsource-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.wav"), b"second").unwrap();
        std::fs::write(dir.join("a.wav"), b"first").unwrap();

        let mut source = DirSource::new(&dir).unwrap();
        assert_eq!(source.len(), 2);

        let mut stream = source.stream_by_index(0).unwrap();
        assert_eq!(read_all(&mut stream), b"first");
        let mut stream = source.next_stream(1).unwrap();
        assert_eq!(read_all(&mut stream), b"second");
        assert!(source.next_stream(1).is_none());

        let mut stream = source.stream_by_path("a.wav").unwrap();
        assert_eq!(read_all(&mut stream), b"first");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn dir_source_rejects_non_directories() {
        let missing = std::env::temp_dir().join("tonearm-no-such-dir");
        assert!(matches!(
            DirSource::new(&missing),
            Err(Error::NotADirectory(_))
        ));
    }
}
