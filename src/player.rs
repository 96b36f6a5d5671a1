//! The playback orchestrator.
//!
//! [`Player`] wires the pipeline `source → copier → decode → volume → fade
//! → output` and drives it one bounded step at a time: an external loop
//! calls [`copy`](Player::copy) at a cadence fast enough to keep the output
//! fed, and everything else (navigation, fades, auto-advance, volume,
//! backpressure) happens inside those ticks. There is no internal thread
//! and no async suspension; cancellation is cooperative and takes effect on
//! the next tick.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::copier::Copier;
use crate::decoder::{DecodeSink, Decoder};
use crate::fade::Fade;
use crate::meta::{Id3Scanner, MetadataCallback, MetadataParser};
use crate::sink::AudioSink;
use crate::sniff::FormatSniffer;
use crate::source::{MediaSource, MediaStream};
use crate::volume::Volume;

/// Volume level seeded by the first [`start`](Player::start).
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Volume changes smaller than this are swallowed to avoid redundant
/// downstream writes.
const VOLUME_EPSILON: f32 = 0.01;

/// Bytes of silence emitted per inactive tick when silence-on-inactive is
/// on, so a stateful transport keeps its session alive.
const SILENCE_QUANTUM: usize = 1024;

/// Silence burst written after a fade-out on stop.
const POP_GUARD_SILENCE: usize = 2048;

const DEFAULT_DELAY_IF_FULL: Duration = Duration::from_millis(100);

/// Where the orchestrator is in its lifecycle.
///
/// `FadingOut`, `Switching` and `FadingIn` are transient: the scripted
/// fade-then-switch sequence walks through them synchronously during a
/// navigation call. They exist as explicit states (rather than inline
/// procedural steps) so the sequence can be observed through
/// [`Player::set_phase_change_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Not playing. The initial state, and where every failure lands.
    Inactive,
    /// Ticks move data.
    Active,
    /// Ramping the current stream down to silence.
    FadingOut,
    /// Between streams: the old one is flushed, the new one not yet wired.
    Switching,
    /// A fade-in is armed for the next written buffer.
    FadingIn,
}

/// Orchestrates playback across a source, a decoder and an output sink.
///
/// Construction wires the stages; [`start`](Player::start) selects the
/// first stream; a periodic [`copy`](Player::copy) does everything else.
///
/// ```
/// use tonearm::{MemorySink, MemorySource, PassthroughDecoder, Player};
///
/// let mut source = MemorySource::new();
/// source.add_track("hello", vec![0u8; 256]);
///
/// let mut player = Player::new(source, PassthroughDecoder::new(), MemorySink::new());
/// assert!(player.start(0));
/// player.copy_all();
/// assert!(!player.output().is_empty());
/// ```
pub struct Player<S: MediaSource, D: Decoder, O: AudioSink> {
    source: S,
    pipeline: DecodeSink<D, Volume<Fade<O>>>,
    copier: Copier,
    meta: Box<dyn MetadataParser>,
    meta_active: bool,
    sniffer: Option<FormatSniffer>,
    stream: Option<MediaStream>,
    phase: PlaybackPhase,
    /// +1 after forward navigation, -1 after backward; auto-advance keeps
    /// moving the same way.
    direction: i64,
    auto_advance: bool,
    auto_fade: bool,
    silence_on_inactive: bool,
    /// None until the first `start` seeds the default level.
    volume: Option<f32>,
    /// Auto-advance deadline; armed by the first tick and re-armed by every
    /// transfer and navigation.
    deadline: Option<Instant>,
    delay_if_full: Duration,
    on_stream_change: Option<Box<dyn FnMut(bool) + Send>>,
    on_phase_change: Option<Box<dyn FnMut(PlaybackPhase) + Send>>,
}

impl<S: MediaSource, D: Decoder, O: AudioSink> Player<S, D, O> {
    /// Wires the pipeline. When the decoder's output is not raw PCM the
    /// volume and fade stages are bypassed. That decision is made once,
    /// here, and not revisited during ticks.
    pub fn new(source: S, decoder: D, output: O) -> Self {
        let pcm = decoder.is_pcm();
        let mut volume = Volume::new(Fade::new(output));
        if !pcm {
            volume.set_bypass(true);
            volume.inner_mut().set_bypass(true);
        }
        Self {
            source,
            pipeline: DecodeSink::new(decoder, volume),
            copier: Copier::new(),
            meta: Box::new(Id3Scanner::new()),
            meta_active: false,
            sniffer: None,
            stream: None,
            phase: PlaybackPhase::Inactive,
            direction: 1,
            auto_advance: true,
            auto_fade: true,
            silence_on_inactive: false,
            volume: None,
            deadline: None,
            delay_if_full: DEFAULT_DELAY_IF_FULL,
            on_stream_change: None,
            on_phase_change: None,
        }
    }

    /// (Re)starts playback at the given source index.
    ///
    /// Returns `false`, leaving the player inactive, when the source has
    /// nothing at `index`. An empty playlist is an expected condition, not
    /// an error, and the player can be started again at any time.
    pub fn start(&mut self, index: usize) -> bool {
        info!(index, "starting playback");
        let level = self.volume.unwrap_or(DEFAULT_VOLUME);
        self.set_volume(level);
        self.auto_advance = self.source.is_auto_advance();
        // prime the fade stage with whatever format the output is in now;
        // the decoder overrides it once the stream announces its own
        let format = self.output().format();
        self.fade_mut().set_format(format);
        self.source.begin();
        let stream = self.source.stream_by_index(index);
        if self.attach(stream) {
            self.set_phase(PlaybackPhase::Active);
            true
        } else {
            warn!(index, "no stream at start index");
            self.set_phase(PlaybackPhase::Inactive);
            false
        }
    }

    /// Deactivates and tears the decode and metadata stages down.
    pub fn end(&mut self) {
        self.set_phase(PlaybackPhase::Inactive);
        self.pipeline.end();
        self.meta.end();
        // restart the decoder so no residue survives into the next stream
        self.pipeline.begin();
    }

    /// Resumes playback. Same as `set_active(true)`.
    pub fn play(&mut self) {
        info!("play");
        self.set_active(true);
    }

    /// Halts playback. Same as `set_active(false)`.
    pub fn stop(&mut self) {
        info!("stop");
        self.set_active(false);
    }

    /// Activates or deactivates playback.
    ///
    /// With auto-fade on, deactivation ramps the stream down before going
    /// silent: the fade-out is armed, one copy cycle flushes it, and a
    /// short burst of silence guards against a trailing pop.
    pub fn set_active(&mut self, active: bool) {
        if self.auto_fade {
            if active {
                self.fade_mut().set_fade_in_armed(true);
            } else {
                self.set_phase(PlaybackPhase::FadingOut);
                self.fade_mut().set_fade_out_armed(true);
                self.pump_once();
                self.output_mut().write_silence(POP_GUARD_SILENCE);
            }
        }
        self.set_phase(if active {
            PlaybackPhase::Active
        } else {
            PlaybackPhase::Inactive
        });
    }

    /// Moves to the next stream.
    pub fn next(&mut self) -> bool {
        self.next_by(1)
    }

    /// Moves by `offset` streams; negative offsets move backwards and are
    /// remembered as the backward direction.
    pub fn next_by(&mut self, offset: i64) -> bool {
        info!(offset, "next");
        self.write_end();
        self.direction = if offset >= 0 { 1 } else { -1 };
        let stream = self.source.next_stream(offset);
        self.finish_navigation(stream)
    }

    /// Moves to the previous stream.
    pub fn previous(&mut self) -> bool {
        self.previous_by(1)
    }

    /// Moves back by `offset` streams.
    pub fn previous_by(&mut self, offset: i64) -> bool {
        info!(offset, "previous");
        self.write_end();
        self.direction = -1;
        let stream = self.source.previous_stream(offset.abs());
        self.finish_navigation(stream)
    }

    /// Jumps to the stream at `index`.
    pub fn select_index(&mut self, index: usize) -> bool {
        info!(index, "select index");
        self.write_end();
        self.direction = 1;
        let stream = self.source.stream_by_index(index);
        self.finish_navigation(stream)
    }

    /// Jumps to the stream named `path`.
    pub fn select_path(&mut self, path: &str) -> bool {
        info!(path, "select path");
        self.write_end();
        self.direction = 1;
        let stream = self.source.stream_by_path(path);
        self.finish_navigation(stream)
    }

    /// Plays one item from start to finish (blocking convenience).
    pub fn play_path(&mut self, path: &str) -> bool {
        if !self.select_path(path) {
            warn!(path, "could not open path");
            return false;
        }
        info!(path, "playing to completion");
        self.play();
        self.copy_all();
        true
    }

    /// Sets the volume. Returns `false` and changes nothing for values
    /// outside `0.0..=1.0`; changes smaller than the internal epsilon are
    /// accepted but not forwarded downstream.
    pub fn set_volume(&mut self, volume: f32) -> bool {
        if !(0.0..=1.0).contains(&volume) {
            warn!(volume, "volume out of range");
            return false;
        }
        let changed = self
            .volume
            .map_or(true, |current| (volume - current).abs() > VOLUME_EPSILON);
        if changed {
            debug!(volume, "volume change");
            self.pipeline.inner_mut().set_volume(volume);
            self.volume = Some(volume);
        }
        true
    }

    /// The current volume level.
    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    /// Copies one buffer's worth of bytes through the pipeline.
    pub fn copy(&mut self) -> usize {
        let max = self.copier.buffer_size();
        self.copy_bytes(max)
    }

    /// The per-tick driving operation: copies up to `max` bytes from the
    /// current stream through the pipeline.
    ///
    /// Inactive players transfer nothing, but still emit a fixed quantum of
    /// silence when silence-on-inactive is on. Active players back off
    /// (sleep, then return 0) when the output reports no free space, re-arm
    /// the auto-advance deadline on any transfer, evaluate auto-advance,
    /// and pad short transfers with silence when configured.
    pub fn copy_bytes(&mut self, max: usize) -> usize {
        if !self.is_active() {
            if self.silence_on_inactive {
                self.output_mut().write_silence(SILENCE_QUANTUM);
            }
            return 0;
        }
        if !self.delay_if_full.is_zero() && self.output().available_for_write() == 0 {
            // deliberate coarse throttle, not an I/O wait
            std::thread::sleep(self.delay_if_full);
            return 0;
        }

        let transferred = self.pump(max);
        if transferred > 0 || self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.source.auto_advance_timeout());
        }
        self.evaluate_advance();

        if transferred < max && self.silence_on_inactive {
            self.output_mut().write_silence(max - transferred);
        }
        transferred
    }

    /// Copies until a tick moves nothing; returns the total.
    pub fn copy_all(&mut self) -> usize {
        let mut total = 0;
        loop {
            let step = self.copy();
            if step == 0 {
                return total;
            }
            total += step;
        }
    }

    /// Writes silence directly to the output, bypassing the pipeline.
    pub fn write_silence(&mut self, len: usize) -> usize {
        self.output_mut().write_silence(len)
    }

    /// Registers the metadata callback.
    ///
    /// The callback is first offered to the source; a source with in-band
    /// metadata keeps it, and the player then stays out of metadata
    /// entirely. Otherwise the player mirrors raw stream bytes into its own
    /// extractor from now on. Ownership is decided here, once.
    pub fn set_metadata_callback(&mut self, callback: MetadataCallback) {
        match self.source.register_metadata_callback(callback) {
            None => {
                info!("metadata handled by the source");
                self.meta_active = false;
            }
            Some(callback) => {
                self.meta.set_callback(callback);
                self.meta_active = true;
            }
        }
    }

    /// Replaces the metadata extractor (an ID3 scanner by default).
    pub fn set_metadata_parser(&mut self, parser: impl MetadataParser + 'static) {
        self.meta = Box::new(parser);
    }

    /// Installs a format sniffer fed from the raw byte tap. It classifies
    /// the first chunk of every stream and is reset on each switch.
    pub fn set_sniffer(&mut self, sniffer: FormatSniffer) {
        self.sniffer = Some(sniffer);
    }

    /// The installed sniffer, if any.
    pub fn sniffer(&self) -> Option<&FormatSniffer> {
        self.sniffer.as_ref()
    }

    /// Mutable access to the installed sniffer.
    pub fn sniffer_mut(&mut self) -> Option<&mut FormatSniffer> {
        self.sniffer.as_mut()
    }

    /// Callback invoked after every stream switch with whether a stream was
    /// obtained.
    pub fn set_stream_change_callback(&mut self, callback: impl FnMut(bool) + Send + 'static) {
        self.on_stream_change = Some(Box::new(callback));
    }

    /// Callback invoked on every phase transition, transient phases
    /// included.
    pub fn set_phase_change_callback(
        &mut self,
        callback: impl FnMut(PlaybackPhase) + Send + 'static,
    ) {
        self.on_phase_change = Some(Box::new(callback));
    }

    /// Per-step transfer size used by [`copy`](Player::copy).
    pub fn set_buffer_size(&mut self, size: usize) {
        self.copier.resize(size);
    }

    /// Wait applied when the output reports no free space. Zero disables
    /// the backoff.
    pub fn set_delay_if_full(&mut self, delay: Duration) {
        self.delay_if_full = delay;
    }

    /// When on, inactive ticks and short transfers are padded with silence.
    pub fn set_silence_on_inactive(&mut self, enabled: bool) {
        self.silence_on_inactive = enabled;
    }

    /// Whether silence-on-inactive is on (off by default).
    pub fn is_silence_on_inactive(&self) -> bool {
        self.silence_on_inactive
    }

    /// Enables or disables the automatic fades around starts, stops and
    /// switches (on by default).
    pub fn set_auto_fade(&mut self, enabled: bool) {
        self.auto_fade = enabled;
    }

    /// Whether automatic fading is on.
    pub fn is_auto_fade(&self) -> bool {
        self.auto_fade
    }

    /// Overrides the auto-advance policy. [`start`](Player::start) re-reads
    /// the policy from the source, so call this after it.
    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.auto_advance = enabled;
    }

    /// Whether the player is actively moving data.
    pub fn is_active(&self) -> bool {
        self.phase == PlaybackPhase::Active
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// The remembered navigation direction (+1 or -1).
    pub fn direction(&self) -> i64 {
        self.direction
    }

    /// The source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// The volume stage (for installing a custom volume curve).
    pub fn volume_stage_mut(&mut self) -> &mut Volume<Fade<O>> {
        self.pipeline.inner_mut()
    }

    /// The fade stage.
    pub fn fade_stage(&self) -> &Fade<O> {
        self.pipeline.inner().inner()
    }

    /// The final output sink.
    pub fn output(&self) -> &O {
        self.pipeline.inner().inner().inner()
    }

    /// Mutable access to the final output sink.
    pub fn output_mut(&mut self) -> &mut O {
        self.pipeline.inner_mut().inner_mut().inner_mut()
    }

    /// Consumes the player and returns the output sink.
    pub fn into_output(self) -> O {
        self.pipeline.into_inner().into_inner().into_inner()
    }

    fn fade_mut(&mut self) -> &mut Fade<O> {
        self.pipeline.inner_mut().inner_mut()
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        if self.phase != phase {
            debug!(?phase, "phase change");
            self.phase = phase;
            if let Some(callback) = self.on_phase_change.as_mut() {
                callback(phase);
            }
        }
    }

    /// The scripted shutdown of the current stream that precedes every
    /// navigation: fade the old stream out, flush the ramp with one
    /// synchronous copy cycle, pre-arm the fade-in for the upcoming stream,
    /// and restart the decoder so it carries nothing across.
    fn write_end(&mut self) {
        if self.auto_fade {
            self.set_phase(PlaybackPhase::FadingOut);
            self.fade_mut().set_fade_out_armed(true);
            self.pump_once();
            self.set_phase(PlaybackPhase::Switching);
            self.fade_mut().set_fade_in_armed(true);
            self.set_phase(PlaybackPhase::FadingIn);
        }
        self.pipeline.begin();
    }

    /// Swaps the current stream for `stream`, restarting the decode and
    /// metadata stages around the switch. Fires the stream-change callback
    /// either way.
    fn attach(&mut self, stream: Option<MediaStream>) -> bool {
        self.pipeline.end();
        self.pipeline.begin();
        self.meta.end();
        self.stream = stream;
        let ok = self.stream.is_some();
        if ok {
            debug!("stream attached");
            self.meta.begin();
            if let Some(sniffer) = self.sniffer.as_mut() {
                sniffer.reset();
            }
            self.deadline = Some(Instant::now() + self.source.auto_advance_timeout());
        }
        if let Some(callback) = self.on_stream_change.as_mut() {
            callback(ok);
        }
        ok
    }

    fn finish_navigation(&mut self, stream: Option<MediaStream>) -> bool {
        let ok = self.attach(stream);
        if ok {
            self.set_phase(PlaybackPhase::Active);
        } else {
            warn!("navigation found no stream");
            self.set_phase(PlaybackPhase::Inactive);
        }
        ok
    }

    /// One bounded transfer from the stream into the pipeline, with the raw
    /// byte tap (sniffer + metadata mirror) applied.
    fn pump(&mut self, max: usize) -> usize {
        let Self {
            stream,
            copier,
            pipeline,
            meta,
            meta_active,
            sniffer,
            ..
        } = self;
        let Some(stream) = stream.as_mut() else {
            return 0;
        };
        let mut tap = |chunk: &[u8]| {
            if let Some(sniffer) = sniffer.as_mut() {
                sniffer.feed(chunk);
            }
            if *meta_active {
                meta.write(chunk);
            }
        };
        copier.copy_bytes(stream.as_mut(), pipeline, max, Some(&mut tap))
    }

    fn pump_once(&mut self) -> usize {
        let max = self.copier.buffer_size();
        self.pump(max)
    }

    /// Auto-advance bookkeeping, run once per active tick.
    ///
    /// A saturated output defers all decisions to a later tick. Otherwise a
    /// missing stream or an expired deadline triggers the move: fade-in is
    /// pre-armed, and the player either navigates one step in the
    /// remembered direction or, with auto-advance off, goes inactive.
    fn evaluate_advance(&mut self) {
        if self.output().available_for_write() == 0 {
            return;
        }
        let expired = self
            .deadline
            .is_some_and(|deadline| Instant::now() > deadline);
        if self.stream.is_none() || expired {
            if self.auto_fade {
                self.fade_mut().set_fade_in_armed(true);
            }
            if self.auto_advance {
                let offset = self.direction;
                info!(offset, "auto-advance");
                if !self.next_by(offset) {
                    debug!("no further stream");
                }
            } else {
                self.set_phase(PlaybackPhase::Inactive);
            }
            self.deadline = Some(Instant::now() + self.source.auto_advance_timeout());
        }
    }
}
