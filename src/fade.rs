//! Click-free transitions.
//!
//! Cutting a PCM stream at an arbitrary sample produces an audible pop.
//! The fade stage masks every such discontinuity (start, stop, track
//! switch) with a short amplitude ramp: armed for fade-in it ramps the
//! next written buffer from silence up to full level, armed for fade-out
//! it ramps down to silence and then holds silence until a fade-in is
//! armed again.

use crate::common::AudioFormat;
use crate::sink::AudioSink;
use crate::volume::apply_gain;

/// Write-through stage applying fade ramps at transition points.
///
/// The ramps are one buffer long: the orchestrator arms a fade and then
/// forces one copy cycle through the pipeline, which is what flushes the
/// ramp to the output. Bypass is decided once at wiring time, when the
/// decoder's output is not raw PCM.
pub struct Fade<W> {
    out: W,
    format: AudioFormat,
    fade_in_armed: bool,
    fade_out_armed: bool,
    faded_out: bool,
    bypass: bool,
    scratch: Vec<u8>,
}

impl<W: AudioSink> Fade<W> {
    /// Wraps `out` with an idle fade stage.
    pub fn new(out: W) -> Self {
        let format = out.format();
        Self {
            out,
            format,
            fade_in_armed: false,
            fade_out_armed: false,
            faded_out: false,
            bypass: false,
            scratch: Vec::new(),
        }
    }

    /// Arms a fade-in for the next written buffer.
    pub fn set_fade_in_armed(&mut self, armed: bool) {
        self.fade_in_armed = armed;
        if armed {
            self.fade_out_armed = false;
        }
    }

    /// Arms a fade-out for the next written buffer.
    pub fn set_fade_out_armed(&mut self, armed: bool) {
        self.fade_out_armed = armed;
        if armed {
            self.fade_in_armed = false;
        }
    }

    /// Whether a fade-in is pending.
    pub fn fade_in_armed(&self) -> bool {
        self.fade_in_armed
    }

    /// Whether a fade-out is pending.
    pub fn fade_out_armed(&self) -> bool {
        self.fade_out_armed
    }

    /// True after a fade-out completed and before the next fade-in: the
    /// stage is holding silence.
    pub fn is_faded_out(&self) -> bool {
        self.faded_out
    }

    /// Disables or re-enables fading. Set once at wiring time.
    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    /// Returns a reference to the downstream stage.
    pub fn inner(&self) -> &W {
        &self.out
    }

    /// Returns a mutable reference to the downstream stage.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Returns the downstream stage.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn ramp(&mut self, buf: &[u8], rising: bool) -> usize {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        let frames = (buf.len() / self.format.bytes_per_frame().max(1)).max(1) as f32;
        let factor = move |frame: usize| {
            let progress = frame as f32 / frames;
            if rising {
                progress
            } else {
                1.0 - progress
            }
        };
        if !apply_gain(&mut self.scratch, &self.format, factor) {
            // depth we cannot ramp: pass the original buffer through
            return self.out.write(buf);
        }
        self.out.write(&self.scratch)
    }
}

impl<W: AudioSink> AudioSink for Fade<W> {
    fn write(&mut self, buf: &[u8]) -> usize {
        if self.bypass {
            return self.out.write(buf);
        }
        if self.fade_in_armed {
            self.fade_in_armed = false;
            self.faded_out = false;
            return self.ramp(buf, true);
        }
        if self.fade_out_armed {
            self.fade_out_armed = false;
            self.faded_out = true;
            return self.ramp(buf, false);
        }
        if self.faded_out {
            // hold silence until a fade-in is armed
            return self.out.write_silence(buf.len());
        }
        self.out.write(buf)
    }

    fn available_for_write(&self) -> usize {
        self.out.available_for_write()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn set_format(&mut self, format: AudioFormat) {
        self.format = format;
        self.out.set_format(format);
    }
}
