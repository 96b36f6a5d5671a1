//! Software volume stage.

use dasp_sample::Sample;
use tracing::debug;

use crate::common::AudioFormat;
use crate::sink::AudioSink;

/// Maps a linear volume setting in `0.0..=1.0` to the gain factor actually
/// applied to samples.
pub trait VolumeControl: Send {
    fn gain(&self, volume: f32) -> f32;
}

/// Applies the volume setting as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearVolumeControl;

impl VolumeControl for LinearVolumeControl {
    fn gain(&self, volume: f32) -> f32 {
        volume
    }
}

/// Squares the volume setting, approximating the taper of a logarithmic
/// potentiometer: perceived loudness tracks the control more evenly than
/// with a linear mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredVolumeControl;

impl VolumeControl for SquaredVolumeControl {
    fn gain(&self, volume: f32) -> f32 {
        volume * volume
    }
}

/// Applies `gain(frame_index)` to every sample of interleaved PCM in place.
///
/// Returns `false` for bit depths the stage cannot scale; callers pass the
/// buffer through untouched in that case.
pub(crate) fn apply_gain(
    data: &mut [u8],
    format: &AudioFormat,
    mut gain: impl FnMut(usize) -> f32,
) -> bool {
    let channels = format.channels.max(1) as usize;
    match format.bits_per_sample {
        8 => {
            for (i, byte) in data.iter_mut().enumerate() {
                let sample: f32 = (*byte).to_sample();
                *byte = (sample * gain(i / channels)).to_sample();
            }
            true
        }
        16 => {
            for (i, chunk) in data.chunks_exact_mut(2).enumerate() {
                let sample: f32 = i16::from_le_bytes([chunk[0], chunk[1]]).to_sample();
                let scaled: i16 = (sample * gain(i / channels)).to_sample();
                chunk.copy_from_slice(&scaled.to_le_bytes());
            }
            true
        }
        32 => {
            for (i, chunk) in data.chunks_exact_mut(4).enumerate() {
                let sample: f32 =
                    i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]).to_sample();
                let scaled: i32 = (sample * gain(i / channels)).to_sample();
                chunk.copy_from_slice(&scaled.to_le_bytes());
            }
            true
        }
        _ => false,
    }
}

/// Write-through stage that scales PCM samples by the current volume.
///
/// Sits between the decode stage and the fade stage. Bypass is decided once
/// at wiring time, when the decoder's output is not raw PCM.
pub struct Volume<W> {
    out: W,
    format: AudioFormat,
    control: Box<dyn VolumeControl>,
    volume: f32,
    gain: f32,
    bypass: bool,
    depth_warned: bool,
    scratch: Vec<u8>,
}

impl<W: AudioSink> Volume<W> {
    /// Wraps `out` with a volume stage at full level.
    pub fn new(out: W) -> Self {
        let format = out.format();
        Self {
            out,
            format,
            control: Box::new(LinearVolumeControl),
            volume: 1.0,
            gain: 1.0,
            bypass: false,
            depth_warned: false,
            scratch: Vec::new(),
        }
    }

    /// Replaces the volume curve.
    pub fn set_control(&mut self, control: impl VolumeControl + 'static) {
        self.control = Box::new(control);
        self.gain = self.control.gain(self.volume);
    }

    /// Sets the volume level, clamped to `0.0..=1.0`.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.gain = self.control.gain(self.volume);
    }

    /// The current volume level.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Disables or re-enables scaling. Set once at wiring time.
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
}

impl<W: AudioSink> AudioSink for Volume<W> {
    fn write(&mut self, buf: &[u8]) -> usize {
        if self.bypass || (self.gain - 1.0).abs() < f32::EPSILON {
            return self.out.write(buf);
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        let gain = self.gain;
        if !apply_gain(&mut self.scratch, &self.format, |_| gain) && !self.depth_warned {
            debug!(
                bits = self.format.bits_per_sample,
                "bit depth not scalable, passing samples through"
            );
            self.depth_warned = true;
        }
        self.out.write(&self.scratch)
    }

    fn available_for_write(&self) -> usize {
        self.out.available_for_write()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn set_format(&mut self, format: AudioFormat) {
        self.format = format;
        self.depth_warned = false;
        self.out.set_format(format);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use approx::assert_abs_diff_eq;

    fn samples(sink: &MemorySink) -> Vec<i16> {
        sink.data()
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn halves_sixteen_bit_samples() {
        let mut stage = Volume::new(MemorySink::new());
        stage.set_volume(0.5);
        let input: Vec<u8> = [1000i16, -1000, 20000, -20000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(stage.write(&input), input.len());

        for (got, want) in samples(stage.inner()).iter().zip([500, -500, 10000, -10000]) {
            assert_abs_diff_eq!(*got as f32, want as f32, epsilon = 2.0);
        }
    }

    #[test]
    fn full_volume_is_untouched() {
        let mut stage = Volume::new(MemorySink::new());
        let input = [0x12u8, 0x34, 0x56, 0x78];
        stage.write(&input);
        assert_eq!(stage.inner().data(), &input);
    }

    #[test]
    fn bypass_skips_scaling() {
        let mut stage = Volume::new(MemorySink::new());
        stage.set_volume(0.1);
        stage.set_bypass(true);
        let input = [0x12u8, 0x34, 0x56, 0x78];
        stage.write(&input);
        assert_eq!(stage.inner().data(), &input);
    }

    #[test]
    fn squared_control_tapers() {
        let control = SquaredVolumeControl;
        assert_abs_diff_eq!(control.gain(0.5), 0.25);
        assert_abs_diff_eq!(control.gain(1.0), 1.0);
        assert_abs_diff_eq!(control.gain(0.0), 0.0);
    }

    #[test]
    fn custom_control_shapes_the_gain() {
        let mut stage = Volume::new(MemorySink::new());
        stage.set_control(SquaredVolumeControl);
        stage.set_volume(0.5);
        // gain 0.25: 16000 scales to 4000
        let input: Vec<u8> = 16000i16.to_le_bytes().to_vec();
        stage.write(&input);
        let got = i16::from_le_bytes([stage.inner().data()[0], stage.inner().data()[1]]);
        assert_abs_diff_eq!(got as f32, 4000.0, epsilon = 2.0);
    }

    #[test]
    fn volume_is_clamped() {
        let mut stage = Volume::new(MemorySink::new());
        stage.set_volume(1.5);
        assert_abs_diff_eq!(stage.volume(), 1.0);
        stage.set_volume(-0.5);
        assert_abs_diff_eq!(stage.volume(), 0.0);
    }
}
