//! WAV concatenation
//!
//! Joins rendered clips into one file. Clips may differ in sample rate and
//! channel count; everything is brought to the highest rate and channel
//! count among the inputs before joining.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio to concatenate")]
    Empty,

    #[error("Unsupported channel count {0}; only mono and stereo can be joined")]
    UnsupportedChannels(u16),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// A decoded clip, one sample vector per channel
struct Clip {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

/// Concatenate WAV files in order into a single 16-bit PCM WAV
///
/// A single input is returned unchanged.
pub fn concatenate_wavs(wavs: &[Vec<u8>]) -> Result<Vec<u8>, AudioError> {
    match wavs {
        [] => return Err(AudioError::Empty),
        [only] => return Ok(only.clone()),
        _ => {}
    }

    let clips = wavs
        .iter()
        .map(|bytes| decode(bytes))
        .collect::<Result<Vec<_>, _>>()?;

    let sample_rate = clips.iter().map(|c| c.sample_rate).max().unwrap_or(0);
    let channel_count = clips.iter().map(|c| c.channels.len()).max().unwrap_or(0);
    debug!(clips = clips.len(), sample_rate, channel_count, "concatenating wavs");

    let mut joined: Vec<Vec<f32>> = vec![Vec::new(); channel_count];
    for clip in clips {
        let mut channels = clip.channels;
        if channels.len() < channel_count {
            // Mono into a stereo output
            let mono = channels.first().cloned().unwrap_or_default();
            channels.resize(channel_count, mono);
        }
        let channels = if clip.sample_rate == sample_rate {
            channels
        } else {
            resample(&channels, clip.sample_rate, sample_rate)?
        };
        for (out, channel) in joined.iter_mut().zip(channels) {
            out.extend(channel);
        }
    }

    encode(&joined, sample_rate)
}

fn decode(bytes: &[u8]) -> Result<Clip, AudioError> {
    let reader = WavReader::new(bytes)?;
    let spec = reader.spec();
    if !(1..=2).contains(&spec.channels) {
        return Err(AudioError::UnsupportedChannels(spec.channels));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let count = spec.channels as usize;
    let mut channels = vec![Vec::with_capacity(interleaved.len() / count); count];
    for frame in interleaved.chunks_exact(count) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }

    Ok(Clip {
        sample_rate: spec.sample_rate,
        channels,
    })
}

/// Sinc resampling of whole channels from `from` Hz to `to` Hz
fn resample(channels: &[Vec<f32>], from: u32, to: u32) -> Result<Vec<Vec<f32>>, AudioError> {
    let frames = channels.first().map_or(0, Vec::len);
    if frames == 0 {
        return Ok(channels.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to as f64 / from as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, frames, channels.len())?;

    let mut output = resampler.process(channels, None)?;
    // Flush what is still inside the filter
    let tail = resampler.process_partial::<Vec<f32>>(None, None)?;
    for (out, rest) in output.iter_mut().zip(tail) {
        out.extend(rest);
    }

    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).ceil() as usize;
    let resampled: Vec<Vec<f32>> = output
        .into_iter()
        .map(|channel| channel.into_iter().skip(delay).take(expected).collect())
        .collect();

    debug!(frames, from, to, out_frames = resampled.first().map_or(0, Vec::len), "resampled clip");
    Ok(resampled)
}

fn encode(channels: &[Vec<f32>], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let frames = channels.first().map_or(0, Vec::len);
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for i in 0..frames {
            for channel in channels {
                let sample = channel[i].clamp(-1.0, 1.0);
                writer.write_sample((sample * i16::MAX as f32) as i16)?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav(sample_rate: u32, channels: u16, frames: usize, value: i16) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames * channels as usize {
                writer.write_sample(value).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn read(bytes: &[u8]) -> (WavSpec, Vec<i16>) {
        let reader = WavReader::new(bytes).unwrap();
        let spec = reader.spec();
        let samples = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(concatenate_wavs(&[]), Err(AudioError::Empty)));
    }

    #[test]
    fn test_single_input_returned_unchanged() {
        let only = wav(24000, 1, 10, 100);
        assert_eq!(concatenate_wavs(&[only.clone()]).unwrap(), only);
    }

    #[test]
    fn test_same_format_is_joined_in_order() {
        let out = concatenate_wavs(&[wav(24000, 1, 100, 1000), wav(24000, 1, 50, -1000)]).unwrap();
        let (spec, samples) = read(&out);
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.channels, 1);
        assert_eq!(samples.len(), 150);
        assert!(samples[..100].iter().all(|s| (*s - 1000).abs() <= 1));
        assert!(samples[100..].iter().all(|s| (*s + 1000).abs() <= 1));
    }

    #[test]
    fn test_mono_is_duplicated_into_stereo() {
        let out = concatenate_wavs(&[wav(24000, 1, 20, 500), wav(24000, 2, 20, 0)]).unwrap();
        let (spec, samples) = read(&out);
        assert_eq!(spec.channels, 2);
        assert_eq!(samples.len(), 80);
        for frame in samples[..40].chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_lower_rate_is_resampled() {
        let out = concatenate_wavs(&[wav(24000, 1, 1200, 0), wav(48000, 1, 2400, 0)]).unwrap();
        let (spec, samples) = read(&out);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(samples.len(), 4800);
    }

    #[test]
    fn test_more_than_two_channels_rejected() {
        let result = concatenate_wavs(&[wav(24000, 3, 10, 0), wav(24000, 1, 10, 0)]);
        assert!(matches!(result, Err(AudioError::UnsupportedChannels(3))));
    }
}
