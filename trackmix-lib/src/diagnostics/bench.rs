//! Synthetic mixing benchmarks.

use rand::Rng;

use crate::config::MixerConfig;
use crate::dsp::MixSample;
use crate::error::MixerError;
use crate::format::{AudioFormat, ChannelMask, OutputFormat};
use crate::mixer::{AudioMixer, Parameter, ResampleParam, TrackParam, VolumeParam};
use crate::provider::ring_buffer_provider;
use crate::resampler::ResamplerQuality;

/// Configuration parameters for a mixing benchmark run.
#[derive(Debug, Clone, Copy)]
pub struct MixBenchConfig {
    pub sample_rate: u32,
    pub frame_count: usize,
    /// Stereo noise tracks at the engine rate.
    pub tracks: usize,
    /// Mono noise tracks resampled from `source_rate`.
    pub resampled_tracks: usize,
    pub source_rate: u32,
    pub quality: ResamplerQuality,
    pub input_seconds: f32,
    pub iterations: usize,
    /// Accumulate in Q4.27 instead of float.
    pub fixed_point: bool,
}

impl Default for MixBenchConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_count: 256,
            tracks: 8,
            resampled_tracks: 4,
            source_rate: 44_100,
            quality: ResamplerQuality::Cubic,
            input_seconds: 2.0,
            iterations: 5,
            fixed_point: true,
        }
    }
}

/// Timing results from a benchmark run.
#[derive(Debug, Clone, Copy)]
pub struct MixBenchResult {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub audio_time_ms: f64,
    pub rt_factor: f64,
    pub blocks: usize,
}

/// Mix noise tracks for `input_seconds` of output, `iterations` times.
pub fn bench_mixer(config: MixBenchConfig) -> Result<MixBenchResult, MixerError> {
    let output_frames = (config.sample_rate as f32 * config.input_seconds).max(1.0) as usize;
    let blocks = output_frames.div_ceil(config.frame_count.max(1));

    let mut rng = rand::thread_rng();
    let stereo: Vec<f32> = (0..output_frames * 2)
        .map(|_| rng.gen_range(-0.5_f32..0.5_f32))
        .collect();
    let source_frames = (output_frames as u64 * config.source_rate as u64)
        .div_ceil(config.sample_rate.max(1) as u64) as usize
        + 8;
    let mono: Vec<f32> = (0..source_frames)
        .map(|_| rng.gen_range(-0.5_f32..0.5_f32))
        .collect();

    let mut times: Vec<f64> = Vec::with_capacity(config.iterations.max(1));
    for _ in 0..config.iterations.max(1) {
        let elapsed = if config.fixed_point {
            run_once::<i32>(&config, blocks, &stereo, &mono)?
        } else {
            run_once::<f32>(&config, blocks, &stereo, &mono)?
        };
        times.push(elapsed);
    }

    let min_ms = times
        .iter()
        .copied()
        .fold(f64::INFINITY, |a, b| a.min(b));
    let max_ms = times.iter().copied().fold(0.0_f64, |a, b| a.max(b));
    let avg_ms = times.iter().sum::<f64>() / times.len() as f64;
    let audio_time_ms =
        (blocks * config.frame_count) as f64 / config.sample_rate as f64 * 1000.0;
    let rt_factor = if audio_time_ms > 0.0 {
        avg_ms / audio_time_ms
    } else {
        0.0
    };

    Ok(MixBenchResult {
        avg_ms,
        min_ms: if min_ms.is_finite() { min_ms } else { 0.0 },
        max_ms,
        audio_time_ms,
        rt_factor,
        blocks,
    })
}

/// Build a fresh engine and time `blocks` calls to `process`.
fn run_once<S: MixSample>(
    config: &MixBenchConfig,
    blocks: usize,
    stereo: &[f32],
    mono: &[f32],
) -> Result<f64, MixerError> {
    let mut mixer_config = MixerConfig::new(
        config.frame_count,
        config.sample_rate,
        (config.tracks + config.resampled_tracks).max(1) as u32,
    );
    mixer_config.resampler_quality = config.quality;
    let mut mixer: AudioMixer<S> = AudioMixer::new(mixer_config)?;
    let bus = mixer.add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)?;
    let aux = mixer.add_aux_bus();

    for _ in 0..config.tracks {
        let name = mixer.acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0)?;
        let (provider, producer) = ring_buffer_provider(stereo.len() / 2, 2, AudioFormat::Pcm16);
        producer.push_frames(stereo);
        producer.finish();
        mixer.set_parameter(name, Parameter::Track(TrackParam::MainBuffer(bus)))?;
        mixer.set_parameter(name, Parameter::Volume(VolumeParam::Volume0(0.5)))?;
        mixer.set_parameter(name, Parameter::Volume(VolumeParam::Volume1(0.5)))?;
        mixer.set_buffer_provider(name, Some(Box::new(provider)))?;
        mixer.enable(name)?;
    }

    for _ in 0..config.resampled_tracks {
        let name = mixer.acquire_track(ChannelMask::MONO, AudioFormat::Pcm16, 0)?;
        let (provider, producer) = ring_buffer_provider(mono.len(), 1, AudioFormat::Pcm16);
        producer.push_frames(mono);
        producer.finish();
        mixer.set_parameter(name, Parameter::Track(TrackParam::MainBuffer(bus)))?;
        mixer.set_parameter(name, Parameter::Track(TrackParam::AuxBuffer(Some(aux))))?;
        mixer.set_parameter(name, Parameter::Volume(VolumeParam::AuxLevel(0.25)))?;
        mixer.set_parameter(
            name,
            Parameter::Resample(ResampleParam::SampleRate(config.source_rate)),
        )?;
        mixer.set_buffer_provider(name, Some(Box::new(provider)))?;
        mixer.enable(name)?;
    }

    let start = std::time::Instant::now();
    for _ in 0..blocks {
        mixer.process(None);
    }
    Ok(start.elapsed().as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_run_reports_timings() {
        let config = MixBenchConfig {
            input_seconds: 0.05,
            iterations: 2,
            tracks: 2,
            resampled_tracks: 1,
            ..MixBenchConfig::default()
        };
        let result = bench_mixer(config).unwrap();
        assert_eq!(result.blocks, 10);
        assert!(result.min_ms <= result.avg_ms && result.avg_ms <= result.max_ms);
        assert!(result.audio_time_ms > 0.0);
    }

    #[test]
    fn float_engine_runs() {
        let config = MixBenchConfig {
            input_seconds: 0.01,
            iterations: 1,
            fixed_point: false,
            ..MixBenchConfig::default()
        };
        assert!(bench_mixer(config).is_ok());
    }
}
