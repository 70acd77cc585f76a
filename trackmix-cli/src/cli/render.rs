//! Offline rendering of a session into WAV files.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};

use trackmix_lib::dsp::MixSample;
use trackmix_lib::format::{
    convert_signed_16bit_to_f32, convert_signed_24bit_to_f32, convert_signed_32bit_to_f32,
    convert_unsigned_8bit_to_f32,
};
use trackmix_lib::mixer::{
    AuxBusId, BusId, BusSamples, ResampleParam, TrackName, TrackParam, VolumeParam,
};
use trackmix_lib::provider::{calculate_output_pts, ring_buffer_provider, RingProducer};
use trackmix_lib::provider::ring::RingStatus;
use trackmix_lib::resampler::source_frames_needed;
use trackmix_lib::{
    AudioFormat, AudioMixer, ChannelMask, MixerError, OutputFormat, Parameter, ProcessHook,
};

use super::session::{Precision, SessionConfig, TrackConfig};

/// Blocks of source audio each ring holds.
const RING_BLOCKS: usize = 4;

#[derive(Debug)]
pub enum RenderError {
    Io(std::io::Error),
    Wav(hound::Error),
    Session(serde_json::Error),
    Mixer(MixerError),
    Input(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Wav(err) => write!(f, "wav error: {}", err),
            Self::Session(err) => write!(f, "session parse error: {}", err),
            Self::Mixer(err) => write!(f, "mixer error: {}", err),
            Self::Input(reason) => write!(f, "invalid input: {}", reason),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<std::io::Error> for RenderError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<hound::Error> for RenderError {
    fn from(value: hound::Error) -> Self {
        Self::Wav(value)
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(value: serde_json::Error) -> Self {
        Self::Session(value)
    }
}

impl From<MixerError> for RenderError {
    fn from(value: MixerError) -> Self {
        Self::Mixer(value)
    }
}

/// Outcome of a finished render.
#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub frames: usize,
    pub tracks: usize,
    pub sample_rate: u32,
    pub hook: Option<ProcessHook>,
}

/// Decoded WAV input ready to be pushed into a ring provider.
struct WavInput {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    format: AudioFormat,
}

fn read_wav(path: &Path) -> Result<WavInput, RenderError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let (format, samples) = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => (
            AudioFormat::PcmFloat,
            reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        ),
        (SampleFormat::Int, 8) => (
            AudioFormat::Pcm8,
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| convert_unsigned_8bit_to_f32((s + 128) as u8)))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (SampleFormat::Int, 16) => (
            AudioFormat::Pcm16,
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| convert_signed_16bit_to_f32(s as i16)))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (SampleFormat::Int, 24) => (
            AudioFormat::Pcm24Packed,
            reader
                .samples::<i32>()
                .map(|s| s.map(convert_signed_24bit_to_f32))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (SampleFormat::Int, 32) => (
            AudioFormat::Pcm32,
            reader
                .samples::<i32>()
                .map(|s| s.map(convert_signed_32bit_to_f32))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (sample_format, bits) => {
            return Err(RenderError::Input(format!(
                "{}: unsupported sample format {:?} with {} bits",
                path.display(),
                sample_format,
                bits
            )))
        }
    };
    debug!(
        "{}: {} frames, {} channel(s) at {} Hz as {:?}",
        path.display(),
        samples.len() / spec.channels.max(1) as usize,
        spec.channels,
        spec.sample_rate,
        format
    );
    Ok(WavInput {
        samples,
        channels: spec.channels as usize,
        sample_rate: spec.sample_rate,
        format,
    })
}

/// Pushes a decoded file into its ring as space frees up.
struct Feed {
    producer: RingProducer,
    status: RingStatus,
    samples: Vec<f32>,
    channels: usize,
    cursor: usize,
    finished: bool,
}

impl Feed {
    fn top_up(&mut self) {
        if !self.finished && self.cursor < self.samples.len() {
            let space = self.producer.remaining_frames() * self.channels;
            let end = (self.cursor + space).min(self.samples.len());
            self.cursor += self.producer.push_frames(&self.samples[self.cursor..end]);
        }
        if !self.finished && self.cursor >= self.samples.len() {
            self.producer.finish();
            self.finished = true;
        }
    }

    fn is_drained(&self) -> bool {
        self.status.is_finished()
    }
}

fn bus_spec(channels: usize, sample_rate: u32, format: OutputFormat) -> WavSpec {
    let (bits_per_sample, sample_format) = match format {
        OutputFormat::Pcm16 => (16, SampleFormat::Int),
        OutputFormat::Float => (32, SampleFormat::Float),
    };
    WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample,
        sample_format,
    }
}

/// Render `session` into `out`, and into the session's aux path if set.
pub fn render(session: &SessionConfig, out: &Path) -> Result<RenderSummary, RenderError> {
    if session.tracks.is_empty() {
        return Err(RenderError::Input("session lists no tracks".to_string()));
    }
    match session.precision {
        Precision::Fixed => render_with::<i32>(session, out),
        Precision::Float => render_with::<f32>(session, out),
    }
}

fn render_with<S: MixSample>(
    session: &SessionConfig,
    out: &Path,
) -> Result<RenderSummary, RenderError> {
    let mut mixer: AudioMixer<S> = AudioMixer::new(session.mixer.clone())?;
    let bus = mixer.add_output_bus(session.output_channels, session.output_format)?;
    let aux = session
        .aux_out
        .as_ref()
        .map(|path| (mixer.add_aux_bus(), path.clone()));

    let mut feeds = Vec::with_capacity(session.tracks.len());
    for track in &session.tracks {
        let input = read_wav(&track.path)?;
        let name = add_track(&mut mixer, track, &input, bus, aux.as_ref().map(|(id, _)| *id))?;
        let source_rate = track.source_rate.unwrap_or(input.sample_rate);
        let capacity = source_frames_needed(source_rate, mixer.frame_count(), mixer.sample_rate())
            * RING_BLOCKS;
        let (provider, producer) = ring_buffer_provider(capacity, input.channels, input.format);
        let status = provider.status();
        mixer.set_buffer_provider(name, Some(Box::new(provider)))?;
        mixer.enable(name)?;
        feeds.push(Feed {
            producer,
            status,
            samples: input.samples,
            channels: input.channels,
            cursor: 0,
            finished: false,
        });
    }

    let sample_rate = mixer.sample_rate();
    let frame_count = mixer.frame_count();
    let channels = session.output_channels.channel_count();
    let limit = session
        .max_seconds
        .map(|seconds| (seconds.max(0.0) as f64 * sample_rate as f64).round() as usize);

    let mut writer = WavWriter::create(out, bus_spec(channels, sample_rate, session.output_format))?;
    let mut aux_writer = match aux.as_ref() {
        Some((_, path)) => Some(WavWriter::create(
            path,
            bus_spec(1, sample_rate, OutputFormat::Float),
        )?),
        None => None,
    };

    let mut rendered = 0;
    loop {
        feeds.iter_mut().for_each(Feed::top_up);
        if feeds.iter().all(Feed::is_drained) {
            break;
        }
        let frames = match limit {
            Some(limit) if rendered >= limit => break,
            Some(limit) => frame_count.min(limit - rendered),
            None => frame_count,
        };

        mixer.process(calculate_output_pts(Some(0), rendered, sample_rate));
        write_main(&mixer, bus, frames * channels, &mut writer)?;
        if let (Some((id, _)), Some(aux_writer)) = (aux.as_ref(), aux_writer.as_mut()) {
            write_aux(&mixer, *id, frames, aux_writer)?;
        }
        rendered += frames;
    }

    writer.finalize()?;
    if let Some(aux_writer) = aux_writer {
        aux_writer.finalize()?;
    }
    info!(
        "rendered {} frames ({:.2}s) from {} track(s) to {}",
        rendered,
        rendered as f64 / sample_rate as f64,
        feeds.len(),
        out.display()
    );

    Ok(RenderSummary {
        frames: rendered,
        tracks: feeds.len(),
        sample_rate,
        hook: mixer.process_hook(),
    })
}

fn add_track<S: MixSample>(
    mixer: &mut AudioMixer<S>,
    track: &TrackConfig,
    input: &WavInput,
    bus: BusId,
    aux: Option<AuxBusId>,
) -> Result<TrackName, RenderError> {
    let mask = ChannelMask::from_channel_count(input.channels).ok_or_else(|| {
        RenderError::Input(format!(
            "{}: unsupported channel count {}",
            track.path.display(),
            input.channels
        ))
    })?;
    let name = mixer.acquire_track(mask, input.format, track.session_id)?;

    let mut params = vec![Parameter::Track(TrackParam::MainBuffer(bus))];
    let source_rate = track.source_rate.unwrap_or(input.sample_rate);
    if source_rate != mixer.sample_rate() {
        params.push(Parameter::Resample(ResampleParam::SampleRate(source_rate)));
    }
    match track.ramp_from {
        Some(from) => params.extend([
            Parameter::Volume(VolumeParam::Volume0(from)),
            Parameter::Volume(VolumeParam::Volume1(from)),
            Parameter::RampVolume(VolumeParam::Volume0(track.volume_left)),
            Parameter::RampVolume(VolumeParam::Volume1(track.volume_right)),
        ]),
        None => params.extend([
            Parameter::Volume(VolumeParam::Volume0(track.volume_left)),
            Parameter::Volume(VolumeParam::Volume1(track.volume_right)),
        ]),
    }
    if let Some(aux) = aux {
        params.push(Parameter::Track(TrackParam::AuxBuffer(Some(aux))));
        if track.aux_ramp {
            params.push(Parameter::Volume(VolumeParam::AuxLevel(0.0)));
            params.push(Parameter::RampVolume(VolumeParam::AuxLevel(track.aux_level)));
        } else {
            params.push(Parameter::Volume(VolumeParam::AuxLevel(track.aux_level)));
        }
    }
    for param in params {
        mixer.set_parameter(name, param)?;
    }
    debug!("{} bound to {}", track.path.display(), name);
    Ok(name)
}

fn write_main<S: MixSample>(
    mixer: &AudioMixer<S>,
    bus: BusId,
    samples: usize,
    writer: &mut WavWriter<BufWriter<File>>,
) -> Result<(), RenderError> {
    let output = mixer
        .output_bus(bus)
        .ok_or(RenderError::Mixer(MixerError::InvalidBus(bus.index())))?;
    match output.samples() {
        BusSamples::Pcm16(block) => {
            for &sample in &block[..samples.min(block.len())] {
                writer.write_sample(sample)?;
            }
        }
        BusSamples::Float(block) => {
            for &sample in &block[..samples.min(block.len())] {
                writer.write_sample(sample)?;
            }
        }
    }
    Ok(())
}

fn write_aux<S: MixSample>(
    mixer: &AudioMixer<S>,
    aux: AuxBusId,
    frames: usize,
    writer: &mut WavWriter<BufWriter<File>>,
) -> Result<(), RenderError> {
    let block = mixer
        .aux_bus(aux)
        .ok_or(RenderError::Mixer(MixerError::InvalidBus(aux.index())))?;
    for &sample in &block[..frames.min(block.len())] {
        writer.write_sample(sample.to_unit())?;
    }
    Ok(())
}

/// Load a session file, resolving its relative paths.
pub fn load_session(path: &Path) -> Result<SessionConfig, RenderError> {
    let json = std::fs::read_to_string(path)?;
    let mut session = SessionConfig::from_json_str(&json)?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    session.resolve_paths(&base);
    Ok(session)
}
