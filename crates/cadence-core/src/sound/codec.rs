//! Compressed-codec decoder backed by Symphonia
//!
//! Catch-all raw-frame reader for everything the WAV parser does not handle
//! (FLAC, Ogg Vorbis, MP3, ADPCM WAV, ...). Packets are decoded into
//! interleaved f32 and served out of a small carry-over buffer so callers can
//! read any number of frames.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{self, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::{Decoder, SampleEncoding, SoundFormat, StreamInfo};
use crate::error::{AudioError, AudioResult};

/// Translate a Symphonia error into the engine taxonomy
fn map_error(err: SymphoniaError, context: &str) -> AudioError {
    match err {
        SymphoniaError::IoError(e) => AudioError::from_io(&e, context),
        SymphoniaError::Unsupported(what) => {
            AudioError::FormatError(format!("{}: unsupported {}", context, what))
        }
        SymphoniaError::DecodeError(what) => {
            AudioError::Malformed(format!("{}: {}", context, what))
        }
        SymphoniaError::SeekError(SeekErrorKind::Unseekable)
        | SymphoniaError::SeekError(SeekErrorKind::ForwardOnly) => AudioError::CannotSeek,
        SymphoniaError::SeekError(kind) => {
            AudioError::OutOfRange(format!("{}: seek failed ({:?})", context, kind))
        }
        SymphoniaError::LimitError(what) => AudioError::OutOfMemory(format!("{}: {}", context, what)),
        SymphoniaError::ResetRequired => {
            AudioError::Malformed(format!("{}: stream parameters changed", context))
        }
    }
}

fn sound_format(codec: codecs::CodecType, path: &Path) -> SoundFormat {
    if codec == codecs::CODEC_TYPE_FLAC {
        return SoundFormat::Flac;
    }
    if codec == codecs::CODEC_TYPE_VORBIS || codec == codecs::CODEC_TYPE_OPUS {
        return SoundFormat::Ogg;
    }
    if codec == codecs::CODEC_TYPE_MP3 {
        return SoundFormat::Mp3;
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") | Some("wave") => SoundFormat::Wav,
        _ => SoundFormat::Other,
    }
}

fn tag_key(key: StandardTagKey) -> Option<&'static str> {
    match key {
        StandardTagKey::TrackTitle => Some("title"),
        StandardTagKey::Copyright => Some("copyright"),
        StandardTagKey::Encoder | StandardTagKey::EncodedBy => Some("software"),
        StandardTagKey::Artist => Some("artist"),
        StandardTagKey::Comment => Some("comment"),
        StandardTagKey::Date | StandardTagKey::ReleaseDate => Some("date"),
        StandardTagKey::Album => Some("album"),
        StandardTagKey::License => Some("license"),
        StandardTagKey::TrackNumber => Some("tracknumber"),
        StandardTagKey::Genre => Some("genre"),
        _ => None,
    }
}

fn collect_tags(revision: &MetadataRevision, tags: &mut HashMap<String, String>) {
    for tag in revision.tags() {
        if let Some(key) = tag.std_key.and_then(tag_key) {
            tags.entry(key.to_string()).or_insert_with(|| tag.value.to_string());
        }
    }
}

/// Streaming decoder for compressed formats
pub struct CodecDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn codecs::Decoder>,
    track_id: u32,
    info: StreamInfo,
    /// Decoded samples not yet handed out (interleaved)
    pending: Vec<f32>,
    pending_pos: usize,
    /// Frames to discard after an accurate seek landed early
    skip_frames: u64,
    label: String,
    tags: HashMap<String, String>,
}

impl CodecDecoder {
    pub fn open(path: &Path) -> AudioResult<Self> {
        let label = path.display().to_string();
        let file = File::open(path).map_err(|e| AudioError::from_io(&e, &label))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let seekable = mss.is_seekable();

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| match e {
                // The probe scans to end of file when nothing matches
                SymphoniaError::Unsupported(_) => {
                    AudioError::FormatError(format!("{}: unrecognised container", label))
                }
                SymphoniaError::IoError(ref io)
                    if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    AudioError::FormatError(format!("{}: unrecognised container", label))
                }
                other => map_error(other, &label),
            })?;

        let mut tags = HashMap::new();
        if let Some(revision) = probed.format.metadata().current() {
            collect_tags(revision, &mut tags);
        }
        if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            collect_tags(revision, &mut tags);
        }

        let reader = probed.format;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::FormatError(format!("{}: no audio track", label)))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| match e {
                SymphoniaError::Unsupported(what) => {
                    AudioError::Encoding(format!("{}: {}", label, what))
                }
                other => map_error(other, &label),
            })?;

        let info = StreamInfo {
            sample_rate: params.sample_rate.unwrap_or(0),
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
            frames: params.n_frames.unwrap_or(0),
            sections: 1,
            seekable,
            format: sound_format(params.codec, path),
            encoding: SampleEncoding::Compressed,
        };

        let mut this = Self {
            reader,
            decoder,
            track_id,
            info,
            pending: Vec::new(),
            pending_pos: 0,
            skip_frames: 0,
            label,
            tags,
        };

        // Some containers only reveal the stream layout once the first packet decodes
        if this.info.sample_rate == 0 || this.info.channels == 0 {
            if !this.decode_packet()? {
                return Err(AudioError::Malformed(format!("{}: no audio frames", this.label)));
            }
        }

        log::debug!(
            "CodecDecoder: {} ({} Hz, {} ch, {:?}, {} frames)",
            this.label,
            this.info.sample_rate,
            this.info.channels,
            this.info.format,
            this.info.frames
        );

        Ok(this)
    }

    /// Decode the next packet of our track into `pending`
    ///
    /// Returns `false` at end of stream.
    fn decode_packet(&mut self) -> AudioResult<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(map_error(e, &self.label)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::warn!("CodecDecoder: skipping corrupt packet in {}: {}", self.label, msg);
                    continue;
                }
                Err(e) => return Err(map_error(e, &self.label)),
            };

            let spec = *decoded.spec();
            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            if self.info.sample_rate == 0 {
                self.info.sample_rate = spec.rate;
            }
            if self.info.channels == 0 {
                self.info.channels = spec.channels.count() as u16;
            }

            let mut samples = SampleBuffer::<f32>::new(frames as u64, spec);
            samples.copy_interleaved_ref(decoded);

            let channels = self.info.channels.max(1) as usize;
            let mut data = samples.samples();
            if self.skip_frames > 0 {
                let skip = (self.skip_frames as usize).min(frames);
                self.skip_frames -= skip as u64;
                data = &data[(skip * channels).min(data.len())..];
                if data.is_empty() {
                    continue;
                }
            }

            self.pending.clear();
            self.pending.extend_from_slice(data);
            self.pending_pos = 0;
            return Ok(true);
        }
    }

    /// Frames per time-base tick, for converting seek timestamps to frames
    fn ticks_to_frames(&self, ticks: u64) -> u64 {
        let time_base = self
            .reader
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)
            .and_then(|t| t.codec_params.time_base);
        match time_base {
            Some(tb) => {
                let time = tb.calc_time(ticks);
                ((time.seconds as f64 + time.frac) * self.info.sample_rate as f64).round() as u64
            }
            None => ticks,
        }
    }
}

impl Decoder for CodecDecoder {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frames(&mut self, out: &mut [f32], frames: usize) -> AudioResult<usize> {
        let channels = self.info.channels.max(1) as usize;
        let wanted = frames.min(out.len() / channels);
        let mut written = 0;

        while written < wanted {
            if self.pending_pos >= self.pending.len() && !self.decode_packet()? {
                break;
            }
            let available = (self.pending.len() - self.pending_pos) / channels;
            let take = available.min(wanted - written);
            let src = &self.pending[self.pending_pos..self.pending_pos + take * channels];
            out[written * channels..(written + take) * channels].copy_from_slice(src);
            self.pending_pos += take * channels;
            written += take;
        }

        Ok(written)
    }

    fn seek(&mut self, frame: u64) -> AudioResult<()> {
        if !self.info.seekable {
            return Err(AudioError::CannotSeek);
        }
        if self.info.frames > 0 && frame > self.info.frames {
            return Err(AudioError::OutOfRange(format!(
                "frame {} past end ({})",
                frame, self.info.frames
            )));
        }

        let rate = self.info.sample_rate.max(1) as u64;
        let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| map_error(e, &self.label))?;

        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.skip_frames = self.ticks_to_frames(seeked.required_ts.saturating_sub(seeked.actual_ts));
        Ok(())
    }

    fn metadata(&self, key: &str) -> Option<String> {
        self.tags.get(key).cloned()
    }
}
