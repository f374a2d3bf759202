//! Decodable audio sources
//!
//! A [`Sound`] wraps one open file and its decoder state behind a mutex, so
//! the channel worker (reading) and the control thread (seeking) never touch
//! the decoder at the same time.
//!
//! Decoding goes through the [`Decoder`] trait. The built-in WAV parser handles
//! plain PCM and float data; everything else falls back to the Symphonia-based
//! [`CodecDecoder`].

mod codec;
pub mod pcm;
mod wav;

pub use codec::CodecDecoder;
pub use wav::WavDecoder;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{AudioError, AudioResult};
use crate::hardware::PcmFormat;

/// Metadata keys understood by [`Sound::metadata`]
pub const METADATA_KEYS: [&str; 10] = [
    "title",
    "copyright",
    "software",
    "artist",
    "comment",
    "date",
    "album",
    "license",
    "tracknumber",
    "genre",
];

/// Container format of a sound file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundFormat {
    Wav,
    Rf64,
    Flac,
    Ogg,
    Mp3,
    #[default]
    Other,
}

/// Sample encoding inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleEncoding {
    Unsigned8,
    Signed16,
    Signed24,
    Signed32,
    Float32,
    Float64,
    /// Codec-compressed data decoded by the generic frame reader
    #[default]
    Compressed,
}

/// Stream properties reported by a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    /// Source channel count
    pub channels: u16,
    /// Total frames (0 = unknown)
    pub frames: u64,
    pub sections: u32,
    pub seekable: bool,
    pub format: SoundFormat,
    pub encoding: SampleEncoding,
}

/// Decoding-library boundary
///
/// Frames are interleaved f32 in the source channel layout.
pub trait Decoder: Send {
    fn info(&self) -> &StreamInfo;

    /// Decode up to `frames` frames into `out`; 0 means end of stream
    fn read_frames(&mut self, out: &mut [f32], frames: usize) -> AudioResult<usize>;

    fn seek(&mut self, frame: u64) -> AudioResult<()>;

    /// String metadata by key (see [`METADATA_KEYS`])
    fn metadata(&self, key: &str) -> Option<String>;
}

/// A block of decoded frames and where it started in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub frames: usize,
}

struct DecodeState {
    decoder: Box<dyn Decoder>,
    position: u64,
    /// Source-layout samples awaiting a fold to stereo
    scratch: Vec<f32>,
}

/// An open, decodable audio file
pub struct Sound {
    path: PathBuf,
    info: StreamInfo,
    state: Mutex<DecodeState>,
}

impl Sound {
    /// Canonical absolute form of a path, used for same-sound comparison
    pub fn normalize_path(path: &Path) -> AudioResult<PathBuf> {
        std::fs::canonicalize(path).map_err(|e| AudioError::from_io(&e, &path.display().to_string()))
    }

    /// Open a sound file
    ///
    /// Tries the WAV parser first and falls back to the codec decoder for
    /// anything it does not recognise or cannot convert.
    pub fn open(path: impl AsRef<Path>) -> AudioResult<Self> {
        let path = Self::normalize_path(path.as_ref())?;

        let decoder: Box<dyn Decoder> = match WavDecoder::open(&path) {
            Ok(wav) => Box::new(wav),
            Err(AudioError::Encoding(_)) | Err(AudioError::FormatError(_)) => {
                Box::new(CodecDecoder::open(&path)?)
            }
            Err(e) => return Err(e),
        };

        Ok(Self::from_decoder(path, decoder))
    }

    /// Wrap an already-open decoder
    pub fn from_decoder(path: PathBuf, decoder: Box<dyn Decoder>) -> Self {
        let info = decoder.info().clone();
        log::info!(
            "Sound: opened {} ({:?}/{:?}, {} Hz, {} ch, {} frames)",
            path.display(),
            info.format,
            info.encoding,
            info.sample_rate,
            info.channels,
            info.frames
        );

        Self {
            path,
            info,
            state: Mutex::new(DecodeState {
                decoder,
                position: 0,
                scratch: Vec::new(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    /// Source channel count
    pub fn channels(&self) -> u16 {
        self.info.channels
    }

    /// Buffer layout handed to the hardware
    ///
    /// Mono stays mono; everything wider is delivered as stereo.
    pub fn pcm_format(&self) -> PcmFormat {
        if self.info.channels == 1 {
            PcmFormat::Mono
        } else {
            PcmFormat::Stereo
        }
    }

    pub fn frames(&self) -> u64 {
        self.info.frames
    }

    pub fn duration_ms(&self) -> u64 {
        self.frame_to_ms(self.info.frames)
    }

    pub fn frame_to_ms(&self, frame: u64) -> u64 {
        if self.info.sample_rate == 0 {
            return 0;
        }
        let ms = frame as u128 * 1000 / self.info.sample_rate as u128;
        u64::try_from(ms).unwrap_or(u64::MAX)
    }

    /// Convert a millisecond offset to a frame index, rejecting offsets that overflow
    pub fn ms_to_frame(&self, ms: u64) -> AudioResult<u64> {
        ms.checked_mul(self.info.sample_rate as u64)
            .map(|scaled| scaled / 1000)
            .ok_or_else(|| AudioError::OutOfRange(format!("{} ms is not addressable", ms)))
    }

    /// Current decode position in frames
    pub fn position(&self) -> u64 {
        self.lock().position
    }

    /// Decode up to `frames` frames into `out` in [`pcm_format`](Self::pcm_format) layout
    ///
    /// Returns the number of frames written; 0 at end of stream.
    pub fn read_frames(&self, out: &mut [f32], frames: usize) -> AudioResult<usize> {
        Ok(self.read_chunk(out, frames)?.frames)
    }

    /// Like [`read_frames`](Self::read_frames), also reporting the start frame
    pub fn read_chunk(&self, out: &mut [f32], frames: usize) -> AudioResult<Chunk> {
        let src_channels = self.info.channels.max(1) as usize;
        let out_channels = self.pcm_format().channels();
        let frames = frames.min(out.len() / out_channels);

        let mut state = self.lock();
        let start = state.position;

        let read = if src_channels == out_channels {
            state.decoder.read_frames(out, frames)?
        } else {
            let DecodeState {
                decoder, scratch, ..
            } = &mut *state;
            scratch.resize(frames * src_channels, 0.0);
            let read = decoder.read_frames(scratch, frames)?;
            fold_to_stereo(&scratch[..read * src_channels], src_channels, &mut out[..read * 2]);
            read
        };

        state.position += read as u64;
        Ok(Chunk { start, frames: read })
    }

    /// Move the decode position
    ///
    /// Fails without moving when the source cannot seek or `frame` lies past
    /// the end of the stream.
    pub fn seek(&self, frame: u64) -> AudioResult<()> {
        if !self.info.seekable {
            return Err(AudioError::CannotSeek);
        }
        if self.info.frames > 0 && frame > self.info.frames {
            return Err(AudioError::OutOfRange(format!(
                "frame {} past end of {} ({} frames)",
                frame,
                self.path.display(),
                self.info.frames
            )));
        }

        let mut state = self.lock();
        state.decoder.seek(frame)?;
        state.position = frame;
        Ok(())
    }

    pub fn metadata(&self, key: &str) -> Option<String> {
        self.lock().decoder.metadata(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DecodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Sound {
    fn drop(&mut self) {
        log::debug!("Sound: closed {}", self.path.display());
    }
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sound")
            .field("path", &self.path)
            .field("info", &self.info)
            .finish()
    }
}

/// Fold a multichannel frame block down to stereo
///
/// Even-indexed channels average into the left side, odd-indexed into the right.
fn fold_to_stereo(input: &[f32], channels: usize, output: &mut [f32]) {
    let left_count = channels.div_ceil(2) as f32;
    let right_count = (channels / 2).max(1) as f32;

    for (frame, dst) in input.chunks_exact(channels).zip(output.chunks_exact_mut(2)) {
        let mut left = 0.0;
        let mut right = 0.0;
        for (i, &s) in frame.iter().enumerate() {
            if i % 2 == 0 {
                left += s;
            } else {
                right += s;
            }
        }
        dst[0] = left / left_count;
        dst[1] = if channels == 1 { dst[0] } else { right / right_count };
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::{write_sine_wav, write_wav_f32};
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let err = Sound::open("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, AudioError::FileNotFound(_)));
    }

    #[test]
    fn test_mono_stays_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_sine_wav(&path, 1, 8000, 16, 8000);

        let sound = Sound::open(&path).unwrap();
        assert_eq!(sound.pcm_format(), PcmFormat::Mono);
        assert_eq!(sound.duration_ms(), 1000);
        assert_eq!(sound.ms_to_frame(250).unwrap(), 2000);
        assert!(sound.path().is_absolute());
    }

    #[test]
    fn test_read_chunk_tracks_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 2, 8000, 16, 1000);

        let sound = Sound::open(&path).unwrap();
        let mut out = vec![0.0; 2 * 400];

        assert_eq!(sound.read_chunk(&mut out, 400).unwrap(), Chunk { start: 0, frames: 400 });
        assert_eq!(sound.read_chunk(&mut out, 400).unwrap(), Chunk { start: 400, frames: 400 });
        assert_eq!(sound.read_chunk(&mut out, 400).unwrap(), Chunk { start: 800, frames: 200 });
        assert_eq!(sound.read_frames(&mut out, 400).unwrap(), 0);
        assert_eq!(sound.position(), 1000);
    }

    #[test]
    fn test_huge_offsets_do_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1, 8000, 16, 800);

        let sound = Sound::open(&path).unwrap();
        assert!(matches!(sound.ms_to_frame(u64::MAX), Err(AudioError::OutOfRange(_))));
        assert!(matches!(sound.ms_to_frame(u64::MAX / 4000), Err(AudioError::OutOfRange(_))));
        assert_eq!(sound.frame_to_ms(u64::MAX), u64::MAX / 8);
    }

    #[test]
    fn test_seek_past_end_keeps_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1, 8000, 16, 1000);

        let sound = Sound::open(&path).unwrap();
        let mut out = vec![0.0; 300];
        sound.read_frames(&mut out, 300).unwrap();

        assert!(matches!(sound.seek(5000), Err(AudioError::OutOfRange(_))));
        assert_eq!(sound.position(), 300);

        sound.seek(0).unwrap();
        assert_eq!(sound.position(), 0);
    }

    #[test]
    fn test_multichannel_folds_to_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.wav");
        // One frame: FL=0.2 FR=0.4 RL=0.6 RR=0.8
        write_wav_f32(&path, 4, 8000, &[0.2, 0.4, 0.6, 0.8]);

        let sound = Sound::open(&path).unwrap();
        assert_eq!(sound.channels(), 4);
        assert_eq!(sound.pcm_format(), PcmFormat::Stereo);

        let mut out = [0.0f32; 2];
        assert_eq!(sound.read_frames(&mut out, 1).unwrap(), 1);
        assert!((out[0] - 0.4).abs() < 1e-6);
        assert!((out[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_fold_three_channels() {
        let mut out = [0.0f32; 2];
        fold_to_stereo(&[0.3, 0.5, 0.1], 3, &mut out);
        assert!((out[0] - 0.2).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }
}
