//! RIFF/RF64 WAVE decoder
//!
//! Reads uncompressed PCM and IEEE float data straight from the `data` chunk.
//! Compressed format tags (ADPCM, A-law, µ-law, ...) are rejected with
//! [`AudioError::Encoding`] so the caller can fall back to the codec decoder.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::pcm::{self, PcmConverter};
use super::{Decoder, SampleEncoding, SoundFormat, StreamInfo};
use crate::error::{AudioError, AudioResult};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// RF64 placeholder for sizes stored in the ds64 chunk
const RF64_SIZE_PLACEHOLDER: u32 = 0xFFFF_FFFF;

/// Parsed `fmt ` chunk
#[derive(Debug, Clone)]
struct FmtChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn parse(data: &[u8]) -> AudioResult<Self> {
        if data.len() < 16 {
            return Err(AudioError::Malformed("fmt chunk too small".into()));
        }

        let mut format_tag = u16::from_le_bytes([data[0], data[1]]);
        if format_tag == WAVE_FORMAT_EXTENSIBLE {
            // cbSize(2) validBits(2) channelMask(4) then the SubFormat GUID,
            // whose first two bytes carry the real format tag
            if data.len() < 26 {
                return Err(AudioError::Malformed("extensible fmt chunk too small".into()));
            }
            format_tag = u16::from_le_bytes([data[24], data[25]]);
        }

        Ok(Self {
            format_tag,
            channels: u16::from_le_bytes([data[2], data[3]]),
            sample_rate: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            block_align: u16::from_le_bytes([data[12], data[13]]),
            bits_per_sample: u16::from_le_bytes([data[14], data[15]]),
        })
    }

    fn encoding(&self) -> AudioResult<SampleEncoding> {
        match (self.format_tag, self.bits_per_sample) {
            (WAVE_FORMAT_PCM, 8) => Ok(SampleEncoding::Unsigned8),
            (WAVE_FORMAT_PCM, 16) => Ok(SampleEncoding::Signed16),
            (WAVE_FORMAT_PCM, 24) => Ok(SampleEncoding::Signed24),
            (WAVE_FORMAT_PCM, 32) => Ok(SampleEncoding::Signed32),
            (WAVE_FORMAT_IEEE_FLOAT, 32) => Ok(SampleEncoding::Float32),
            (WAVE_FORMAT_IEEE_FLOAT, 64) => Ok(SampleEncoding::Float64),
            (WAVE_FORMAT_PCM, bits) | (WAVE_FORMAT_IEEE_FLOAT, bits) => Err(AudioError::Encoding(
                format!("{}-bit samples", bits),
            )),
            (tag, _) => Err(AudioError::Encoding(format!("WAVE format tag {:#06x}", tag))),
        }
    }
}

/// Map a LIST/INFO sub-chunk id to a metadata key
fn info_key(id: &[u8]) -> Option<&'static str> {
    match id {
        b"INAM" => Some("title"),
        b"ICOP" => Some("copyright"),
        b"ISFT" => Some("software"),
        b"IART" => Some("artist"),
        b"ICMT" => Some("comment"),
        b"ICRD" => Some("date"),
        b"IPRD" => Some("album"),
        b"ILIC" => Some("license"),
        b"ITRK" | b"IPRT" => Some("tracknumber"),
        b"IGNR" | b"GENR" => Some("genre"),
        _ => None,
    }
}

/// Parse the body of a `LIST` chunk of type `INFO`
fn parse_info_list(list: &[u8], tags: &mut HashMap<String, String>) {
    let mut pos = 4;
    while pos + 8 <= list.len() {
        let id = &list[pos..pos + 4];
        let size = u32::from_le_bytes([list[pos + 4], list[pos + 5], list[pos + 6], list[pos + 7]])
            as usize;
        let start = pos + 8;
        let end = (start + size).min(list.len());

        if let Some(key) = info_key(id) {
            let raw = &list[start..end];
            let text_end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let value = String::from_utf8_lossy(&raw[..text_end]).trim().to_string();
            if !value.is_empty() {
                tags.insert(key.to_string(), value);
            }
        }

        // Sub-chunks are word aligned
        pos = start + size + (size & 1);
    }
}

/// Streaming WAVE decoder
pub struct WavDecoder {
    reader: BufReader<File>,
    info: StreamInfo,
    data_offset: u64,
    block_align: usize,
    convert: PcmConverter,
    raw: Vec<u8>,
    frame: u64,
    tags: HashMap<String, String>,
}

impl WavDecoder {
    /// Open a WAVE file and position the reader at the first frame
    pub fn open(path: &Path) -> AudioResult<Self> {
        let label = path.display().to_string();
        let io_err = |e: std::io::Error| AudioError::from_io(&e, &label);

        let file = File::open(path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();
        let mut reader = BufReader::new(file);

        let mut header = [0u8; 12];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                AudioError::FormatError(format!("{}: too short for a RIFF header", label))
            }
            _ => io_err(e),
        })?;

        let is_rf64 = match &header[0..4] {
            b"RIFF" => false,
            b"RF64" => true,
            _ => return Err(AudioError::FormatError(format!("{}: not a RIFF/RF64 file", label))),
        };
        if &header[8..12] != b"WAVE" {
            return Err(AudioError::FormatError(format!("{}: not a WAVE file", label)));
        }

        let mut fmt: Option<FmtChunk> = None;
        let mut ds64_data_size: Option<u64> = None;
        let mut data: Option<(u64, u64)> = None;
        let mut tags = HashMap::new();

        loop {
            let mut chunk_header = [0u8; 8];
            if reader.read_exact(&mut chunk_header).is_err() {
                break;
            }
            let chunk_id = [chunk_header[0], chunk_header[1], chunk_header[2], chunk_header[3]];
            let chunk_size =
                u32::from_le_bytes([chunk_header[4], chunk_header[5], chunk_header[6], chunk_header[7]]);

            let mut skip = chunk_size as u64;
            match &chunk_id {
                b"ds64" if is_rf64 => {
                    let body = read_chunk_body(&mut reader, chunk_size, file_len).map_err(io_err)?;
                    if body.len() >= 16 {
                        // riffSize(8) then dataSize(8)
                        let mut size = [0u8; 8];
                        size.copy_from_slice(&body[8..16]);
                        ds64_data_size = Some(u64::from_le_bytes(size));
                    }
                    skip = 0;
                }
                b"fmt " => {
                    let body = read_chunk_body(&mut reader, chunk_size, file_len).map_err(io_err)?;
                    fmt = Some(FmtChunk::parse(&body)?);
                    skip = 0;
                }
                b"LIST" => {
                    let body = read_chunk_body(&mut reader, chunk_size, file_len).map_err(io_err)?;
                    if body.len() >= 4 && &body[0..4] == b"INFO" {
                        parse_info_list(&body, &mut tags);
                    }
                    skip = 0;
                }
                b"data" => {
                    let offset = reader.stream_position().map_err(io_err)?;
                    let declared = match (chunk_size, ds64_data_size) {
                        (RF64_SIZE_PLACEHOLDER, Some(size)) => size,
                        _ => chunk_size as u64,
                    };
                    // Truncated files: only count what is actually on disk
                    let size = declared.min(file_len.saturating_sub(offset));
                    data = Some((offset, size));
                    skip = size;
                }
                _ => {}
            }

            let pad = (chunk_size & 1) as u64;
            if skip + pad > 0 {
                reader
                    .seek(SeekFrom::Current((skip + pad) as i64))
                    .map_err(io_err)?;
            }
        }

        let fmt = fmt.ok_or_else(|| AudioError::Malformed(format!("{}: missing fmt chunk", label)))?;
        let (data_offset, data_size) =
            data.ok_or_else(|| AudioError::Malformed(format!("{}: missing data chunk", label)))?;

        let encoding = fmt.encoding()?;
        let convert = pcm::converter_for(encoding)
            .ok_or_else(|| AudioError::Encoding(format!("{:?}", encoding)))?;

        if fmt.channels == 0 || fmt.sample_rate == 0 {
            return Err(AudioError::Malformed(format!("{}: empty stream format", label)));
        }
        let block_align = fmt.channels as usize * pcm::bytes_per_sample(encoding);
        if fmt.block_align as usize != block_align {
            return Err(AudioError::Malformed(format!(
                "{}: block align {} does not match {} channels of {:?}",
                label, fmt.block_align, fmt.channels, encoding
            )));
        }

        reader.seek(SeekFrom::Start(data_offset)).map_err(io_err)?;

        let info = StreamInfo {
            sample_rate: fmt.sample_rate,
            channels: fmt.channels,
            frames: data_size / block_align as u64,
            sections: 1,
            seekable: true,
            format: if is_rf64 { SoundFormat::Rf64 } else { SoundFormat::Wav },
            encoding,
        };

        log::debug!(
            "WavDecoder: {} ({} Hz, {} ch, {:?}, {} frames)",
            label,
            info.sample_rate,
            info.channels,
            info.encoding,
            info.frames
        );

        Ok(Self {
            reader,
            info,
            data_offset,
            block_align,
            convert,
            raw: Vec::new(),
            frame: 0,
            tags,
        })
    }
}

/// Read a whole chunk body, refusing sizes that run past the end of the file
fn read_chunk_body(reader: &mut BufReader<File>, size: u32, file_len: u64) -> std::io::Result<Vec<u8>> {
    let remaining = file_len.saturating_sub(reader.stream_position()?);
    if size as u64 > remaining {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("chunk of {} bytes overruns the file", size),
        ));
    }
    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}

impl Decoder for WavDecoder {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frames(&mut self, out: &mut [f32], frames: usize) -> AudioResult<usize> {
        let channels = self.info.channels as usize;
        let remaining = self.info.frames.saturating_sub(self.frame);
        let count = (frames.min(out.len() / channels) as u64).min(remaining) as usize;
        if count == 0 {
            return Ok(0);
        }

        self.raw.resize(count * self.block_align, 0);
        self.reader
            .read_exact(&mut self.raw)
            .map_err(|e| AudioError::from_io(&e, "wav data"))?;
        (self.convert)(&self.raw, &mut out[..count * channels]);

        self.frame += count as u64;
        Ok(count)
    }

    fn seek(&mut self, frame: u64) -> AudioResult<()> {
        if frame > self.info.frames {
            return Err(AudioError::OutOfRange(format!(
                "frame {} past end ({})",
                frame, self.info.frames
            )));
        }
        let offset = self.data_offset + frame * self.block_align as u64;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| AudioError::from_io(&e, "wav seek"))?;
        self.frame = frame;
        Ok(())
    }

    fn metadata(&self, key: &str) -> Option<String> {
        self.tags.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::test_util::{write_sine_wav, write_wav_f32};

    #[test]
    fn test_open_16bit_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_sine_wav(&path, 1, 22050, 16, 2205);

        let decoder = WavDecoder::open(&path).unwrap();
        let info = decoder.info();
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 22050);
        assert_eq!(info.frames, 2205);
        assert_eq!(info.encoding, SampleEncoding::Signed16);
        assert_eq!(info.format, SoundFormat::Wav);
        assert!(info.seekable);
    }

    #[test]
    fn test_bit_depths_select_encoding() {
        let dir = tempfile::tempdir().unwrap();
        for (bits, encoding) in [
            (8, SampleEncoding::Unsigned8),
            (24, SampleEncoding::Signed24),
            (32, SampleEncoding::Signed32),
        ] {
            let path = dir.path().join(format!("b{}.wav", bits));
            write_sine_wav(&path, 2, 8000, bits, 100);
            let decoder = WavDecoder::open(&path).unwrap();
            assert_eq!(decoder.info().encoding, encoding, "{} bit", bits);
            assert_eq!(decoder.info().frames, 100);
        }
    }

    #[test]
    fn test_read_float_samples_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        write_wav_f32(&path, 2, 8000, &[0.5, -0.5, 0.25, -0.25, 1.0, -1.0]);

        let mut decoder = WavDecoder::open(&path).unwrap();
        assert_eq!(decoder.info().encoding, SampleEncoding::Float32);

        let mut out = [0.0f32; 8];
        assert_eq!(decoder.read_frames(&mut out, 4).unwrap(), 3);
        assert_eq!(&out[..6], &[0.5, -0.5, 0.25, -0.25, 1.0, -1.0]);
        assert_eq!(decoder.read_frames(&mut out, 4).unwrap(), 0);
    }

    #[test]
    fn test_seek_and_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        write_wav_f32(&path, 1, 8000, &[0.1, 0.2, 0.3, 0.4]);

        let mut decoder = WavDecoder::open(&path).unwrap();
        decoder.seek(2).unwrap();
        let mut out = [0.0f32; 4];
        assert_eq!(decoder.read_frames(&mut out, 4).unwrap(), 2);
        assert_eq!(&out[..2], &[0.3, 0.4]);

        assert!(matches!(decoder.seek(5), Err(AudioError::OutOfRange(_))));
        // Failed seek leaves the position alone
        assert_eq!(decoder.read_frames(&mut out, 4).unwrap(), 0);
    }

    #[test]
    fn test_info_list_metadata() {
        let mut list = b"INFO".to_vec();
        for (id, text) in [(b"INAM", "Night Drive\0"), (b"IART", "Nobody\0")] {
            list.extend_from_slice(id);
            list.extend_from_slice(&(text.len() as u32).to_le_bytes());
            list.extend_from_slice(text.as_bytes());
            if text.len() % 2 == 1 {
                list.push(0);
            }
        }

        let mut tags = HashMap::new();
        parse_info_list(&list, &mut tags);
        assert_eq!(tags.get("title").map(String::as_str), Some("Night Drive"));
        assert_eq!(tags.get("artist").map(String::as_str), Some("Nobody"));
    }

    #[test]
    fn test_compressed_tag_is_encoding_error() {
        // 4-bit IMA ADPCM header
        let mut fmt = vec![0u8; 20];
        fmt[0..2].copy_from_slice(&0x0011u16.to_le_bytes());
        fmt[14..16].copy_from_slice(&4u16.to_le_bytes());
        let parsed = FmtChunk::parse(&fmt).unwrap();
        assert!(matches!(parsed.encoding(), Err(AudioError::Encoding(_))));
    }

    #[test]
    fn test_not_riff_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.wav");
        std::fs::write(&path, b"this is definitely not audio").unwrap();
        assert!(matches!(WavDecoder::open(&path), Err(AudioError::FormatError(_))));
    }

    #[test]
    fn test_missing_data_chunk_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodata.wav");

        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&28u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&8000u32.to_le_bytes());
        bytes.extend_from_slice(&16000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(WavDecoder::open(&path), Err(AudioError::Malformed(_))));
    }

    #[test]
    fn test_oversized_list_chunk_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge_list.wav");

        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&8000u32.to_le_bytes());
        bytes.extend_from_slice(&16000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        // Claims close to 4 GiB but carries four bytes
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        bytes.extend_from_slice(b"INFO");
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(WavDecoder::open(&path), Err(AudioError::Malformed(_))));
    }
}
