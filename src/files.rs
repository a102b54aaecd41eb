//! Input and output file collaborators.
//!
//! Thin wrappers over the WAV container codec, presenting the raw
//! interleaved little-endian byte streams the transcoder works with. The
//! container itself is a black box: it reads and writes typed PCM samples
//! with format metadata, and these wrappers bridge between that surface and
//! the driver's byte-level view.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use i24::I24;

use crate::error::FileError;
use crate::format::{DriverSampleType, FileFormat, SampleEncoding};

fn file_format_of(spec: hound::WavSpec) -> FileFormat {
    FileFormat {
        bits_per_sample: spec.bits_per_sample,
        encoding: match spec.sample_format {
            hound::SampleFormat::Int => SampleEncoding::Integer,
            hound::SampleFormat::Float => SampleEncoding::Float,
        },
    }
}

/// A WAV file played into the driver's output-bound buffers.
pub struct InputFile {
    reader: hound::WavReader<BufReader<File>>,
}

impl InputFile {
    /// Opens the file for reading.
    pub fn open(path: &Path) -> Result<Self, FileError> {
        let reader = hound::WavReader::open(path).map_err(|source| FileError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { reader })
    }

    /// Sample rate the container reports.
    pub fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }

    /// Checks the container's metadata against the negotiated streaming
    /// parameters. Every field must match exactly.
    pub fn validate(
        &self,
        sample_rate: f64,
        channels: usize,
        sample_type: DriverSampleType,
    ) -> Result<(), FileError> {
        let spec = self.reader.spec();
        if f64::from(spec.sample_rate) != sample_rate {
            return Err(FileError::SampleRateMismatch {
                expected: sample_rate as u32,
                actual: spec.sample_rate,
            });
        }
        if usize::from(spec.channels) != channels {
            return Err(FileError::ChannelCountMismatch {
                expected: channels,
                actual: usize::from(spec.channels),
            });
        }
        let format = file_format_of(spec);
        let file_type = format.driver_type().ok_or(FileError::UnrecognizedFormat {
            bits: format.bits_per_sample,
            encoding: format.encoding,
        })?;
        if file_type != sample_type {
            return Err(FileError::SampleTypeMismatch {
                expected: sample_type,
                actual: file_type,
            });
        }
        Ok(())
    }

    /// Reads up to `bytes` bytes of interleaved little-endian sample data.
    ///
    /// The result is shorter than `bytes` only when the file runs out of
    /// samples; exhaustion is not an error — zero-padding the shortfall is
    /// the caller's concern.
    pub fn read_interleaved(&mut self, bytes: usize) -> Result<Vec<u8>, FileError> {
        let spec = self.reader.spec();
        let width = usize::from(spec.bits_per_sample.div_ceil(8));
        let wanted = bytes / width.max(1);
        let mut out = Vec::with_capacity(bytes);

        match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => {
                for sample in self.reader.samples::<i16>().take(wanted) {
                    out.extend_from_slice(&sample.map_err(FileError::Read)?.to_le_bytes());
                }
            }
            (hound::SampleFormat::Int, 24) => {
                for sample in self.reader.samples::<i32>().take(wanted) {
                    let value = I24::saturating_from_i32(sample.map_err(FileError::Read)?);
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
            (hound::SampleFormat::Int, 32) => {
                for sample in self.reader.samples::<i32>().take(wanted) {
                    out.extend_from_slice(&sample.map_err(FileError::Read)?.to_le_bytes());
                }
            }
            (hound::SampleFormat::Float, 32) => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    out.extend_from_slice(&sample.map_err(FileError::Read)?.to_le_bytes());
                }
            }
            (_, bits) => {
                let format = file_format_of(spec);
                return Err(FileError::UnrecognizedFormat {
                    bits,
                    encoding: format.encoding,
                });
            }
        }

        Ok(out)
    }
}

/// A WAV file recording the driver's input-bound buffers.
///
/// The container format is chosen to match the resolved driver sample type;
/// driver types with no container representation are rejected at creation.
pub struct OutputFile {
    writer: hound::WavWriter<BufWriter<File>>,
    sample_type: DriverSampleType,
}

impl OutputFile {
    /// Creates the file with metadata matching the negotiated parameters.
    pub fn create(
        path: &Path,
        sample_rate: f64,
        channels: usize,
        sample_type: DriverSampleType,
    ) -> Result<Self, FileError> {
        let format = sample_type
            .file_format()
            .ok_or(FileError::UnsupportedSampleType(sample_type))?;
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate: sample_rate as u32,
            bits_per_sample: format.bits_per_sample,
            sample_format: match format.encoding {
                SampleEncoding::Integer => hound::SampleFormat::Int,
                SampleEncoding::Float => hound::SampleFormat::Float,
            },
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|source| FileError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            writer,
            sample_type,
        })
    }

    /// Appends interleaved little-endian sample data to the container.
    pub fn write_interleaved(&mut self, bytes: &[u8]) -> Result<(), FileError> {
        let width = self.sample_type.byte_width();
        for chunk in bytes.chunks_exact(width) {
            match self.sample_type {
                DriverSampleType::Int16Lsb => self
                    .writer
                    .write_sample(i16::from_le_bytes([chunk[0], chunk[1]])),
                DriverSampleType::Int24Lsb => self
                    .writer
                    .write_sample(I24::from_le_bytes([chunk[0], chunk[1], chunk[2]]).to_i32()),
                DriverSampleType::Int32Lsb => self
                    .writer
                    .write_sample(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
                DriverSampleType::Float32Lsb => self
                    .writer
                    .write_sample(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
                other => return Err(FileError::UnsupportedSampleType(other)),
            }
            .map_err(FileError::Write)?;
        }
        Ok(())
    }

    /// Patches the container metadata and closes the file.
    pub fn finalize(self) -> Result<(), FileError> {
        self.writer.finalize().map_err(FileError::Finalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wav_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        dir.path().join(name)
    }

    fn write_float_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in 0..frames {
            for channel in 0..channels {
                writer
                    .write_sample(frame as f32 + f32::from(channel) * 0.5)
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_validate_accepts_matching_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_wav_path(&dir, "in.wav");
        write_float_wav(&path, 2, 48000, 4);

        let input = InputFile::open(&path).unwrap();
        assert_eq!(input.sample_rate(), 48000);
        input
            .validate(48000.0, 2, DriverSampleType::Float32Lsb)
            .unwrap();
    }

    #[test]
    fn test_validate_rejects_each_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_wav_path(&dir, "in.wav");
        write_float_wav(&path, 2, 48000, 4);

        let input = InputFile::open(&path).unwrap();
        assert!(matches!(
            input.validate(44100.0, 2, DriverSampleType::Float32Lsb),
            Err(FileError::SampleRateMismatch { .. })
        ));
        assert!(matches!(
            input.validate(48000.0, 4, DriverSampleType::Float32Lsb),
            Err(FileError::ChannelCountMismatch { .. })
        ));
        assert!(matches!(
            input.validate(48000.0, 2, DriverSampleType::Int16Lsb),
            Err(FileError::SampleTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_read_returns_short_buffer_at_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_wav_path(&dir, "short.wav");
        write_float_wav(&path, 1, 48000, 3);

        let mut input = InputFile::open(&path).unwrap();
        // Ask for more than the file holds: 3 samples * 4 bytes available.
        let bytes = input.read_interleaved(8 * 4).unwrap();
        assert_eq!(bytes.len(), 3 * 4);

        // Subsequent reads yield nothing, still without error.
        assert!(input.read_interleaved(4).unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_wav_path(&dir, "out.wav");

        let frames: Vec<f32> = vec![0.0, 0.25, -0.25, 1.0, -1.0, 0.5];
        let mut bytes = Vec::new();
        for value in &frames {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let mut output =
            OutputFile::create(&path, 48000.0, 2, DriverSampleType::Float32Lsb).unwrap();
        output.write_interleaved(&bytes).unwrap();
        output.finalize().unwrap();

        let mut input = InputFile::open(&path).unwrap();
        input
            .validate(48000.0, 2, DriverSampleType::Float32Lsb)
            .unwrap();
        assert_eq!(input.read_interleaved(bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn test_int24_write_read_preserves_sign() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_wav_path(&dir, "i24.wav");

        // -2 as a 24-bit little-endian integer, then 5.
        let bytes = [0xFE, 0xFF, 0xFF, 0x05, 0x00, 0x00];

        let mut output = OutputFile::create(&path, 44100.0, 1, DriverSampleType::Int24Lsb).unwrap();
        output.write_interleaved(&bytes).unwrap();
        output.finalize().unwrap();

        let mut input = InputFile::open(&path).unwrap();
        input
            .validate(44100.0, 1, DriverSampleType::Int24Lsb)
            .unwrap();
        assert_eq!(input.read_interleaved(bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn test_unsupported_sample_type_rejected_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_wav_path(&dir, "bad.wav");

        for sample_type in [
            DriverSampleType::Float64Lsb,
            DriverSampleType::Int16Msb,
            DriverSampleType::Float32Msb,
        ] {
            assert!(matches!(
                OutputFile::create(&path, 48000.0, 2, sample_type),
                Err(FileError::UnsupportedSampleType(_))
            ));
        }
    }
}
