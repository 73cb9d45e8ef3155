use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};

use crate::stim::StimError;

/// Raw multiplexed acquisition stream, one u16 word per tick.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSampleStream {
    samples: Vec<u16>,
}

impl RawSampleStream {
    pub fn new(samples: Vec<u16>) -> Self {
        Self { samples }
    }

    /// Parses a flat little-endian u16 buffer. A trailing odd byte is dropped.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, StimError> {
        let usable = bytes.len() - bytes.len() % 2;
        if usable != bytes.len() {
            warn!(
                "raw sample buffer has an odd length ({} bytes); ignoring the trailing byte",
                bytes.len()
            );
        }
        let mut samples = vec![0u16; usable / 2];
        let mut reader = &bytes[..usable];
        reader.read_u16_into::<LittleEndian>(&mut samples)?;
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Anything that can hand over a complete raw recording.
pub trait SampleSource {
    fn read_stream(&mut self) -> Result<RawSampleStream, StimError>;
}

/// Reads `sample.bin` style files from disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSource for FileSource {
    fn read_stream(&mut self) -> Result<RawSampleStream, StimError> {
        let bytes = fs::read(&self.path)?;
        let stream = RawSampleStream::from_le_bytes(&bytes)?;
        debug!("read {} raw samples from {}", stream.len(), self.path.display());
        Ok(stream)
    }
}

/// In-memory source useful for tests and synthetic recordings.
pub struct ManualSource {
    samples: Vec<u16>,
}

impl ManualSource {
    pub fn new(samples: impl IntoIterator<Item = u16>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }
}

impl SampleSource for ManualSource {
    fn read_stream(&mut self) -> Result<RawSampleStream, StimError> {
        Ok(RawSampleStream::new(self.samples.clone()))
    }
}
