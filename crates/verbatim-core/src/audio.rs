use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Descriptor for one audio input as handed to an adapter.
///
/// `temp_path` is set iff preprocessing produced a derived file; the caller
/// that requested preprocessing owns its deletion.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioInput {
    pub path: PathBuf,
    /// Lowercased extension without the leading dot.
    pub format: String,
    pub size_bytes: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
    pub metadata: BTreeMap<String, String>,
    pub temp_path: Option<PathBuf>,
}

impl AudioInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            path,
            format,
            size_bytes: 0,
            sample_rate: 0,
            channels: 0,
            duration_secs: 0.0,
            metadata: BTreeMap::new(),
            temp_path: None,
        }
    }

    /// The file an adapter should actually read: the preprocessed temp file
    /// when present, the original otherwise.
    pub fn effective_path(&self) -> &Path {
        self.temp_path.as_deref().unwrap_or(&self.path)
    }

    pub fn is_mono_16k(&self) -> bool {
        self.sample_rate == 16_000 && self.channels == 1
    }
}
