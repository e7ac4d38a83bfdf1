// src/drivers/mod.rs
// ingest drivers, one per source format
pub mod tdms;
pub mod text;
pub mod waveform;
use std::path::Path;
use crate::error::{ConvertError, Result};
pub use tdms::{PropertyValue, TdmsChannel, TdmsFile, TdmsGroup};
/// Source formats understood by `Registry::load_from_file`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Tdms,
    Csv,
    Dat,
}
impl SourceFormat {
    /// Picks the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "tdms" => Ok(SourceFormat::Tdms),
            "csv" => Ok(SourceFormat::Csv),
            "dat" => Ok(SourceFormat::Dat),
            _ => Err(ConvertError::UnsupportedFormat(format!(
                "no ingest driver for {}",
                path.display()
            ))),
        }
    }
}
