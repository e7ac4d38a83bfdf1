//! HDF5 writers (and the dense reader) for a [`Registry`](crate::Registry).
#[cfg(feature = "hdf5")]
mod dense;
#[cfg(feature = "hdf5")]
mod tabular;
use std::path::Path;
use crate::error::{ConvertError, Result};
#[cfg(feature = "hdf5")]
pub use dense::{read_dense, write_dense};
#[cfg(feature = "hdf5")]
pub use tabular::write_tabular;
/// On-disk layout, chosen by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// One dataset per channel (`.hdf5`, `.he5`, `.hdf`).
    Dense,
    /// One frame per `(parent, device)` (`.h5`).
    Tabular,
}
impl Layout {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "hdf5" | "he5" | "hdf" => Ok(Layout::Dense),
            "h5" => Ok(Layout::Tabular),
            _ => Err(ConvertError::UnsupportedFormat(format!(
                "no export layout for {}",
                path.display()
            ))),
        }
    }
}
/// Writes `registry` to `path` in the layout its extension selects.
#[cfg(feature = "hdf5")]
pub fn write(registry: &crate::Registry, path: impl AsRef<Path>) -> Result<Layout> {
    let path = path.as_ref();
    let layout = Layout::from_path(path)?;
    match layout {
        Layout::Dense => write_dense(registry, path)?,
        Layout::Tabular => write_tabular(registry, path)?,
    }
    Ok(layout)
}
/// Creates every group along `path` below `root`.
#[cfg(feature = "hdf5")]
pub(crate) fn require_group(root: &hdf5::Group, path: &str) -> Result<hdf5::Group> {
    let mut group = root.clone();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        group = if group.link_exists(segment) {
            group.group(segment)?
        } else {
            group.create_group(segment)?
        };
    }
    Ok(group)
}
#[cfg(feature = "hdf5")]
pub(crate) fn write_text_attr(location: &hdf5::Location, name: &str, value: &str) -> Result<()> {
    let value: hdf5::types::VarLenUnicode = value
        .parse()
        .map_err(|_| ConvertError::invalid_type(name, "string without NUL bytes", "string with NUL bytes"))?;
    location
        .new_attr::<hdf5::types::VarLenUnicode>()
        .shape(())
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}
/// A 1-D string attribute; nothing is written for an empty list.
#[cfg(feature = "hdf5")]
pub(crate) fn write_text_list_attr(location: &hdf5::Location, name: &str, values: &[String]) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let values = values
        .iter()
        .map(|v| {
            v.parse::<hdf5::types::VarLenUnicode>()
                .map_err(|_| ConvertError::invalid_type(name, "string without NUL bytes", "string with NUL bytes"))
        })
        .collect::<Result<Vec<_>>>()?;
    location
        .new_attr::<hdf5::types::VarLenUnicode>()
        .shape(values.len())
        .create(name)?
        .write_raw(&values)?;
    Ok(())
}
#[cfg(feature = "hdf5")]
pub(crate) fn write_i64_attr(location: &hdf5::Location, name: &str, value: i64) -> Result<()> {
    location
        .new_attr::<i64>()
        .shape(())
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}
#[cfg(feature = "hdf5")]
pub(crate) fn write_f64_attr(location: &hdf5::Location, name: &str, value: f64) -> Result<()> {
    location
        .new_attr::<f64>()
        .shape(())
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}
