use std::collections::BTreeMap;
use std::path::Path;
use chrono::NaiveDateTime;
use hdf5::types::VarLenUnicode;
use log::info;
use crate::channel::{Channel, ATTR_START_TIME};
use crate::error::{ConvertError, Result};
use crate::registry::Registry;
use super::{require_group, write_i64_attr};
pub const INDEX_DATASET: &str = "index";
pub const COLUMNS_ATTR: &str = "columns";
pub const ATTR_END_TIME: &str = "EndTime";
fn to_nanos(instant: NaiveDateTime) -> Result<i64> {
    instant.and_utc().timestamp_nanos_opt().ok_or_else(|| {
        ConvertError::UnsupportedFormat(format!("{instant} does not fit a 64-bit ns count"))
    })
}
/// Members of one `(parent, device)` frame, sharing the index of the first.
struct Frame<'a> {
    index: &'a [NaiveDateTime],
    columns: Vec<(&'a str, &'a Channel)>,
}
fn frames(registry: &Registry) -> Result<BTreeMap<String, Frame<'_>>> {
    let mut frames: BTreeMap<String, Frame<'_>> = BTreeMap::new();
    for key in registry.sorted_keys() {
        let channel = registry.get(&key)?;
        if !channel.export_eligible() {
            continue;
        }
        let frame_key = format!("{}/{}", channel.parent(), channel.device());
        let frame = frames.entry(frame_key.clone()).or_insert_with(|| Frame {
            index: channel.absolute_time(),
            columns: Vec::new(),
        });
        if channel.len() != frame.index.len() {
            return Err(ConvertError::LengthMismatch {
                what: format!("frame {frame_key} column {}", channel.leaf_name()),
                expected: frame.index.len(),
                actual: channel.len(),
            });
        }
        frame.columns.push((channel.leaf_name(), channel));
    }
    Ok(frames)
}
/// Start and end of the recording: the file header if known, else the
/// span of the exported channels.
fn file_span(registry: &Registry) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let exported = || registry.iter().map(|(_, c)| c).filter(|c| c.export_eligible());
    let start = registry
        .file_start_time
        .or_else(|| exported().map(Channel::start_instant).min())?;
    let end = registry
        .file_end_time
        .or_else(|| exported().filter_map(|c| c.absolute_time().last().copied()).max())
        .unwrap_or(start);
    Some((start, end))
}
/// One frame group per `(parent, device)` with an `index` dataset of ns
/// instants and one column dataset per channel.
pub fn write_tabular(registry: &Registry, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let frames = frames(registry)?;
    let file = hdf5::File::create(path)?;
    for (frame_key, frame) in &frames {
        let group = require_group(&file, frame_key)?;
        let index = frame
            .index
            .iter()
            .map(|t| to_nanos(*t))
            .collect::<Result<Vec<i64>>>()?;
        let dataset = group.new_dataset::<i64>().shape(index.len()).create(INDEX_DATASET)?;
        if !index.is_empty() {
            dataset.write_raw(&index)?;
        }
        let mut names = Vec::with_capacity(frame.columns.len());
        for (leaf, channel) in &frame.columns {
            let column = group.new_dataset::<f64>().shape(channel.len()).create(*leaf)?;
            if !channel.is_empty() {
                column.write_raw(&channel.samples().to_vec())?;
            }
            let name: VarLenUnicode = leaf
                .parse()
                .map_err(|_| ConvertError::invalid_type(*leaf, "string without NUL bytes", "string with NUL bytes"))?;
            names.push(name);
        }
        group
            .new_attr::<VarLenUnicode>()
            .shape(names.len())
            .create(COLUMNS_ATTR)?
            .write_raw(&names)?;
    }
    if let Some((start, end)) = file_span(registry) {
        write_i64_attr(&file, ATTR_START_TIME, to_nanos(start)?)?;
        write_i64_attr(&file, ATTR_END_TIME, to_nanos(end)?)?;
    }
    file.flush()?;
    info!("wrote {} frames to {}", frames.len(), path.display());
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 9, 23)
            .unwrap()
            .and_hms_opt(9, 5, 59)
            .unwrap()
    }
    fn timed(name: &str, device: &str, samples: Vec<f64>) -> Channel {
        let mut channel = Channel::from_vec(name, device, samples);
        channel.set_start_instant(t0()).unwrap();
        channel.set_step_ms(100).unwrap();
        channel
    }
    #[test]
    fn frames_share_the_first_members_index() {
        let mut registry = Registry::new();
        registry.file_start_time = Some(t0());
        registry.file_end_time = Some(t0() + Duration::seconds(1));
        registry.add(timed("ADWin/VSample", "ADWin", vec![1.0, 2.0, 3.0]));
        registry.add(timed("ADWin/ISample", "ADWin", vec![4.0, 5.0, 6.0]));
        registry.add(timed("IPS/Magnetfield", "IPS", vec![0.5]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        write_tabular(&registry, &path).unwrap();
        let file = hdf5::File::open(&path).unwrap();
        let adwin = file.group("proc01/ADWin").unwrap();
        let index: Vec<i64> = adwin.dataset(INDEX_DATASET).unwrap().read_raw().unwrap();
        let t0_ns = t0().and_utc().timestamp_nanos_opt().unwrap();
        assert_eq!(index, vec![t0_ns, t0_ns + 100_000_000, t0_ns + 200_000_000]);
        let isample: Vec<f64> = adwin.dataset("ISample").unwrap().read_raw().unwrap();
        assert_eq!(isample, vec![4.0, 5.0, 6.0]);
        let columns: Vec<VarLenUnicode> = adwin.attr(COLUMNS_ATTR).unwrap().read_raw().unwrap();
        let columns: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
        assert_eq!(columns, vec!["ISample", "Time_m", "VSample"]);
        assert!(file.link_exists("proc01/IPS"));
        let start: i64 = file.attr(ATTR_START_TIME).unwrap().read_scalar().unwrap();
        let end: i64 = file.attr(ATTR_END_TIME).unwrap().read_scalar().unwrap();
        assert_eq!(start, t0_ns);
        assert_eq!(end, t0_ns + 1_000_000_000);
    }
    #[test]
    fn hidden_channels_are_left_out() {
        let mut registry = Registry::new();
        registry.add(timed("ADWin/VSample", "ADWin", vec![1.0, 2.0]));
        let mut hidden = timed("ADWin/TCap", "ADWin", vec![9.0]);
        hidden.set_export_eligible(false);
        registry.add(hidden);
        let mut hidden_device = timed("IPS/Magnetfield", "IPS", vec![0.5]);
        hidden_device.set_export_eligible(false);
        registry.add(hidden_device);
        registry.set_export("proc01/IPS/Time_m", false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        write_tabular(&registry, &path).unwrap();
        let file = hdf5::File::open(&path).unwrap();
        let adwin = file.group("proc01/ADWin").unwrap();
        assert!(!adwin.link_exists("TCap"));
        let columns: Vec<VarLenUnicode> = adwin.attr(COLUMNS_ATTR).unwrap().read_raw().unwrap();
        let columns: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
        assert_eq!(columns, vec!["Time_m", "VSample"]);
        assert!(!file.link_exists("proc01/IPS"));
    }
    #[test]
    fn unequal_members_are_rejected() {
        let mut registry = Registry::new();
        registry.add(timed("ADWin/VSample", "ADWin", vec![1.0, 2.0, 3.0]));
        registry.add(timed("ADWin/ISample", "ADWin", vec![4.0]));
        let dir = tempfile::tempdir().unwrap();
        let err = write_tabular(&registry, dir.path().join("run.h5")).unwrap_err();
        assert!(matches!(err, ConvertError::LengthMismatch { expected: 1, actual: 3, .. }));
    }
    #[test]
    fn span_falls_back_to_channel_times() {
        let mut registry = Registry::new();
        registry.add(timed("ADWin/VSample", "ADWin", vec![1.0, 2.0, 3.0]));
        let (start, end) = file_span(&registry).unwrap();
        assert_eq!(start, t0());
        assert_eq!(end, t0() + Duration::milliseconds(200));
        assert!(file_span(&Registry::new()).is_none());
    }
}
