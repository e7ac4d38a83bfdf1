use std::path::Path;
use chrono::{Duration, NaiveDateTime};
use hdf5::types::{TypeDescriptor, VarLenUnicode};
use log::{debug, info, warn};
use crate::channel::{AttrValue, Channel, ATTR_LENGTH, ATTR_START_TIME, ATTR_TIME_INTERVAL};
use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};
use crate::registry::Registry;
use super::{require_group, write_f64_attr, write_i64_attr, write_text_attr, write_text_list_attr};
/// Extra attribute carrying the physical unit.
pub const ATTR_UNIT: &str = "Unit";
/// Names of the attributes stored as ISO strings and as millisecond counts.
pub const ATTR_INSTANT_KEYS: &str = "InstantAttributes";
pub const ATTR_DURATION_KEYS: &str = "DurationAttributes";
const READ_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
fn write_attr(location: &hdf5::Location, name: &str, value: &AttrValue) -> Result<()> {
    match value {
        AttrValue::Int(v) => write_i64_attr(location, name, *v),
        AttrValue::Float(v) => write_f64_attr(location, name, *v),
        AttrValue::Duration(d) => write_i64_attr(location, name, d.num_milliseconds()),
        AttrValue::Instant(_) | AttrValue::Text(_) => write_text_attr(location, name, &value.to_string()),
    }
}
/// One dataset per export-eligible channel at `/{parent}/{device}/{leaf}`,
/// carrying the channel's attributes.
pub fn write_dense(registry: &Registry, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = hdf5::File::create(path)?;
    let mut written = 0usize;
    for key in registry.sorted_keys() {
        let channel = registry.get(&key)?;
        if !channel.export_eligible() {
            continue;
        }
        let (group_path, leaf) = key.rsplit_once('/').unwrap_or(("", key.as_str()));
        let group = require_group(&file, group_path)?;
        let dataset = group.new_dataset::<f64>().shape(channel.len()).create(leaf)?;
        if !channel.is_empty() {
            dataset.write_raw(&channel.samples().to_vec())?;
        }
        let mut instants = Vec::new();
        let mut durations = Vec::new();
        for (name, value) in channel.attributes() {
            if [ATTR_UNIT, ATTR_INSTANT_KEYS, ATTR_DURATION_KEYS].contains(&name.as_str()) {
                continue;
            }
            match value {
                AttrValue::Instant(_) => instants.push(name.clone()),
                AttrValue::Duration(_) => durations.push(name.clone()),
                _ => {}
            }
            write_attr(&dataset, &name, &value)?;
        }
        write_text_attr(&dataset, ATTR_UNIT, channel.unit())?;
        write_text_list_attr(&dataset, ATTR_INSTANT_KEYS, &instants)?;
        write_text_list_attr(&dataset, ATTR_DURATION_KEYS, &durations)?;
        written += 1;
    }
    file.flush()?;
    info!("wrote {written} channels to {}", path.display());
    Ok(())
}
fn read_attr(location: &hdf5::Location, name: &str) -> Result<Option<AttrValue>> {
    let attr = location.attr(name)?;
    let value = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            AttrValue::Int(attr.read_scalar::<i64>()?)
        }
        TypeDescriptor::Float(_) => AttrValue::Float(attr.read_scalar::<f64>()?),
        TypeDescriptor::VarLenUnicode => {
            AttrValue::Text(attr.read_scalar::<VarLenUnicode>()?.as_str().to_owned())
        }
        other => {
            warn!("{}: attribute {name} has unsupported type {other:?}", location.name());
            return Ok(None);
        }
    };
    Ok(Some(value))
}
fn parse_instant(name: &str, text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, READ_ISO_FORMAT)
        .map_err(|_| ConvertError::invalid_type(name, "ISO-8601 instant", "string"))
}
/// Entries of a list attribute written by `write_text_list_attr`; empty if absent.
fn read_text_list_attr(location: &hdf5::Location, name: &str) -> Result<Vec<String>> {
    if !location.attr_names()?.iter().any(|n| n == name) {
        return Ok(Vec::new());
    }
    let attr = location.attr(name)?;
    if attr.size() == 0 {
        return Ok(Vec::new());
    }
    let entries: Vec<VarLenUnicode> = attr.read_raw()?;
    Ok(entries.iter().map(|e| e.as_str().to_owned()).collect())
}
fn restore_channel(dataset: &hdf5::Dataset, config: &ConverterConfig) -> Result<Channel> {
    let full = dataset.name();
    let mut segments = full.trim_start_matches('/').splitn(2, '/');
    let parent = segments.next().unwrap_or(&config.raw_parent).to_owned();
    let name = segments.next().unwrap_or_default().to_owned();
    let device = name.split('/').next().unwrap_or_default().to_owned();
    let samples: Vec<f64> = if dataset.size() == 0 {
        Vec::new()
    } else {
        dataset.read_raw()?
    };
    let mut channel = Channel::from_vec(&name, &device, samples);
    channel.set_parent(&parent);
    let mut instants = read_text_list_attr(dataset, ATTR_INSTANT_KEYS)?;
    let mut durations = read_text_list_attr(dataset, ATTR_DURATION_KEYS)?;
    // files without the lists still tag the mandatory keys
    instants.push(ATTR_START_TIME.to_owned());
    durations.push(ATTR_TIME_INTERVAL.to_owned());
    for attr_name in dataset.attr_names()? {
        if attr_name == ATTR_INSTANT_KEYS || attr_name == ATTR_DURATION_KEYS {
            continue;
        }
        let Some(value) = read_attr(dataset, &attr_name)? else {
            continue;
        };
        let value = match (attr_name.as_str(), value) {
            (_, AttrValue::Text(text)) if instants.contains(&attr_name) => {
                AttrValue::Instant(parse_instant(&attr_name, &text)?)
            }
            (_, AttrValue::Int(ms)) if durations.contains(&attr_name) => {
                let step = Duration::try_milliseconds(ms)
                    .ok_or_else(|| ConvertError::invalid_type(&attr_name, "duration in ms", "int"))?;
                AttrValue::Duration(step)
            }
            (ATTR_UNIT, AttrValue::Text(unit)) => {
                channel.set_unit(&unit);
                continue;
            }
            (ATTR_LENGTH, _) => continue,
            (_, value) => value,
        };
        channel.set_attribute(&attr_name, value)?;
    }
    Ok(channel)
}
fn collect_datasets(group: &hdf5::Group, out: &mut Vec<hdf5::Dataset>) -> Result<()> {
    out.extend(group.datasets()?);
    for child in group.groups()? {
        collect_datasets(&child, out)?;
    }
    Ok(())
}
/// Loads a file written by [`write_dense`] back into a registry.
pub fn read_dense(path: impl AsRef<Path>, config: ConverterConfig) -> Result<Registry> {
    let path = path.as_ref();
    let file = hdf5::File::open(path)?;
    let mut datasets = Vec::new();
    collect_datasets(&file, &mut datasets)?;
    let mut registry = Registry::with_config(config);
    for dataset in &datasets {
        let channel = restore_channel(dataset, registry.config())?;
        debug!("restored {}", channel.key());
        registry.add(channel);
    }
    info!("read {} datasets from {}", datasets.len(), path.display());
    Ok(registry)
}
