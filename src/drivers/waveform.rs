//! Binary waveform ingest: turns a decoded [`TdmsFile`] into registry channels.
use std::collections::HashMap;
use chrono::NaiveDateTime;
use log::{debug, warn};
use once_cell::sync::Lazy;
use crate::channel::{AttrValue, Channel};
use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};
use crate::names;
use crate::registry::Registry;
use super::tdms::{PropertyValue, TdmsChannel, TdmsFile, TdmsGroup};
pub const ADWIN: &str = "ADWin";
const PROP_START_TIME: &str = "StartTime";
const PROP_END_TIME: &str = "EndTime";
const PROP_WF_START: &str = "wf_start_time";
const PROP_WF_INCREMENT: &str = "wf_increment";
const PROP_UNIT: &str = "unit_string";
/// Group properties of the ADWin box copied onto its channels, by leaf name.
static ADWIN_ROUTES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("ISample", &["IAmp"][..]),
        ("VSample", &["VAmp"][..]),
        ("dISample", &["IAmp", "LISens"][..]),
        ("dVSample", &["VAmp", "LVSens"][..]),
        ("VRuO", &["r max", "r min"][..]),
        ("Res_RuO", &["p0", "p1", "r0"][..]),
    ])
});
/// Group property keys routed onto channel `leaf` of `device`.
pub fn routed_properties(device: &str, leaf: &str) -> &'static [&'static str] {
    if device != ADWIN {
        return &[];
    }
    ADWIN_ROUTES.get(leaf).copied().unwrap_or(&[])
}
impl From<&PropertyValue> for AttrValue {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Int(v) => AttrValue::Int(*v),
            PropertyValue::UInt(v) => i64::try_from(*v)
                .map(AttrValue::Int)
                .unwrap_or(AttrValue::Float(*v as f64)),
            PropertyValue::Float(v) => AttrValue::Float(*v),
            PropertyValue::Bool(v) => AttrValue::Int(i64::from(*v)),
            PropertyValue::Text(s) => AttrValue::Text(s.clone()),
            PropertyValue::Timestamp(t) => AttrValue::Instant(*t),
        }
    }
}
/// Adds every data-carrying channel of `file` to `registry` in container order.
pub fn ingest(registry: &mut Registry, file: &TdmsFile) -> Result<()> {
    let config = registry.config().clone();
    let file_start = file.property(PROP_START_TIME).and_then(PropertyValue::as_timestamp);
    registry.file_start_time = file_start;
    registry.file_end_time = file.property(PROP_END_TIME).and_then(PropertyValue::as_timestamp);
    for group in file.groups() {
        for raw in file.group_channels(&group.name) {
            if let Some(channel) = build_channel(&config, file_start, group, raw)? {
                registry.add(channel);
            }
        }
    }
    Ok(())
}
fn build_channel(
    config: &ConverterConfig,
    file_start: Option<NaiveDateTime>,
    group: &TdmsGroup,
    raw: &TdmsChannel,
) -> Result<Option<Channel>> {
    let Some(wf_start) = raw.property(PROP_WF_START) else {
        debug!("{}: no {PROP_WF_START}, skipping placeholder", raw.path());
        return Ok(None);
    };
    let Some(start) = file_start.or_else(|| wf_start.as_timestamp()) else {
        warn!("{}: {PROP_WF_START} is not a timestamp, skipping", raw.path());
        return Ok(None);
    };
    let Some(increment) = raw.property(PROP_WF_INCREMENT).and_then(PropertyValue::as_f64) else {
        debug!("{}: no numeric {PROP_WF_INCREMENT}, skipping", raw.path());
        return Ok(None);
    };
    let device = names::normalize_device(&group.name);
    let mut step_ms = config.step_unit.to_millis(increment);
    if device == ADWIN {
        if let Some(forced) = config.adwin_step_ms {
            if step_ms != forced {
                debug!("{}: ADWin step {step_ms} ms forced to {forced} ms", raw.path());
                step_ms = forced;
            }
        }
    }
    if step_ms <= 0 {
        warn!(
            "{}: {PROP_WF_INCREMENT} = {increment} gives a {step_ms} ms step, skipping",
            raw.path()
        );
        return Ok(None);
    }
    let leaf = raw.name.as_str();
    let mut channel = Channel::from_vec(&format!("{device}/{leaf}"), &device, raw.data.clone());
    channel.set_parent(&config.raw_parent);
    channel.set_start_instant(start)?;
    channel.set_step_ms(step_ms)?;
    if let Some(PropertyValue::Text(unit)) = raw.property(PROP_UNIT) {
        if !unit.is_empty() {
            channel.set_unit(unit);
        }
    }
    for &key in routed_properties(&device, leaf) {
        let Some(value) = group.properties.get(key) else {
            debug!("{}: group property {key:?} missing", raw.path());
            continue;
        };
        channel
            .set_attribute(key, AttrValue::from(value))
            .map_err(|e| ConvertError::AttributeRoutingFailed {
                channel: channel.name().to_owned(),
                attribute: key.to_owned(),
                reason: e.to_string(),
            })?;
    }
    Ok(Some(channel))
}
