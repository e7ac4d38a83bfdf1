use std::collections::BTreeMap;
use std::fmt;
use chrono::{Duration, Local, NaiveDateTime};
use ndarray::Array1;
use crate::error::{ConvertError, Result};
use crate::names;
use crate::timeaxis::{self, TimeAxes};

pub const DEFAULT_PARENT: &str = "proc01";
pub const DEFAULT_UNIT: &str = "n.a.";
/// Attribute keys every channel carries.
pub const ATTR_DEVICE: &str = "Device";
pub const ATTR_TIME_INTERVAL: &str = "TimeInterval";
pub const ATTR_LENGTH: &str = "Length";
pub const ATTR_START_TIME: &str = "StartTime";

/// ISO-8601 with millisecond precision, as written to HDF5 attributes.
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// A runtime-typed attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Instant(NaiveDateTime),
    Duration(Duration),
    Text(String),
}

impl AttrValue {
    /// Numeric view used by the transport formulas.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Text(s) => s.trim().parse().ok(),
            AttrValue::Instant(_) | AttrValue::Duration(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Instant(_) => "instant",
            AttrValue::Duration(_) => "duration",
            AttrValue::Text(_) => "string",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Instant(t) => write!(f, "{}", t.format(ISO_FORMAT)),
            AttrValue::Duration(d) => write!(f, "{} ms", d.num_milliseconds()),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<NaiveDateTime> for AttrValue {
    fn from(value: NaiveDateTime) -> Self {
        AttrValue::Instant(value)
    }
}

impl From<Duration> for AttrValue {
    fn from(value: Duration) -> Self {
        AttrValue::Duration(value)
    }
}

/// A measurement channel: one sample array plus the metadata needed to place
/// it in time and in the output file.
///
/// Both time axes are rebuilt whenever the samples, the start instant or the
/// step change, so they always match `samples` in length.
#[derive(Clone, Debug)]
pub struct Channel {
    name: String,
    parent: String,
    device: String,
    unit: String,
    samples: Array1<f64>,
    start: NaiveDateTime,
    step_ms: i64,
    axes: TimeAxes,
    extra: BTreeMap<String, AttrValue>,
    export_eligible: bool,
}

impl Channel {
    /// Creates a channel starting now with a 1 ms step.
    pub fn new(name: &str, device: &str, samples: Array1<f64>) -> Self {
        let start = timeaxis::truncate_to_millis(Local::now().naive_local());
        let length = samples.len();
        Self {
            name: names::normalize_channel(name),
            parent: DEFAULT_PARENT.to_owned(),
            device: device.to_owned(),
            unit: DEFAULT_UNIT.to_owned(),
            samples,
            start,
            step_ms: 1,
            // a 1 ms step from now stays in range for any in-memory length
            axes: timeaxis::build(start, 1, length).unwrap_or_default(),
            extra: BTreeMap::new(),
            export_eligible: true,
        }
    }

    pub fn from_vec(name: &str, device: &str, samples: Vec<f64>) -> Self {
        Self::new(name, device, Array1::from(samples))
    }

    /// Composite registry key `"{parent}/{name}"`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.parent, self.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last segment of the hierarchical name.
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = names::normalize_channel(name);
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn set_parent(&mut self, parent: &str) {
        self.parent = parent.to_owned();
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn set_unit(&mut self, unit: &str) {
        self.unit = unit.to_owned();
    }

    pub fn start_instant(&self) -> NaiveDateTime {
        self.start
    }

    /// Moves the channel in time. On error the channel is left unchanged.
    pub fn set_start_instant(&mut self, start: NaiveDateTime) -> Result<()> {
        let start = timeaxis::truncate_to_millis(start);
        self.axes = timeaxis::build(start, self.step_ms, self.len())?;
        self.start = start;
        Ok(())
    }

    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    pub fn step_duration(&self) -> Duration {
        Duration::milliseconds(self.step_ms)
    }

    pub fn set_step_ms(&mut self, step_ms: i64) -> Result<()> {
        self.axes = timeaxis::build(self.start, step_ms, self.len())?;
        self.step_ms = step_ms;
        Ok(())
    }

    /// Sets the step from a duration; sub-millisecond parts are dropped.
    pub fn set_step_duration(&mut self, step: Duration) -> Result<()> {
        self.set_step_ms(step.num_milliseconds())
    }

    pub fn samples(&self) -> &Array1<f64> {
        &self.samples
    }

    pub fn set_samples(&mut self, samples: Array1<f64>) -> Result<()> {
        self.axes = timeaxis::build(self.start, self.step_ms, samples.len())?;
        self.samples = samples;
        Ok(())
    }

    /// In-place edit of the sample values; the length cannot change.
    pub fn map_samples_inplace(&mut self, f: impl FnMut(&mut f64)) {
        self.samples.map_inplace(f);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn absolute_time(&self) -> &[NaiveDateTime] {
        &self.axes.absolute
    }

    pub fn elapsed_minutes(&self) -> &Array1<f64> {
        &self.axes.elapsed_minutes
    }

    pub fn export_eligible(&self) -> bool {
        self.export_eligible
    }

    pub fn set_export_eligible(&mut self, eligible: bool) {
        self.export_eligible = eligible;
    }

    pub fn toggle_export(&mut self) {
        self.export_eligible = !self.export_eligible;
    }

    /// Looks up an attribute, including the four mandatory ones.
    pub fn attribute(&self, key: &str) -> Option<AttrValue> {
        match key {
            ATTR_DEVICE => Some(AttrValue::Text(self.device.clone())),
            ATTR_TIME_INTERVAL => Some(AttrValue::Duration(self.step_duration())),
            ATTR_LENGTH => Some(AttrValue::Int(self.len() as i64)),
            ATTR_START_TIME => Some(AttrValue::Instant(self.start)),
            _ => self.extra.get(key).cloned(),
        }
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some()
    }

    /// Numeric attribute lookup; `None` when absent or not a number.
    pub fn numeric_attribute(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(AttrValue::as_f64)
    }

    /// Full attribute bag, mandatory keys included, in key order.
    pub fn attributes(&self) -> BTreeMap<String, AttrValue> {
        let mut all = self.extra.clone();
        for key in [ATTR_DEVICE, ATTR_TIME_INTERVAL, ATTR_LENGTH, ATTR_START_TIME] {
            if let Some(value) = self.attribute(key) {
                all.insert(key.to_owned(), value);
            }
        }
        all
    }

    /// Stores an attribute. The mandatory keys are type-checked and routed
    /// to the fields they describe; `Length` follows the samples and can
    /// only be set to its current value.
    pub fn set_attribute(&mut self, key: &str, value: AttrValue) -> Result<()> {
        match (key, value) {
            (ATTR_DEVICE, AttrValue::Text(device)) => self.device = device,
            (ATTR_DEVICE, other) => return Err(ConvertError::invalid_type(key, "string", other.kind())),
            (ATTR_TIME_INTERVAL, AttrValue::Duration(step)) => self.set_step_duration(step)?,
            (ATTR_TIME_INTERVAL, other) => return Err(ConvertError::invalid_type(key, "duration", other.kind())),
            (ATTR_START_TIME, AttrValue::Instant(start)) => self.set_start_instant(start)?,
            (ATTR_START_TIME, other) => return Err(ConvertError::invalid_type(key, "instant", other.kind())),
            (ATTR_LENGTH, AttrValue::Int(n)) if n == self.len() as i64 => {}
            (ATTR_LENGTH, AttrValue::Int(n)) => {
                return Err(ConvertError::LengthMismatch {
                    what: format!("{} attribute {key}", self.name),
                    expected: self.len(),
                    actual: n.max(0) as usize,
                })
            }
            (ATTR_LENGTH, other) => return Err(ConvertError::invalid_type(key, "int", other.kind())),
            (_, value) => {
                self.extra.insert(key.to_owned(), value);
            }
        }
        Ok(())
    }

    /// Untyped setter for the name, as used by hosts holding dynamic values.
    pub fn set_name_value(&mut self, value: &AttrValue) -> Result<()> {
        match value {
            AttrValue::Text(name) => {
                self.set_name(name);
                Ok(())
            }
            other => Err(ConvertError::invalid_type("name", "string", other.kind())),
        }
    }

    pub fn set_parent_value(&mut self, value: &AttrValue) -> Result<()> {
        match value {
            AttrValue::Text(parent) => {
                self.set_parent(parent);
                Ok(())
            }
            other => Err(ConvertError::invalid_type("parent", "string", other.kind())),
        }
    }

    pub fn set_step_value(&mut self, value: &AttrValue) -> Result<()> {
        self.set_attribute(ATTR_TIME_INTERVAL, value.clone())
    }

    /// Copies start instant and step from `other`.
    pub(crate) fn inherit_timing(&mut self, other: &Channel) -> Result<()> {
        self.axes = if self.len() == other.len() {
            other.axes.clone()
        } else {
            timeaxis::build(other.start, other.step_ms, self.len())?
        };
        self.start = other.start;
        self.step_ms = other.step_ms;
        Ok(())
    }
}
