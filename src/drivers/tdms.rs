//! Decoder for NI TDMS (version 2.0) files.
//!
//! Produces a [`TdmsFile`] object tree: file properties, ordered groups,
//! ordered channels with their samples widened to `f64`. Only what the
//! ingest driver needs is decoded; DAQmx raw data is refused.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use bytes::Buf;
use chrono::{DateTime, NaiveDateTime};
use log::{debug, warn};
use crate::error::{ConvertError, Result};
const SEGMENT_TAG: &[u8; 4] = b"TDSm";
const LEAD_IN_LEN: usize = 28;
const TOC_META_DATA: u32 = 1 << 1;
const TOC_NEW_OBJ_LIST: u32 = 1 << 2;
const TOC_RAW_DATA: u32 = 1 << 3;
const TOC_INTERLEAVED_DATA: u32 = 1 << 5;
const TOC_BIG_ENDIAN: u32 = 1 << 6;
const TOC_DAQMX_RAW_DATA: u32 = 1 << 7;
const NO_RAW_DATA: u32 = 0xFFFF_FFFF;
const RAW_INDEX_AS_PREVIOUS: u32 = 0x0000_0000;
const DAQMX_FORMAT_CHANGING: u32 = 0x0000_1269;
const DAQMX_DIGITAL_LINE_SCALER: u32 = 0x0000_1369;
const INCOMPLETE_SEGMENT: u64 = u64::MAX;
/// Seconds between the LabVIEW epoch (1904-01-01 UTC) and the Unix epoch.
const LABVIEW_EPOCH_OFFSET: i64 = 2_082_844_800;
pub type Properties = BTreeMap<String, PropertyValue>;
/// A decoded property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}
impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::UInt(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::Timestamp(_) => None,
        }
    }
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            PropertyValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TdmsChannel {
    pub group: String,
    pub name: String,
    pub data: Vec<f64>,
    pub properties: Properties,
}
impl TdmsChannel {
    pub fn new(group: &str, name: &str, data: Vec<f64>) -> Self {
        Self {
            group: group.to_owned(),
            name: name.to_owned(),
            data,
            properties: Properties::new(),
        }
    }
    pub fn with_property(mut self, key: &str, value: PropertyValue) -> Self {
        self.properties.insert(key.to_owned(), value);
        self
    }
    /// Object path in the container's quoted notation, e.g. `/'ADWin'/'ISample'`.
    pub fn path(&self) -> String {
        format!("/'{}'/'{}'", escape(&self.group), escape(&self.name))
    }
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TdmsGroup {
    pub name: String,
    pub properties: Properties,
    pub channels: Vec<TdmsChannel>,
}
impl TdmsGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }
    pub fn with_property(mut self, key: &str, value: PropertyValue) -> Self {
        self.properties.insert(key.to_owned(), value);
        self
    }
    pub fn with_channel(mut self, mut channel: TdmsChannel) -> Self {
        channel.group = self.name.clone();
        self.channels.push(channel);
        self
    }
    pub fn channel(&self, name: &str) -> Option<&TdmsChannel> {
        self.channels.iter().find(|c| c.name == name)
    }
    fn channel_mut(&mut self, name: &str) -> &mut TdmsChannel {
        let index = match self.channels.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.channels.push(TdmsChannel::new(&self.name, name, Vec::new()));
                self.channels.len() - 1
            }
        };
        &mut self.channels[index]
    }
}
/// Decoded object tree of one container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TdmsFile {
    pub properties: Properties,
    pub groups: Vec<TdmsGroup>,
}
impl TdmsFile {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_property(mut self, key: &str, value: PropertyValue) -> Self {
        self.properties.insert(key.to_owned(), value);
        self
    }
    pub fn with_group(mut self, group: TdmsGroup) -> Self {
        self.groups.push(group);
        self
    }
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
    pub fn groups(&self) -> &[TdmsGroup] {
        &self.groups
    }
    pub fn group(&self, name: &str) -> Option<&TdmsGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
    /// Channels of group `name`; empty for an unknown group.
    pub fn group_channels(&self, name: &str) -> &[TdmsChannel] {
        self.group(name).map(|g| g.channels.as_slice()).unwrap_or(&[])
    }
    fn group_mut(&mut self, name: &str) -> &mut TdmsGroup {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(TdmsGroup::new(name));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }
    fn properties_mut(&mut self, parts: &[String]) -> Result<&mut Properties> {
        match parts {
            [] => Ok(&mut self.properties),
            [group] => Ok(&mut self.group_mut(group).properties),
            [group, channel] => Ok(&mut self.group_mut(group).channel_mut(channel).properties),
            _ => Err(ConvertError::malformed(format!(
                "object path nests {} levels deep",
                parts.len()
            ))),
        }
    }
    fn samples_mut(&mut self, parts: &[String]) -> Result<&mut Vec<f64>> {
        match parts {
            [group, channel] => Ok(&mut self.group_mut(group).channel_mut(channel).data),
            _ => Err(ConvertError::malformed(
                "raw data attached to a non-channel object",
            )),
        }
    }
}
fn escape(name: &str) -> String {
    name.replace('\'', "''")
}
/// Splits `/'group'/'channel'` into its unquoted components.
pub fn split_path(path: &str) -> Result<Vec<String>> {
    let bad = || ConvertError::malformed(format!("bad object path {path:?}"));
    if path == "/" {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '/' || chars.next() != Some('\'') {
            return Err(bad());
        }
        let mut part = String::new();
        loop {
            match chars.next() {
                Some('\'') if chars.peek() == Some(&'\'') => {
                    chars.next();
                    part.push('\'');
                }
                Some('\'') => break,
                Some(c) => part.push(c),
                None => return Err(bad()),
            }
        }
        parts.push(part);
    }
    Ok(parts)
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DataType {
    Void,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bool,
    Timestamp,
}
impl DataType {
    fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0x00 => DataType::Void,
            0x01 => DataType::I8,
            0x02 => DataType::I16,
            0x03 => DataType::I32,
            0x04 => DataType::I64,
            0x05 => DataType::U8,
            0x06 => DataType::U16,
            0x07 => DataType::U32,
            0x08 => DataType::U64,
            0x09 | 0x19 => DataType::F32,
            0x0A | 0x1A => DataType::F64,
            0x20 => DataType::Str,
            0x21 => DataType::Bool,
            0x44 => DataType::Timestamp,
            other => {
                return Err(ConvertError::malformed(format!(
                    "unsupported data type 0x{other:x}"
                )))
            }
        })
    }
    fn size(self) -> Option<u64> {
        match self {
            DataType::Void => Some(0),
            DataType::I8 | DataType::U8 | DataType::Bool => Some(1),
            DataType::I16 | DataType::U16 => Some(2),
            DataType::I32 | DataType::U32 | DataType::F32 => Some(4),
            DataType::I64 | DataType::U64 | DataType::F64 => Some(8),
            DataType::Timestamp => Some(16),
            DataType::Str => None,
        }
    }
}
#[derive(Clone, Copy, Debug)]
struct RawIndex {
    data_type: DataType,
    values: u64,
    /// Only present for strings.
    total_size: u64,
}
impl RawIndex {
    fn byte_size(&self) -> Result<u64> {
        match self.data_type.size() {
            Some(size) => size.checked_mul(self.values).ok_or_else(|| {
                ConvertError::malformed(format!("{} values of {size} bytes overflow", self.values))
            }),
            None => Ok(self.total_size),
        }
    }
}
#[derive(Clone, Debug)]
struct ActiveObject {
    path: String,
    parts: Vec<String>,
    raw: Option<RawIndex>,
}
/// Bounds-checked reader over one segment's bytes.
struct ByteReader<'a> {
    buf: &'a [u8],
    big_endian: bool,
}
macro_rules! read_num {
    ($name:ident, $ty:ty, $size:expr, $be:ident, $le:ident) => {
        fn $name(&mut self) -> Result<$ty> {
            self.need($size)?;
            Ok(if self.big_endian {
                self.buf.$be()
            } else {
                self.buf.$le()
            })
        }
    };
}
impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8], big_endian: bool) -> Self {
        Self { buf, big_endian }
    }
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(ConvertError::malformed(format!(
                "need {n} bytes, {} left in segment",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
    fn remaining(&self) -> usize {
        self.buf.remaining()
    }
    fn skip(&mut self, n: usize) -> Result<()> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }
    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }
    fn i8(&mut self) -> Result<i8> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }
    read_num!(i16, i16, 2, get_i16, get_i16_le);
    read_num!(i32, i32, 4, get_i32, get_i32_le);
    read_num!(i64, i64, 8, get_i64, get_i64_le);
    read_num!(u16, u16, 2, get_u16, get_u16_le);
    read_num!(u32, u32, 4, get_u32, get_u32_le);
    read_num!(u64, u64, 8, get_u64, get_u64_le);
    read_num!(f32, f32, 4, get_f32, get_f32_le);
    read_num!(f64, f64, 8, get_f64, get_f64_le);
    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let buf = self.buf;
        let (head, tail) = buf.split_at(len);
        self.buf = tail;
        String::from_utf8(head.to_vec())
            .map_err(|e| ConvertError::malformed(format!("string is not UTF-8: {e}")))
    }
    fn timestamp(&mut self) -> Result<NaiveDateTime> {
        let (fractions, seconds) = if self.big_endian {
            let seconds = self.i64()?;
            (self.u64()?, seconds)
        } else {
            let fractions = self.u64()?;
            (fractions, self.i64()?)
        };
        labview_to_naive(seconds, fractions)
    }
    fn property(&mut self) -> Result<PropertyValue> {
        let data_type = DataType::from_code(self.u32()?)?;
        Ok(match data_type {
            DataType::I8 => PropertyValue::Int(self.i8()? as i64),
            DataType::I16 => PropertyValue::Int(self.i16()? as i64),
            DataType::I32 => PropertyValue::Int(self.i32()? as i64),
            DataType::I64 => PropertyValue::Int(self.i64()?),
            DataType::U8 => PropertyValue::UInt(self.u8()? as u64),
            DataType::U16 => PropertyValue::UInt(self.u16()? as u64),
            DataType::U32 => PropertyValue::UInt(self.u32()? as u64),
            DataType::U64 => PropertyValue::UInt(self.u64()?),
            DataType::F32 => PropertyValue::Float(self.f32()? as f64),
            DataType::F64 => PropertyValue::Float(self.f64()?),
            DataType::Str => PropertyValue::Text(self.string()?),
            DataType::Bool => PropertyValue::Bool(self.u8()? != 0),
            DataType::Timestamp => PropertyValue::Timestamp(self.timestamp()?),
            DataType::Void => {
                return Err(ConvertError::malformed("property of type void"));
            }
        })
    }
    /// One raw value widened to `f64`; timestamps become Unix seconds.
    fn sample(&mut self, data_type: DataType) -> Result<f64> {
        Ok(match data_type {
            DataType::I8 => self.i8()? as f64,
            DataType::I16 => self.i16()? as f64,
            DataType::I32 => self.i32()? as f64,
            DataType::I64 => self.i64()? as f64,
            DataType::U8 => self.u8()? as f64,
            DataType::U16 => self.u16()? as f64,
            DataType::U32 => self.u32()? as f64,
            DataType::U64 => self.u64()? as f64,
            DataType::F32 => self.f32()? as f64,
            DataType::F64 => self.f64()?,
            DataType::Bool => f64::from(self.u8()? != 0),
            DataType::Timestamp => {
                let t = self.timestamp()?.and_utc();
                t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9
            }
            DataType::Void | DataType::Str => {
                return Err(ConvertError::malformed("non-numeric raw sample"));
            }
        })
    }
}
fn labview_to_naive(seconds: i64, fractions: u64) -> Result<NaiveDateTime> {
    let nanos = ((u128::from(fractions) * 1_000_000_000) >> 64) as u32;
    DateTime::from_timestamp(seconds - LABVIEW_EPOCH_OFFSET, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| ConvertError::malformed(format!("timestamp {seconds}s out of range")))
}
pub fn read_file(path: impl AsRef<Path>) -> Result<TdmsFile> {
    let bytes = fs::read(path.as_ref())?;
    parse(&bytes)
}
/// Decodes a whole container held in memory.
pub fn parse(data: &[u8]) -> Result<TdmsFile> {
    let mut file = TdmsFile::new();
    let mut objects: Vec<ActiveObject> = Vec::new();
    let mut last_index: HashMap<String, RawIndex> = HashMap::new();
    let mut offset = 0usize;
    let mut segment = 0usize;
    while offset < data.len() {
        if data.len() - offset < LEAD_IN_LEN {
            warn!("ignoring {} trailing bytes", data.len() - offset);
            break;
        }
        let mut lead_in = &data[offset..offset + LEAD_IN_LEN];
        if &lead_in[..4] != SEGMENT_TAG {
            return Err(ConvertError::malformed(format!(
                "segment {segment} at byte {offset} has no TDSm tag"
            )));
        }
        lead_in.advance(4);
        let toc = lead_in.get_u32_le();
        let big_endian = toc & TOC_BIG_ENDIAN != 0;
        let mut lead_in = ByteReader::new(lead_in, big_endian);
        let _version = lead_in.u32()?;
        let next_segment_offset = lead_in.u64()?;
        let raw_data_offset = lead_in.u64()?;
        let body_start = offset + LEAD_IN_LEN;
        let body_end = if next_segment_offset == INCOMPLETE_SEGMENT {
            warn!("segment {segment} was not closed; reading to end of file");
            data.len()
        } else {
            let end = usize::try_from(next_segment_offset)
                .ok()
                .and_then(|n| body_start.checked_add(n))
                .unwrap_or(usize::MAX);
            if end > data.len() {
                warn!("segment {segment} is truncated; reading to end of file");
                data.len()
            } else {
                end
            }
        };
        let meta_end = usize::try_from(raw_data_offset)
            .ok()
            .and_then(|n| body_start.checked_add(n))
            .filter(|&end| end <= body_end)
            .ok_or_else(|| {
                ConvertError::malformed(format!("segment {segment} raw data offset out of range"))
            })?;
        if toc & TOC_DAQMX_RAW_DATA != 0 {
            return Err(ConvertError::UnsupportedFormat(
                "TDMS DAQmx raw data".to_owned(),
            ));
        }
        if toc & TOC_META_DATA != 0 {
            if toc & TOC_NEW_OBJ_LIST != 0 {
                objects.clear();
            }
            let mut reader = ByteReader::new(&data[body_start..meta_end], big_endian);
            read_meta_data(&mut reader, &mut file, &mut objects, &mut last_index)?;
        }
        if toc & TOC_RAW_DATA != 0 {
            let interleaved = toc & TOC_INTERLEAVED_DATA != 0;
            let block = &data[meta_end..body_end];
            read_raw_data(block, &objects, interleaved, big_endian, &mut file)?;
        }
        debug!(
            "segment {segment}: {} bytes, {} active objects",
            body_end - offset,
            objects.len()
        );
        offset = body_end;
        segment += 1;
    }
    Ok(file)
}
fn read_meta_data(
    reader: &mut ByteReader<'_>,
    file: &mut TdmsFile,
    objects: &mut Vec<ActiveObject>,
    last_index: &mut HashMap<String, RawIndex>,
) -> Result<()> {
    let count = reader.u32()?;
    for _ in 0..count {
        let path = reader.string()?;
        let parts = split_path(&path)?;
        let raw = match reader.u32()? {
            NO_RAW_DATA => None,
            RAW_INDEX_AS_PREVIOUS => Some(*last_index.get(&path).ok_or_else(|| {
                ConvertError::malformed(format!("{path} reuses a raw index it never had"))
            })?),
            DAQMX_FORMAT_CHANGING | DAQMX_DIGITAL_LINE_SCALER => {
                return Err(ConvertError::UnsupportedFormat(
                    "TDMS DAQmx raw data".to_owned(),
                ));
            }
            _ => {
                let data_type = DataType::from_code(reader.u32()?)?;
                let dimension = reader.u32()?;
                if dimension != 1 {
                    return Err(ConvertError::malformed(format!(
                        "{path} has array dimension {dimension}"
                    )));
                }
                let values = reader.u64()?;
                let total_size = if data_type == DataType::Str {
                    reader.u64()?
                } else {
                    0
                };
                Some(RawIndex {
                    data_type,
                    values,
                    total_size,
                })
            }
        };
        let property_count = reader.u32()?;
        // creating the properties map also registers the object in order
        let properties = file.properties_mut(&parts)?;
        for _ in 0..property_count {
            let name = reader.string()?;
            let value = reader.property()?;
            properties.insert(name, value);
        }
        if let Some(raw) = raw {
            last_index.insert(path.clone(), raw);
        }
        match objects.iter_mut().find(|o| o.path == path) {
            Some(existing) => existing.raw = raw,
            None => objects.push(ActiveObject { path, parts, raw }),
        }
    }
    Ok(())
}
fn read_raw_data(
    block: &[u8],
    objects: &[ActiveObject],
    interleaved: bool,
    big_endian: bool,
    file: &mut TdmsFile,
) -> Result<()> {
    let active: Vec<(&ActiveObject, RawIndex)> = objects
        .iter()
        .filter_map(|o| o.raw.map(|raw| (o, raw)))
        .filter(|(_, raw)| raw.values > 0)
        .collect();
    let chunk_size = active.iter().try_fold(0u64, |total, (_, raw)| {
        total
            .checked_add(raw.byte_size()?)
            .ok_or_else(|| ConvertError::malformed("raw data chunk size overflows"))
    })?;
    if chunk_size == 0 {
        return Ok(());
    }
    let chunks = block.len() as u64 / chunk_size;
    if block.len() as u64 % chunk_size != 0 {
        warn!(
            "raw data block of {} bytes is not a multiple of the {chunk_size} byte chunk",
            block.len()
        );
    }
    let mut reader = ByteReader::new(block, big_endian);
    for _ in 0..chunks {
        if interleaved {
            let values = active[0].1.values;
            if active.iter().any(|(_, raw)| raw.values != values || raw.data_type.size().is_none()) {
                return Err(ConvertError::malformed(
                    "interleaved data needs fixed-size channels of equal length",
                ));
            }
            for _ in 0..values {
                for (object, raw) in &active {
                    let value = reader.sample(raw.data_type)?;
                    file.samples_mut(&object.parts)?.push(value);
                }
            }
        } else {
            for (object, raw) in &active {
                match raw.data_type {
                    DataType::Str | DataType::Void => {
                        reader.skip(raw.byte_size()? as usize)?;
                    }
                    data_type => {
                        if raw.byte_size()? > reader.remaining() as u64 {
                            return Err(ConvertError::malformed(format!(
                                "{} claims {} values past the end of its raw data",
                                object.path, raw.values
                            )));
                        }
                        let mut values = Vec::with_capacity(raw.values as usize);
                        for _ in 0..raw.values {
                            values.push(reader.sample(data_type)?);
                        }
                        file.samples_mut(&object.parts)?.extend(values);
                    }
                }
            }
        }
    }
    Ok(())
}
