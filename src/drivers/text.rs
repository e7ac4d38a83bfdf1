//! Column-oriented text ingest for `.csv` and `.dat` exports.
use std::fs;
use std::path::Path;
use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, warn};
use crate::channel::Channel;
use crate::error::{ConvertError, Result};
use crate::names;
use crate::registry::Registry;
use super::SourceFormat;
pub const TEXT_DEVICE: &str = "all";
const COMMENT: char = '#';
const START_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
/// Header, start instant and data rows of one text file.
#[derive(Clone, Debug, PartialEq)]
pub struct TextTable {
    pub columns: Vec<String>,
    pub start: NaiveDateTime,
    /// Column-major values; unparseable fields are NaN.
    pub values: Vec<Vec<f64>>,
}
fn split_fields(line: &str) -> Vec<String> {
    line.split(',').map(|f| f.trim().to_owned()).collect()
}
fn header_fields(line: &str) -> Vec<String> {
    let mut fields = split_fields(line);
    if let Some(first) = fields.first_mut() {
        *first = first.trim_start_matches(COMMENT).trim().to_owned();
    }
    fields
}
/// Parses the date and time held in the last two tokens of a `.dat` comment.
pub fn parse_dat_start(line: &str, path: &str) -> Result<NaiveDateTime> {
    let first_field = line.split(',').next().unwrap_or_default();
    let tokens: Vec<&str> = first_field.split_whitespace().collect();
    let stamp = match tokens.as_slice() {
        [.., date, time] => format!("{date}T{time}"),
        _ => String::new(),
    };
    START_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&stamp, fmt).ok())
        .ok_or_else(|| ConvertError::Parse {
            path: path.to_owned(),
            line: 1,
            message: format!("no start date/time in {line:?}"),
        })
}
fn file_modified(path: &Path) -> Result<NaiveDateTime> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}
/// Splits `text` into header, start instant and columns.
///
/// `.csv`: the first line is the header and the start instant is `fallback_start`.
/// `.dat`: leading `#` lines are comments, the first carries the start
/// instant and the last one the header.
pub fn parse_table(
    text: &str,
    format: SourceFormat,
    path: &str,
    fallback_start: NaiveDateTime,
) -> Result<TextTable> {
    let mut lines = text.lines().enumerate().peekable();
    let (columns, start) = match format {
        SourceFormat::Dat => {
            let mut comments = Vec::new();
            while let Some((_, line)) = lines.peek() {
                if !line.trim_start().starts_with(COMMENT) {
                    break;
                }
                comments.push(*line);
                lines.next();
            }
            let (Some(first), Some(last)) = (comments.first(), comments.last()) else {
                return Err(ConvertError::Parse {
                    path: path.to_owned(),
                    line: 1,
                    message: "no comment header".to_owned(),
                });
            };
            (header_fields(last), parse_dat_start(first, path)?)
        }
        SourceFormat::Csv => match lines.next() {
            Some((_, header)) => (header_fields(header), fallback_start),
            None => {
                return Err(ConvertError::Parse {
                    path: path.to_owned(),
                    line: 1,
                    message: "empty file".to_owned(),
                })
            }
        },
        SourceFormat::Tdms => {
            return Err(ConvertError::UnsupportedFormat(format!(
                "{path} is not a text format"
            )))
        }
    };
    let mut values = vec![Vec::new(); columns.len()];
    let mut bad_fields = vec![0usize; columns.len()];
    for (_, line) in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        for (column, bad) in values.iter_mut().zip(bad_fields.iter_mut()) {
            let value = fields.next().and_then(|f| f.parse::<f64>().ok());
            if value.is_none() {
                *bad += 1;
            }
            column.push(value.unwrap_or(f64::NAN));
        }
    }
    for (name, bad) in columns.iter().zip(&bad_fields) {
        if *bad > 0 {
            warn!("{path}: column {name:?} has {bad} unparseable fields, stored as NaN");
        }
    }
    Ok(TextTable {
        columns,
        start,
        values,
    })
}
/// Adds one channel per column of `path` under device `all`.
pub fn ingest_file(registry: &mut Registry, path: &Path, format: SourceFormat) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let fallback = file_modified(path)?;
    let table = parse_table(&text, format, &path.display().to_string(), fallback)?;
    ingest_table(registry, table)
}
pub fn ingest_table(registry: &mut Registry, table: TextTable) -> Result<()> {
    let config = registry.config().clone();
    for (column, samples) in table.columns.iter().zip(table.values) {
        let canonical = names::normalize_channel(column);
        if canonical.contains("Milli") {
            debug!("skipping column {column:?}");
            continue;
        }
        let mut channel = Channel::from_vec(&format!("{TEXT_DEVICE}/{canonical}"), TEXT_DEVICE, samples);
        channel.set_parent(&config.raw_parent);
        channel.set_start_instant(table.start)?;
        channel.set_step_ms(config.text_step_ms)?;
        registry.add(channel);
    }
    Ok(())
}
