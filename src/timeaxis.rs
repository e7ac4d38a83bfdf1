use chrono::{Duration, NaiveDateTime};
use ndarray::Array1;
use crate::error::{ConvertError, Result};
pub const MILLIS_PER_MINUTE: f64 = 60_000.0;
/// Absolute and elapsed time tracks of one channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeAxes {
    pub absolute: Vec<NaiveDateTime>,
    pub elapsed_minutes: Array1<f64>,
}
impl TimeAxes {
    pub fn len(&self) -> usize {
        self.absolute.len()
    }
    pub fn is_empty(&self) -> bool {
        self.absolute.is_empty()
    }
}
/// Instant of sample `index`, `None` when it leaves the representable range.
fn instant_at(start: NaiveDateTime, step_ms: i64, index: usize) -> Option<NaiveDateTime> {
    i64::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(step_ms))
        .and_then(Duration::try_milliseconds)
        .and_then(|offset| start.checked_add_signed(offset))
}
/// Builds both axes from `start + i * step` for `i in 0..length`.
pub fn build(start: NaiveDateTime, step_ms: i64, length: usize) -> Result<TimeAxes> {
    if step_ms <= 0 {
        return Err(ConvertError::InvalidStep(step_ms));
    }
    let absolute = (0..length)
        .map(|i| instant_at(start, step_ms, i).ok_or(ConvertError::InvalidStep(step_ms)))
        .collect::<Result<Vec<_>>>()?;
    let elapsed_minutes = Array1::from_shape_fn(length, |i| elapsed_minutes_at(i, step_ms));
    Ok(TimeAxes {
        absolute,
        elapsed_minutes,
    })
}
pub fn elapsed_minutes_at(index: usize, step_ms: i64) -> f64 {
    index as f64 * step_ms as f64 / MILLIS_PER_MINUTE
}
/// Signed distance between two instants in minutes.
pub fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_MINUTE
}
/// Truncates an instant to whole milliseconds.
pub fn truncate_to_millis(instant: NaiveDateTime) -> NaiveDateTime {
    let millis = instant.and_utc().timestamp_millis();
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .unwrap_or(instant)
}
