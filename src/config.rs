use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::Result;
/// How the `wf_increment` property of a binary channel is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepUnit {
    /// Values below 1 are seconds, everything else is already milliseconds.
    /// Some producers write one, some the other.
    #[default]
    Auto,
    Seconds,
    Milliseconds,
}
impl StepUnit {
    /// Converts a raw increment into whole milliseconds.
    pub fn to_millis(self, raw: f64) -> i64 {
        let ms = match self {
            StepUnit::Auto if raw < 1.0 => raw * 1000.0,
            StepUnit::Auto => raw,
            StepUnit::Seconds => raw * 1000.0,
            StepUnit::Milliseconds => raw,
        };
        ms.round() as i64
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Parent group given to every ingested channel.
    pub raw_parent: String,
    /// Parent group of derived channels.
    pub derived_parent: String,
    pub step_unit: StepUnit,
    /// The ADWin box samples at a fixed 10 Hz and the stored increment is
    /// unreliable. `None` trusts the file.
    pub adwin_step_ms: Option<i64>,
    /// Text formats carry no sample step.
    pub text_step_ms: i64,
    pub remove_temperature_offset: bool,
    /// Devices searched, in order, for the inputs of transport derivations.
    pub transport_devices: Vec<String>,
}
impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            raw_parent: "proc01".to_owned(),
            derived_parent: "proc01".to_owned(),
            step_unit: StepUnit::Auto,
            adwin_step_ms: Some(100),
            text_step_ms: 1,
            remove_temperature_offset: true,
            transport_devices: vec!["ADWin".to_owned(), "all".to_owned()],
        }
    }
}
impl ConverterConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn auto_step_unit_rescales_sub_second_values() {
        assert_eq!(StepUnit::Auto.to_millis(0.1), 100);
        assert_eq!(StepUnit::Auto.to_millis(0.05), 50);
        assert_eq!(StepUnit::Auto.to_millis(250.0), 250);
        assert_eq!(StepUnit::Auto.to_millis(1.0), 1);
    }
    #[test]
    fn explicit_step_units_override_the_heuristic() {
        assert_eq!(StepUnit::Seconds.to_millis(2.0), 2000);
        assert_eq!(StepUnit::Milliseconds.to_millis(0.4), 0);
    }
    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ConverterConfig::from_json_str(
            r#"{ "derived_parent": "proc", "adwin_step_ms": null, "step_unit": "seconds" }"#,
        )
        .unwrap();
        assert_eq!(cfg.derived_parent, "proc");
        assert_eq!(cfg.raw_parent, "proc01");
        assert_eq!(cfg.adwin_step_ms, None);
        assert_eq!(cfg.step_unit, StepUnit::Seconds);
        assert!(cfg.remove_temperature_offset);
    }
    #[test]
    fn malformed_json_is_a_config_error() {
        let err = ConverterConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, crate::ConvertError::Config(_)));
    }
}
