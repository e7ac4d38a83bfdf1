use log::{debug, info};
use ndarray::Array1;
use crate::channel::Channel;
use crate::drivers::waveform::ADWIN;
use crate::error::{ConvertError, Result};
use crate::registry::Registry;
use super::stats;
const LAKESHORE: &str = "Lakeshore";
/// ADWin sample temperature leaves, current name first.
pub const ADWIN_TEMPERATURES: &[&str] = &["TSample_AD", "TSample"];
pub const LAKESHORE_TEMPERATURES: &[&str] = &["TSample_LK", "Temperature"];
const MODE_OUTPUT: &str = "Tm";
impl Registry {
    /// Shifts the ADWin sample temperature onto the Lakeshore reading by
    /// subtracting the difference of their means. Returns the offset applied,
    /// or `None` if either channel is absent or empty.
    pub fn remove_adwin_temperature_offset(&mut self) -> Result<Option<f64>> {
        let (Some(adwin_key), Some(lakeshore_key)) = (
            self.first_input_key(ADWIN, ADWIN_TEMPERATURES),
            self.first_input_key(LAKESHORE, LAKESHORE_TEMPERATURES),
        ) else {
            debug!("temperature offset: ADWin or Lakeshore temperature missing");
            return Ok(None);
        };
        let adwin_mean = stats::mean(self.get(&adwin_key)?.samples());
        let lakeshore_mean = stats::mean(self.get(&lakeshore_key)?.samples());
        let (Some(adwin_mean), Some(lakeshore_mean)) = (adwin_mean, lakeshore_mean) else {
            debug!("temperature offset: empty temperature channel");
            return Ok(None);
        };
        let offset = adwin_mean - lakeshore_mean;
        self.map_samples(&adwin_key, |t| *t -= offset)?;
        info!("removed temperature offset of {offset:.4} from {adwin_key} (reference {lakeshore_key})");
        Ok(Some(offset))
    }
    fn temperature_mode(&self) -> Result<Option<Channel>> {
        if self.output_exists(ADWIN, MODE_OUTPUT) {
            return Ok(None);
        }
        let input = self
            .first_input_key(ADWIN, ADWIN_TEMPERATURES)
            .and_then(|key| self.get(&key).ok())
            .ok_or_else(|| ConvertError::MissingPrecondition("no ADWin temperature".to_owned()))?;
        let mode = stats::mode(input.samples()).ok_or_else(|| {
            ConvertError::InsufficientData(format!("{} has no finite samples", input.key()))
        })?;
        let samples: Array1<f64> = input.samples().mapv(|t| t - mode);
        let unit = input.unit().to_owned();
        self.derived_channel(ADWIN, MODE_OUTPUT, input, samples, &unit).map(Some)
    }
    /// `Tm`: the ADWin temperature minus its most frequent value.
    pub fn add_temperature_mode(&mut self) -> Result<Option<String>> {
        let outcome = self.temperature_mode();
        self.commit(MODE_OUTPUT, outcome)
    }
}
