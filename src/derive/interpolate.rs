use log::debug;
use ndarray::Array1;
use crate::channel::Channel;
use crate::drivers::waveform::ADWIN;
use crate::error::{ConvertError, Result};
use crate::registry::{Registry, TIME_TRACK};
use crate::timeaxis;
use super::check_lengths;
const IPS: &str = "IPS";
const FIELD: &str = "Magnetfield";
const B: &str = "B";
/// Tesla to milliTesla.
const FIELD_SCALE: f64 = 1000.0;
/// Linear interpolation of `(x, y)` at `at`, holding the end values flat
/// outside `x`. `x` must be non-decreasing.
pub fn interpolate_flat(x: &Array1<f64>, y: &Array1<f64>, at: &Array1<f64>) -> Result<Array1<f64>> {
    if x.len() != y.len() {
        return Err(ConvertError::LengthMismatch {
            what: "interpolation table".to_owned(),
            expected: x.len(),
            actual: y.len(),
        });
    }
    if x.is_empty() || at.is_empty() {
        return Err(ConvertError::InsufficientData(format!(
            "interpolating {} points onto {} points",
            x.len(),
            at.len()
        )));
    }
    let xs = x.to_vec();
    let last = xs.len() - 1;
    Ok(at.mapv(|t| {
        if t.is_nan() {
            f64::NAN
        } else if t <= xs[0] {
            y[0]
        } else if t >= xs[last] {
            y[last]
        } else {
            // xs[i - 1] <= t < xs[i]
            let i = xs.partition_point(|&v| v <= t);
            let (x0, x1) = (xs[i - 1], xs[i]);
            let w = (t - x0) / (x1 - x0);
            y[i - 1] + w * (y[i] - y[i - 1])
        }
    }))
}
impl Registry {
    fn interpolated_b(&self) -> Result<Option<Channel>> {
        if self.output_exists(ADWIN, B) {
            return Ok(None);
        }
        let missing = |leaf: String| ConvertError::MissingPrecondition(format!("{leaf} is needed"));
        let field = self
            .input(IPS, FIELD)
            .ok_or_else(|| missing(format!("{IPS}/{FIELD}")))?;
        let ips_time = self
            .input(IPS, TIME_TRACK)
            .ok_or_else(|| missing(format!("{IPS}/{TIME_TRACK}")))?;
        let adwin_time = self
            .input(ADWIN, TIME_TRACK)
            .ok_or_else(|| missing(format!("{ADWIN}/{TIME_TRACK}")))?;
        if field.is_empty() || ips_time.is_empty() || adwin_time.is_empty() {
            return Err(ConvertError::InsufficientData(format!(
                "{B} needs non-empty {FIELD}, {IPS} time and {ADWIN} time"
            )));
        }
        check_lengths(FIELD, ips_time, field)?;
        // both tracks count from their own device start
        let shift = timeaxis::minutes_between(adwin_time.start_instant(), ips_time.start_instant());
        debug!("{IPS} time track is {shift} min after {ADWIN}");
        let ips_minutes = ips_time.samples().mapv(|m| m + shift);
        let b = interpolate_flat(&ips_minutes, field.samples(), adwin_time.samples())? * FIELD_SCALE;
        self.derived_channel(ADWIN, B, adwin_time, b, "mT").map(Some)
    }
    /// Resamples the IPS magnet field onto the ADWin time track, in mT.
    pub fn add_interpolated_b(&mut self) -> Result<Option<String>> {
        let outcome = self.interpolated_b();
        self.commit(B, outcome)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use ndarray::array;
    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 9, 23)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }
    #[test]
    fn interpolates_inside_and_holds_ends() {
        let x = array![0.0, 1.0, 2.0];
        let y = array![0.0, 10.0, 30.0];
        let at = array![-1.0, 0.0, 0.5, 1.5, 2.0, 9.0];
        let out = interpolate_flat(&x, &y, &at).unwrap();
        assert_eq!(out.to_vec(), vec![0.0, 0.0, 5.0, 20.0, 30.0, 30.0]);
    }
    #[test]
    fn repeated_abscissae_do_not_divide_by_zero() {
        let out = interpolate_flat(&array![0.0, 1.0, 1.0, 2.0], &array![0.0, 1.0, 3.0, 5.0], &array![1.0, 1.5]).unwrap();
        assert_eq!(out[0], 3.0);
        assert_eq!(out[1], 4.0);
    }
    #[test]
    fn empty_inputs_are_insufficient() {
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            interpolate_flat(&empty, &empty, &array![1.0]),
            Err(ConvertError::InsufficientData(_))
        ));
        assert!(matches!(
            interpolate_flat(&array![1.0], &array![1.0], &empty),
            Err(ConvertError::InsufficientData(_))
        ));
        assert!(matches!(
            interpolate_flat(&array![1.0, 2.0], &array![1.0], &array![1.0]),
            Err(ConvertError::LengthMismatch { .. })
        ));
    }
    fn device_channel(name: &str, device: &str, samples: Vec<f64>, start: NaiveDateTime, step_ms: i64) -> Channel {
        let mut channel = Channel::from_vec(name, device, samples);
        channel.set_start_instant(start).unwrap();
        channel.set_step_ms(step_ms).unwrap();
        channel
    }
    #[test]
    fn field_is_resampled_onto_adwin_time() {
        let mut registry = Registry::new();
        // 4 ADWin samples at 30 s, IPS starts one minute later at 1 min steps
        registry.add(device_channel("ADWin/ISample", ADWIN, vec![0.0; 4], t0(), 30_000));
        registry.add(device_channel(
            "IPS/Magnetfield",
            IPS,
            vec![1.0, 2.0],
            t0() + Duration::minutes(1),
            60_000,
        ));
        assert_eq!(registry.add_interpolated_b().unwrap().as_deref(), Some("proc01/ADWin/B"));
        let b = registry.get("proc01/ADWin/B").unwrap();
        // ADWin minutes 0, 0.5, 1, 1.5 against IPS minutes 1, 2
        assert_relative_eq!(b.samples()[0], 1000.0);
        assert_relative_eq!(b.samples()[1], 1000.0);
        assert_relative_eq!(b.samples()[2], 1000.0);
        assert_relative_eq!(b.samples()[3], 1500.0);
        assert_eq!(b.unit(), "mT");
        assert_eq!(b.step_ms(), 30_000);
        assert_eq!(b.start_instant(), t0());
        assert_eq!(registry.add_interpolated_b().unwrap(), None);
    }
    #[test]
    fn missing_ips_is_a_no_op() {
        let mut registry = Registry::new();
        registry.add(device_channel("ADWin/ISample", ADWIN, vec![0.0; 4], t0(), 100));
        let keys = registry.keys();
        assert_eq!(registry.add_interpolated_b().unwrap(), None);
        assert_eq!(registry.keys(), keys);
    }
    #[test]
    fn empty_field_is_insufficient_data() {
        let mut registry = Registry::new();
        registry.add(device_channel("ADWin/ISample", ADWIN, vec![0.0; 4], t0(), 100));
        registry.add(device_channel("IPS/Magnetfield", IPS, vec![], t0(), 100));
        assert!(matches!(
            registry.add_interpolated_b(),
            Err(ConvertError::InsufficientData(_))
        ));
    }
}
