use ndarray::Zip;
use crate::channel::Channel;
use crate::drivers::text::TEXT_DEVICE;
use crate::error::{ConvertError, Result};
use crate::registry::Registry;
use super::check_lengths;
/// `(input / amp) * factor`, with `/ 10 * sens` for lock-in channels.
struct Scaled {
    output: &'static str,
    input: &'static str,
    amp: &'static str,
    sens: Option<&'static str>,
    factor: f64,
    unit: &'static str,
}
const V: Scaled = Scaled {
    output: "V",
    input: "VSample",
    amp: "VAmp",
    sens: None,
    factor: 1e3,
    unit: "mV",
};
const DV: Scaled = Scaled {
    output: "dV",
    input: "dVSample",
    amp: "VAmp",
    sens: Some("LVSens"),
    factor: 1e3,
    unit: "mV",
};
const I: Scaled = Scaled {
    output: "I",
    input: "ISample",
    amp: "IAmp",
    sens: None,
    factor: 1e6,
    unit: "µA",
};
const DI: Scaled = Scaled {
    output: "dI",
    input: "dISample",
    amp: "IAmp",
    sens: Some("LISens"),
    factor: 1e6,
    unit: "µA",
};
/// Elementwise `numerator / denominator`; zeros give non-finite samples.
struct Ratio {
    output: &'static str,
    numerator: &'static str,
    denominator: &'static str,
}
const R: Ratio = Ratio {
    output: "R",
    numerator: "V",
    denominator: "I",
};
const RSAMPLE: Ratio = Ratio {
    output: "RSample",
    numerator: "VSample",
    denominator: "ISample",
};
const DRSAMPLE: Ratio = Ratio {
    output: "dRSample",
    numerator: "dVSample",
    denominator: "dISample",
};
const DR: Ratio = Ratio {
    output: "dR",
    numerator: "dV",
    denominator: "dI",
};
const RESISTANCE_UNIT: &str = "Ohm";
fn required(channel: &Channel, key: &str) -> Result<f64> {
    channel.numeric_attribute(key).ok_or_else(|| {
        ConvertError::MissingPrecondition(format!("{} has no {key} attribute", channel.key()))
    })
}
impl Registry {
    fn scaled(&self, derivation: &Scaled) -> Result<Option<Channel>> {
        let (device, inputs) = self.resolve_inputs(&[derivation.input])?;
        if self.output_exists(&device, derivation.output) {
            return Ok(None);
        }
        let input = inputs[0];
        let amp = required(input, derivation.amp)?;
        let gain = match derivation.sens {
            Some(sens) => required(input, sens)? / 10.0,
            None => 1.0,
        };
        let factor = derivation.factor;
        let samples = input.samples().mapv(|x| x / amp * gain * factor);
        self.derived_channel(&device, derivation.output, input, samples, derivation.unit)
            .map(Some)
    }
    fn ratio(&self, derivation: &Ratio) -> Result<Option<Channel>> {
        let (device, inputs) = self.resolve_inputs(&[derivation.numerator, derivation.denominator])?;
        if self.output_exists(&device, derivation.output) {
            return Ok(None);
        }
        let (numerator, denominator) = (inputs[0], inputs[1]);
        check_lengths(derivation.output, numerator, denominator)?;
        let samples = numerator.samples() / denominator.samples();
        self.derived_channel(&device, derivation.output, numerator, samples, RESISTANCE_UNIT)
            .map(Some)
    }
    /// `sqrt(x^2 + y^2)` of the two lock-in components of a text export.
    fn quadrature(&self, output: &str) -> Result<Option<Channel>> {
        if self.output_exists(TEXT_DEVICE, output) {
            return Ok(None);
        }
        let (x_leaf, y_leaf) = (format!("{output}x"), format!("{output}y"));
        let (Some(x), Some(y)) = (self.input(TEXT_DEVICE, &x_leaf), self.input(TEXT_DEVICE, &y_leaf)) else {
            return Err(ConvertError::MissingPrecondition(format!(
                "{TEXT_DEVICE}/{x_leaf} and {TEXT_DEVICE}/{y_leaf} are both needed"
            )));
        };
        check_lengths(output, x, y)?;
        let samples = Zip::from(x.samples())
            .and(y.samples())
            .map_collect(|a, b| (a * a + b * b).sqrt());
        let unit = x.unit().to_owned();
        self.derived_channel(TEXT_DEVICE, output, x, samples, &unit).map(Some)
    }
    /// `V = VSample / VAmp * 1e3` in mV.
    pub fn derive_v(&mut self) -> Result<Option<String>> {
        let outcome = self.scaled(&V);
        self.commit("V", outcome)
    }
    /// `dV = dVSample / VAmp / 10 * LVSens * 1e3` in mV.
    pub fn derive_dv(&mut self) -> Result<Option<String>> {
        let outcome = self.scaled(&DV);
        self.commit("dV", outcome)
    }
    /// `I = ISample / IAmp * 1e6` in µA.
    pub fn derive_i(&mut self) -> Result<Option<String>> {
        let outcome = self.scaled(&I);
        self.commit("I", outcome)
    }
    /// `dI = dISample / IAmp / 10 * LISens * 1e6` in µA.
    pub fn derive_di(&mut self) -> Result<Option<String>> {
        let outcome = self.scaled(&DI);
        self.commit("dI", outcome)
    }
    pub fn derive_r(&mut self) -> Result<Option<String>> {
        let outcome = self.ratio(&R);
        self.commit("R", outcome)
    }
    pub fn derive_rsample(&mut self) -> Result<Option<String>> {
        let outcome = self.ratio(&RSAMPLE);
        self.commit("RSample", outcome)
    }
    pub fn derive_drsample(&mut self) -> Result<Option<String>> {
        let outcome = self.ratio(&DRSAMPLE);
        self.commit("dRSample", outcome)
    }
    pub fn derive_dr(&mut self) -> Result<Option<String>> {
        let outcome = self.ratio(&DR);
        self.commit("dR", outcome)
    }
    pub fn derive_combined_disample(&mut self) -> Result<Option<String>> {
        let outcome = self.quadrature("dISample");
        self.commit("dISample", outcome)
    }
    pub fn derive_combined_dvsample(&mut self) -> Result<Option<String>> {
        let outcome = self.quadrature("dVSample");
        self.commit("dVSample", outcome)
    }
    /// Post-ingest hook of the text formats: combined lock-in magnitudes,
    /// then their ratio.
    pub fn add_combined_samples(&mut self) -> Result<Vec<String>> {
        let added = [
            self.derive_combined_disample()?,
            self.derive_combined_dvsample()?,
            self.derive_drsample()?,
        ];
        Ok(added.into_iter().flatten().collect())
    }
    /// Runs the whole transport catalog in dependency order.
    pub fn transport_channels(&mut self) -> Result<Vec<String>> {
        let added = [
            self.derive_v()?,
            self.derive_dv()?,
            self.derive_i()?,
            self.derive_di()?,
            self.derive_rsample()?,
            self.derive_drsample()?,
            self.derive_r()?,
            self.derive_dr()?,
        ];
        Ok(added.into_iter().flatten().collect())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::AttrValue;
    use crate::config::ConverterConfig;
    use approx::assert_relative_eq;
    fn adwin(name: &str, samples: Vec<f64>, attrs: &[(&str, f64)]) -> Channel {
        let mut channel = Channel::from_vec(&format!("ADWin/{name}"), "ADWin", samples);
        channel.set_step_ms(100).unwrap();
        for (key, value) in attrs {
            channel.set_attribute(key, AttrValue::Float(*value)).unwrap();
        }
        channel
    }
    fn all(name: &str, samples: Vec<f64>) -> Channel {
        Channel::from_vec(&format!("all/{name}"), "all", samples)
    }
    #[test]
    fn current_is_scaled_to_micro_amps() {
        let mut registry = Registry::new();
        registry.add(adwin("ISample", vec![1.0, 2.0, 3.0], &[("IAmp", 2.0)]));
        let key = registry.derive_i().unwrap();
        assert_eq!(key.as_deref(), Some("proc01/ADWin/I"));
        let current = registry.get("proc01/ADWin/I").unwrap();
        assert_eq!(current.samples().to_vec(), vec![500000.0, 1000000.0, 1500000.0]);
        assert_eq!(current.unit(), "µA");
        assert_eq!(current.device(), "ADWin");
        assert_eq!(current.step_ms(), 100);
        let source = registry.get("proc01/ADWin/ISample").unwrap();
        assert_eq!(current.start_instant(), source.start_instant());
    }
    #[test]
    fn lock_in_voltage_uses_sensitivity() {
        let mut registry = Registry::new();
        registry.add(adwin("dVSample", vec![2.0, 4.0], &[("VAmp", 100.0), ("LVSens", 0.5)]));
        registry.derive_dv().unwrap();
        let dv = registry.get("proc01/ADWin/dV").unwrap();
        assert_relative_eq!(dv.samples()[0], 2.0 / 100.0 / 10.0 * 0.5 * 1e3, epsilon = 1e-12);
        assert_relative_eq!(dv.samples()[1], 2.0, epsilon = 1e-12);
        assert_eq!(dv.unit(), "mV");
    }
    #[test]
    fn missing_sensitivity_is_a_silent_no_op() {
        let mut registry = Registry::new();
        registry.add(adwin("dVSample", vec![2.0, 4.0], &[("VAmp", 100.0)]));
        let before = registry.keys();
        assert_eq!(registry.derive_dv().unwrap(), None);
        assert_eq!(registry.keys(), before);
        assert_eq!(registry.derive_r().unwrap(), None);
        assert_eq!(registry.keys(), before);
    }
    #[test]
    fn resistance_prefers_the_raw_pair() {
        let mut config = ConverterConfig::default();
        config.derived_parent = "proc".to_owned();
        let mut registry = Registry::with_config(config);
        registry.add(adwin("V", vec![10.0, 20.0], &[]));
        registry.add(adwin("I", vec![2.0, 4.0], &[]));
        let mut processed_v = adwin("V", vec![1.0, 1.0], &[]);
        processed_v.set_parent("proc");
        let mut processed_i = adwin("I", vec![1.0, 1.0], &[]);
        processed_i.set_parent("proc");
        registry.add(processed_v);
        registry.add(processed_i);
        assert_eq!(registry.derive_r().unwrap().as_deref(), Some("proc/ADWin/R"));
        let r = registry.get("proc/ADWin/R").unwrap();
        assert_eq!(r.samples().to_vec(), vec![5.0, 5.0]);
        assert_eq!(r.unit(), "Ohm");
    }
    #[test]
    fn processed_inputs_are_the_fallback() {
        let mut config = ConverterConfig::default();
        config.derived_parent = "proc".to_owned();
        let mut registry = Registry::with_config(config);
        let mut v = adwin("dV", vec![3.0], &[]);
        v.set_parent("proc");
        let mut i = adwin("dI", vec![1.5], &[]);
        i.set_parent("proc");
        registry.add(v);
        registry.add(i);
        registry.derive_dr().unwrap();
        assert_eq!(registry.get("proc/ADWin/dR").unwrap().samples().to_vec(), vec![2.0]);
    }
    #[test]
    fn raw_and_processed_inputs_are_not_mixed() {
        let mut config = ConverterConfig::default();
        config.derived_parent = "proc".to_owned();
        let mut registry = Registry::with_config(config);
        registry.add(adwin("V", vec![10.0], &[]));
        let mut processed_v = adwin("V", vec![1000.0], &[]);
        processed_v.set_parent("proc");
        let mut processed_i = adwin("I", vec![2.0], &[]);
        processed_i.set_parent("proc");
        registry.add(processed_v);
        registry.add(processed_i);
        registry.derive_r().unwrap();
        assert_eq!(registry.get("proc/ADWin/R").unwrap().samples().to_vec(), vec![500.0]);
    }
    #[test]
    fn derivations_are_idempotent() {
        let mut registry = Registry::new();
        registry.add(adwin("VSample", vec![1.0, 2.0], &[("VAmp", 10.0)]));
        registry.add(adwin("ISample", vec![1.0, 4.0], &[("IAmp", 1.0)]));
        let first = registry.transport_channels().unwrap();
        assert_eq!(
            first,
            vec!["proc01/ADWin/V", "proc01/ADWin/I", "proc01/ADWin/RSample", "proc01/ADWin/R"]
        );
        let keys = registry.keys();
        let v = registry.get("proc01/ADWin/V").unwrap().samples().clone();
        assert!(registry.transport_channels().unwrap().is_empty());
        assert_eq!(registry.keys(), keys);
        assert_eq!(registry.get("proc01/ADWin/V").unwrap().samples(), &v);
        assert_eq!(registry.get("proc01/ADWin/RSample").unwrap().samples().to_vec(), vec![1.0, 0.5]);
    }
    #[test]
    fn division_by_zero_keeps_alignment() {
        let mut registry = Registry::new();
        registry.add(adwin("VSample", vec![1.0, 0.0, 2.0], &[]));
        registry.add(adwin("ISample", vec![1.0, 0.0, 0.0], &[]));
        registry.derive_rsample().unwrap();
        let r = registry.get("proc01/ADWin/RSample").unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.samples()[0], 1.0);
        assert!(r.samples()[1].is_nan());
        assert!(r.samples()[2].is_infinite());
    }
    #[test]
    fn unequal_ratio_inputs_are_rejected() {
        let mut registry = Registry::new();
        registry.add(adwin("VSample", vec![1.0, 2.0], &[]));
        registry.add(adwin("ISample", vec![1.0], &[]));
        assert!(matches!(
            registry.derive_rsample(),
            Err(ConvertError::LengthMismatch { expected: 2, actual: 1, .. })
        ));
    }
    #[test]
    fn lock_in_components_combine_in_quadrature() {
        let mut registry = Registry::new();
        registry.add(all("dISamplex", vec![3.0, 0.0]));
        registry.add(all("dISampley", vec![4.0, 0.0]));
        registry.add(all("dVSamplex", vec![6.0, 1.0]));
        registry.add(all("dVSampley", vec![8.0, 0.0]));
        let added = registry.add_combined_samples().unwrap();
        assert_eq!(
            added,
            vec!["proc01/all/dISample", "proc01/all/dVSample", "proc01/all/dRSample"]
        );
        assert_eq!(registry.get("proc01/all/dISample").unwrap().samples().to_vec(), vec![5.0, 0.0]);
        let drsample = registry.get("proc01/all/dRSample").unwrap();
        assert_eq!(drsample.samples()[0], 2.0);
        assert!(drsample.samples()[1].is_infinite());
        assert!(registry.add_combined_samples().unwrap().is_empty());
    }
}
