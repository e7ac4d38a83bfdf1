//! Derivation engine: channels computed from other channels.
//!
//! Every derivation is an `impl Registry` method returning the key of the
//! channel it added, or `None` when it had nothing to do (output already
//! present, inputs or instrument attributes missing). Inputs are looked up
//! under the raw parent first and the derived parent second.
mod interpolate;
mod stats;
mod temperature;
mod transport;
use log::debug;
use ndarray::Array1;
use crate::channel::Channel;
use crate::error::{ConvertError, Result};
use crate::registry::Registry;
pub use interpolate::interpolate_flat;
pub use stats::{mean, mode};
pub use temperature::{ADWIN_TEMPERATURES, LAKESHORE_TEMPERATURES};
impl Registry {
    /// Key of `"{device}/{leaf}"`, raw parent first.
    pub(crate) fn input_key(&self, device: &str, leaf: &str) -> Option<String> {
        let config = self.config();
        [&config.raw_parent, &config.derived_parent]
            .into_iter()
            .map(|parent| format!("{parent}/{device}/{leaf}"))
            .find(|key| self.contains(key))
    }
    pub(crate) fn input(&self, device: &str, leaf: &str) -> Option<&Channel> {
        self.input_key(device, leaf).and_then(|key| self.get(&key).ok())
    }
    /// First of `leaves` present for `device`.
    pub(crate) fn first_input_key(&self, device: &str, leaves: &[&str]) -> Option<String> {
        leaves.iter().find_map(|leaf| self.input_key(device, leaf))
    }
    pub(crate) fn output_exists(&self, device: &str, leaf: &str) -> bool {
        self.input_key(device, leaf).is_some()
    }
    /// First transport device holding every one of `leaves` under a single
    /// parent, raw before derived. Raw and derived inputs are never mixed.
    pub(crate) fn resolve_inputs(&self, leaves: &[&str]) -> Result<(String, Vec<&Channel>)> {
        let config = self.config();
        for device in &config.transport_devices {
            for parent in [&config.raw_parent, &config.derived_parent] {
                let inputs: Option<Vec<&Channel>> = leaves
                    .iter()
                    .map(|leaf| self.get(&format!("{parent}/{device}/{leaf}")).ok())
                    .collect();
                if let Some(inputs) = inputs {
                    return Ok((device.clone(), inputs));
                }
            }
        }
        Err(ConvertError::MissingPrecondition(format!("no device holds {leaves:?}")))
    }
    /// A new channel under the derived parent with the timing of `primary`.
    pub(crate) fn derived_channel(
        &self,
        device: &str,
        leaf: &str,
        primary: &Channel,
        samples: Array1<f64>,
        unit: &str,
    ) -> Result<Channel> {
        let mut channel = Channel::new(&format!("{device}/{leaf}"), device, samples);
        channel.set_parent(&self.config().derived_parent);
        channel.set_unit(unit);
        channel.inherit_timing(primary)?;
        Ok(channel)
    }
    /// Stores the outcome of a derivation, turning missing inputs into a no-op.
    pub(crate) fn commit(&mut self, what: &str, outcome: Result<Option<Channel>>) -> Result<Option<String>> {
        match outcome {
            Ok(Some(channel)) => {
                let key = channel.key();
                debug!("{what}: added {key}");
                self.add(channel);
                Ok(Some(key))
            }
            Ok(None) => {
                debug!("{what}: output already present");
                Ok(None)
            }
            Err(ConvertError::MissingPrecondition(reason)) => {
                debug!("{what}: skipped, {reason}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
pub(crate) fn check_lengths(what: &str, a: &Channel, b: &Channel) -> Result<()> {
    if a.len() != b.len() {
        return Err(ConvertError::LengthMismatch {
            what: what.to_owned(),
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}
