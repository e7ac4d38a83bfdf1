use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use crate::channel::Channel;
use crate::config::ConverterConfig;
use crate::drivers::{self, SourceFormat};
use crate::error::{ConvertError, Result};

/// Name of the synthesized per-device elapsed-minutes track.
pub const TIME_TRACK: &str = "Time_m";

/// Owner of every channel produced from one source file.
///
/// Channels are keyed by `"{parent}/{name}"` and iterate in insertion order.
/// The first channel seen for a `(parent, device)` pair also gets a
/// companion `"{parent}/{device}/Time_m"` track.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    channels: HashMap<String, Channel>,
    order: Vec<String>,
    devices: BTreeSet<String>,
    parents: BTreeSet<String>,
    pub file_start_time: Option<NaiveDateTime>,
    pub file_end_time: Option<NaiveDateTime>,
    config: ConverterConfig,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConverterConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Stores `channel` under its composite key, replacing any previous one.
    pub fn add(&mut self, channel: Channel) {
        let key = channel.key();
        let parent = channel.parent().to_owned();
        let device = channel.device().to_owned();
        self.insert(key.clone(), channel);
        if device.is_empty() || self.has_time_track(&parent, &device) {
            self.parents.insert(parent);
            self.devices.insert(device);
            return;
        }
        self.parents.insert(parent);
        self.devices.insert(device);
        let track = self.channels.get(&key).map(time_track_for);
        match track {
            // the track itself satisfies has_time_track, so this recursion stops
            Some(Ok(track)) => self.add(track),
            Some(Err(e)) => warn!("{key}: no {TIME_TRACK} track: {e}"),
            None => {}
        }
    }

    fn insert(&mut self, key: String, channel: Channel) {
        if self.channels.insert(key.clone(), channel).is_none() {
            self.order.push(key);
        }
    }

    /// True if any `"{parent}/{device}/Time..."` or `".../time..."` channel exists.
    pub fn has_time_track(&self, parent: &str, device: &str) -> bool {
        let upper = format!("{parent}/{device}/Time");
        let lower = format!("{parent}/{device}/time");
        self.order
            .iter()
            .any(|key| key.starts_with(&upper) || key.starts_with(&lower))
    }

    pub fn get(&self, key: &str) -> Result<&Channel> {
        self.channels
            .get(key)
            .ok_or_else(|| ConvertError::NotFound(key.to_owned()))
    }

    /// Callers must not change the parent or name; the key would go stale.
    pub(crate) fn get_mut(&mut self, key: &str) -> Result<&mut Channel> {
        self.channels
            .get_mut(key)
            .ok_or_else(|| ConvertError::NotFound(key.to_owned()))
    }

    /// Flips the export flag of `key`, returning the new value.
    pub fn toggle_export(&mut self, key: &str) -> Result<bool> {
        let channel = self.get_mut(key)?;
        channel.toggle_export();
        Ok(channel.export_eligible())
    }

    pub fn set_export(&mut self, key: &str, eligible: bool) -> Result<()> {
        self.get_mut(key)?.set_export_eligible(eligible);
        Ok(())
    }

    /// Edits the sample values of `key` in place.
    pub fn map_samples(&mut self, key: &str, f: impl FnMut(&mut f64)) -> Result<()> {
        self.get_mut(key)?.map_samples_inplace(f);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.channels.contains_key(key)
    }

    /// Snapshot of the keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Keys in lexicographic order, as used by the exporters.
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys = self.order.clone();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Channel)> {
        self.order
            .iter()
            .filter_map(|key| self.channels.get(key).map(|c| (key.as_str(), c)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn devices(&self) -> &BTreeSet<String> {
        &self.devices
    }

    pub fn parents(&self) -> &BTreeSet<String> {
        &self.parents
    }

    pub fn clear(&mut self) {
        self.channels.clear();
        self.order.clear();
        self.devices.clear();
        self.parents.clear();
        self.file_start_time = None;
        self.file_end_time = None;
    }

    /// Marks every channel for export, or none.
    pub fn set_all_export(&mut self, eligible: bool) {
        for channel in self.channels.values_mut() {
            channel.set_export_eligible(eligible);
        }
    }

    /// Replaces the contents with the channels of `path`, then runs the
    /// post-ingest hooks of the matching driver.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = SourceFormat::from_path(path)?;
        self.clear();
        info!("loading {} as {:?}", path.display(), format);
        match format {
            SourceFormat::Tdms => {
                let file = drivers::tdms::read_file(path)?;
                drivers::waveform::ingest(self, &file)?;
                if self.config.remove_temperature_offset {
                    self.remove_adwin_temperature_offset()?;
                }
            }
            SourceFormat::Csv | SourceFormat::Dat => {
                drivers::text::ingest_file(self, path, format)?;
                self.add_combined_samples()?;
            }
        }
        debug!(
            "registry holds {} channels from {} devices",
            self.len(),
            self.devices.len()
        );
        Ok(())
    }
}

fn time_track_for(channel: &Channel) -> Result<Channel> {
    let name = format!("{}/{}", channel.device(), TIME_TRACK);
    let mut track = Channel::new(&name, channel.device(), channel.elapsed_minutes().clone());
    track.set_parent(channel.parent());
    track.set_unit("min");
    track.inherit_timing(channel)?;
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn adwin(name: &str, samples: Vec<f64>) -> Channel {
        let mut channel = Channel::from_vec(name, "ADWin", samples);
        channel.set_step_ms(100).unwrap();
        channel
    }

    #[test]
    fn add_stores_under_composite_key() {
        let mut registry = Registry::new();
        registry.add(adwin("ADWin/ISample", vec![1.0, 2.0, 3.0]));
        assert!(registry.contains("proc01/ADWin/ISample"));
        let channel = registry.get("proc01/ADWin/ISample").unwrap();
        assert_eq!(channel.parent(), "proc01");
        assert!(registry.parents().contains("proc01"));
        assert!(registry.devices().contains("ADWin"));
    }

    #[test]
    fn first_channel_per_device_synthesizes_time_track() {
        let mut registry = Registry::new();
        registry.add(adwin("ADWin/ISample", vec![1.0, 2.0, 3.0, 4.0]));
        registry.add(adwin("ADWin/VSample", vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(
            registry.keys(),
            vec![
                "proc01/ADWin/ISample".to_owned(),
                "proc01/ADWin/Time_m".to_owned(),
                "proc01/ADWin/VSample".to_owned(),
            ]
        );
        let track = registry.get("proc01/ADWin/Time_m").unwrap();
        let source = registry.get("proc01/ADWin/ISample").unwrap();
        assert_eq!(track.samples(), source.elapsed_minutes());
        assert_eq!(track.step_ms(), 100);
        assert_eq!(track.unit(), "min");
    }

    #[test]
    fn existing_time_channel_suppresses_synthesis() {
        let mut registry = Registry::new();
        registry.add(Channel::from_vec("all/Time_s", "all", vec![0.0, 1.0]));
        registry.add(Channel::from_vec("all/RSample", "all", vec![5.0, 6.0]));
        assert!(!registry.contains("proc01/all/Time_m"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn add_overwrites_in_place() {
        let mut registry = Registry::new();
        registry.add(adwin("ADWin/ISample", vec![1.0]));
        registry.add(adwin("ADWin/ISample", vec![7.0, 8.0]));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys()[0], "proc01/ADWin/ISample");
        assert_eq!(registry.get("proc01/ADWin/ISample").unwrap().len(), 2);
    }

    #[test]
    fn missing_key_is_not_found() {
        let registry = Registry::new();
        assert!(matches!(
            registry.get("proc01/ADWin/nothing"),
            Err(ConvertError::NotFound(key)) if key == "proc01/ADWin/nothing"
        ));
    }

    #[test]
    fn clear_empties_everything() {
        let mut registry = Registry::new();
        registry.file_start_time = NaiveDate::from_ymd_opt(2014, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0);
        registry.add(adwin("ADWin/ISample", vec![1.0]));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.devices().is_empty());
        assert!(registry.parents().is_empty());
        assert!(registry.file_start_time.is_none());
    }

    #[test]
    fn unknown_extension_is_unsupported_and_keeps_contents() {
        let mut registry = Registry::new();
        registry.add(adwin("ADWin/ISample", vec![1.0]));
        let err = registry.load_from_file("measurement.xlsx").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(_)));
        assert!(registry.contains("proc01/ADWin/ISample"));
    }

    #[test]
    fn load_csv_clears_previous_contents() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "measTime, RSample").unwrap();
        writeln!(file, "0.0, 10.0").unwrap();
        writeln!(file, "0.5, 11.0").unwrap();
        file.flush().unwrap();
        let mut registry = Registry::new();
        registry.add(adwin("ADWin/ISample", vec![1.0]));
        registry.load_from_file(file.path()).unwrap();
        assert!(!registry.contains("proc01/ADWin/ISample"));
        assert!(registry.contains("proc01/all/Time_s"));
        assert!(registry.contains("proc01/all/RSample"));
        for (key, channel) in registry.iter() {
            assert_eq!(key, channel.key());
            assert_eq!(channel.parent(), "proc01");
        }
    }

    #[test]
    fn export_flags_can_be_set_in_bulk() {
        let mut registry = Registry::new();
        registry.add(adwin("ADWin/ISample", vec![1.0]));
        registry.set_all_export(false);
        assert!(registry.iter().all(|(_, c)| !c.export_eligible()));
        assert!(registry.toggle_export("proc01/ADWin/ISample").unwrap());
        assert!(registry.get("proc01/ADWin/ISample").unwrap().export_eligible());
        registry.set_export("proc01/ADWin/Time_m", true).unwrap();
        assert!(matches!(
            registry.toggle_export("proc01/ADWin/nothing"),
            Err(ConvertError::NotFound(_))
        ));
    }

    #[test]
    fn edits_through_the_registry_keep_keys_in_sync() {
        let mut registry = Registry::new();
        registry.add(adwin("ADWin/ISample", vec![1.0, 2.0]));
        registry.map_samples("proc01/ADWin/ISample", |x| *x *= 10.0).unwrap();
        registry.toggle_export("proc01/ADWin/ISample").unwrap();
        assert_eq!(
            registry.get("proc01/ADWin/ISample").unwrap().samples().to_vec(),
            vec![10.0, 20.0]
        );
        assert!(registry.map_samples("proc/ADWin/ISample", |_| {}).is_err());
        for (key, channel) in registry.iter() {
            assert_eq!(key, channel.key());
        }
    }
}
