//! Canonical channel and device names.
//!
//! The instruments label their channels with free text ("1k - Pot",
//! "ITC 503", ...). Everything downstream keys on the canonical form.

/// `(canonical, original)` pairs for channel names.
pub const CHANNEL_ALIASES: &[(&str, &str)] = &[
    ("T1K", "1k - Pot"),
    ("THe3", "He3"),
    ("TSorp", "Sorption"),
    ("TSorp", "TSorb"),
    ("TSample_LK", "Temperature"),
    ("TSample_AD", "Temp_RuO"),
    ("Time_s", "measTime"),
];

/// `(canonical, original)` pairs for device (group) names.
pub const DEVICE_ALIASES: &[(&str, &str)] = &[("ITC503", "ITC 503")];

/// Rewrites every original spelling found in `name` unless its canonical
/// form is already present.
pub fn normalize(name: &str, table: &[(&str, &str)]) -> String {
    let mut name = name.to_owned();
    for &(canonical, original) in table {
        if name.contains(original) && !name.contains(canonical) {
            name = name.replace(original, canonical);
        }
    }
    name
}

pub fn normalize_channel(name: &str) -> String {
    normalize(name, CHANNEL_ALIASES)
}

pub fn normalize_device(name: &str) -> String {
    normalize(name, DEVICE_ALIASES)
}
