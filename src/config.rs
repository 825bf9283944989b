use std::str::FromStr;

/// Charged once when a request is served by an adjacent zone.
pub const DEFAULT_CROSS_ZONE_PENALTY: f64 = 75.0;

/// Charged when no slot is reachable from the requested zone.
pub const DEFAULT_CANCELLATION_PENALTY: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyConfig {
    pub cross_zone: f64,
    pub cancellation: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            cross_zone: DEFAULT_CROSS_ZONE_PENALTY,
            cancellation: DEFAULT_CANCELLATION_PENALTY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub penalties: PenaltyConfig,
    /// Install the Prometheus recorder and dump it after a run.
    pub metrics: bool,
}

impl Config {
    /// Read `PARKSIM_*` variables, falling back to defaults on missing or bad values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = PenaltyConfig::default();
        let penalties = PenaltyConfig {
            cross_zone: parse_penalty(lookup("PARKSIM_CROSS_ZONE_PENALTY"))
                .unwrap_or(defaults.cross_zone),
            cancellation: parse_penalty(lookup("PARKSIM_CANCELLATION_PENALTY"))
                .unwrap_or(defaults.cancellation),
        };
        let metrics = lookup("PARKSIM_METRICS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self { penalties, metrics }
    }
}

fn parse_penalty(raw: Option<String>) -> Option<f64> {
    let value = raw.and_then(|s| f64::from_str(s.trim()).ok())?;
    // Penalties only ever grow a request's running cost.
    (value.is_finite() && value >= 0.0).then_some(value)
}
