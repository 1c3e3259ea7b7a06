// ============================================================================
// Duration Parsing
// ============================================================================
//
// Accepts "500ms", "30s", "5m", "1h", "1.5s" or a bare number of seconds.
//
// ============================================================================

use std::time::Duration;

use crate::ConfigError;

pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let text = raw.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    let seconds = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(ConfigError::InvalidDuration(raw.to_string())),
    };

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))
}

/// `#[serde(with = "serde_duration")]` adapter for [`parse_duration`].
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(text) => {
                super::parse_duration(&text).map_err(serde::de::Error::custom)
            }
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }
}
