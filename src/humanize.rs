//! Human-readable durations and byte sizes for configuration values

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty value")]
    Empty,

    #[error("invalid number in '{0}'")]
    InvalidNumber(String),

    #[error("invalid unit '{unit}' in '{input}'")]
    InvalidUnit { input: String, unit: String },
}

/// Split "15m" into (15, "m"); unit is lowercased and may be empty
fn split_quantity(input: &str) -> Result<(u64, String), ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let pos = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(pos);

    let value = digits
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidNumber(trimmed.to_string()))?;

    Ok((value, unit.trim().to_ascii_lowercase()))
}

/// Duration written as "90s", "10m", "2h", "500ms" or a bare number of seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<HumanDuration> for Duration {
    fn from(value: HumanDuration) -> Self {
        value.0
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_quantity(s)?;
        let duration = match unit.as_str() {
            "" | "s" | "sec" | "secs" => Duration::from_secs(value),
            "ms" => Duration::from_millis(value),
            "m" | "min" | "mins" => Duration::from_secs(value.saturating_mul(60)),
            "h" | "hr" | "hrs" => Duration::from_secs(value.saturating_mul(3600)),
            _ => {
                return Err(ParseError::InvalidUnit {
                    input: s.to_string(),
                    unit,
                });
            }
        };
        Ok(Self(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        if millis % 1000 != 0 {
            return write!(f, "{millis}ms");
        }
        let secs = self.0.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{secs}s")
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DurationVisitor;

        impl serde::de::Visitor<'_> for DurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration such as \"30s\" or \"10m\", or seconds as integer")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(HumanDuration::from_secs(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(HumanDuration::from_secs)
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Byte count written as "512MB", "2GB" or a bare integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_quantity(s)?;
        let multiplier: u64 = match unit.as_str() {
            "" | "b" => 1,
            "k" | "kb" | "kib" => 1 << 10,
            "m" | "mb" | "mib" => 1 << 20,
            "g" | "gb" | "gib" => 1 << 30,
            "t" | "tb" | "tib" => 1 << 40,
            _ => {
                return Err(ParseError::InvalidUnit {
                    input: s.to_string(),
                    unit,
                });
            }
        };
        value
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ParseError::InvalidNumber(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    /// Largest unit that divides the size exactly, so the text parses back
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(&str, u64); 4] = [("TB", 1 << 40), ("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];

        for (unit, size) in UNITS {
            if self.0 >= size && self.0 % size == 0 {
                return write!(f, "{}{unit}", self.0 / size);
            }
        }
        write!(f, "{}B", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct SizeVisitor;

        impl serde::de::Visitor<'_> for SizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size such as \"512MB\", or bytes as integer")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom("size must not be negative"))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_durations() {
        assert_eq!("90".parse::<HumanDuration>().unwrap().0, Duration::from_secs(90));
        assert_eq!("90s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(90));
        assert_eq!("10m".parse::<HumanDuration>().unwrap().0, Duration::from_secs(600));
        assert_eq!("2h".parse::<HumanDuration>().unwrap().0, Duration::from_secs(7200));
        assert_eq!("250ms".parse::<HumanDuration>().unwrap().0, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_eq!("".parse::<HumanDuration>(), Err(ParseError::Empty));
        assert!(matches!(
            "5 fortnights".parse::<HumanDuration>(),
            Err(ParseError::InvalidUnit { .. })
        ));
        assert!(matches!(
            "m".parse::<HumanDuration>(),
            Err(ParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(HumanDuration::from_secs(7200).to_string(), "2h");
        assert_eq!(HumanDuration::from_secs(600).to_string(), "10m");
        assert_eq!(HumanDuration::from_secs(45).to_string(), "45s");
        assert_eq!(HumanDuration(Duration::from_millis(1500)).to_string(), "1500ms");
    }

    #[test]
    fn test_parse_sizes() {
        assert_eq!("1024".parse::<ByteSize>().unwrap().as_u64(), 1024);
        assert_eq!("512MB".parse::<ByteSize>().unwrap().as_u64(), 512 * 1024 * 1024);
        assert_eq!("2gib".parse::<ByteSize>().unwrap().as_u64(), 2 << 30);
        assert!("99999999999TB".parse::<ByteSize>().is_err());
    }

    #[test]
    fn test_size_display() {
        assert_eq!(ByteSize(512).to_string(), "512B");
        assert_eq!(ByteSize(1 << 20).to_string(), "1MB");
        assert_eq!(ByteSize(3 * (1 << 19)).to_string(), "1536KB");
        assert_eq!(ByteSize(0).to_string(), "0B");
    }

    #[test]
    fn test_size_display_parses_back() {
        for bytes in [0, 1, 1023, 1024, 1_500_000_000, 3 << 30, (5 << 40) + 1, u64::MAX] {
            let shown = ByteSize(bytes).to_string();
            let reparsed: ByteSize = shown.parse().unwrap();
            assert_eq!(reparsed.as_u64(), bytes, "{shown}");
        }
        assert_eq!(ByteSize(1_500_000_000).to_string(), "1500000000B");
    }

    #[test]
    fn test_deserialize_from_json() {
        #[derive(Deserialize)]
        struct Limits {
            timeout: HumanDuration,
            max: ByteSize,
        }

        let parsed: Limits = serde_json::from_str(r#"{"timeout": "5m", "max": "1GB"}"#).unwrap();
        assert_eq!(parsed.timeout.as_duration(), Duration::from_secs(300));
        assert_eq!(parsed.max.as_u64(), 1 << 30);

        let parsed: Limits = serde_json::from_str(r#"{"timeout": 30, "max": 2048}"#).unwrap();
        assert_eq!(parsed.timeout.as_duration(), Duration::from_secs(30));
        assert_eq!(parsed.max.as_u64(), 2048);
    }
}
