//! Parsing of volume values written as linear gains or decibels.

use std::fmt;

use serde::de::{Error as DeError, Visitor};
use serde::Deserializer;

/// Convert a dB value to linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Parse `"0.5"` or `"-6db"` into a linear gain.
pub fn parse_volume(value: &str) -> Option<f32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    match lower.strip_suffix("db") {
        Some(db) => db.trim().parse::<f32>().ok().map(db_to_linear),
        None => trimmed.parse::<f32>().ok(),
    }
}

struct VolumeVisitor;

impl<'de> Visitor<'de> for VolumeVisitor {
    type Value = f32;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a linear volume or a string like \"-6db\"")
    }

    fn visit_f64<E: DeError>(self, value: f64) -> Result<f32, E> {
        Ok(value as f32)
    }

    fn visit_i64<E: DeError>(self, value: i64) -> Result<f32, E> {
        Ok(value as f32)
    }

    fn visit_u64<E: DeError>(self, value: u64) -> Result<f32, E> {
        Ok(value as f32)
    }

    fn visit_str<E: DeError>(self, value: &str) -> Result<f32, E> {
        parse_volume(value).ok_or_else(|| E::custom(format!("invalid volume \"{}\"", value)))
    }
}

/// Deserialize a volume that may be expressed in dB.
pub fn deserialize_volume<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(VolumeVisitor)
}

/// Deserialize an optional volume that may be expressed in dB.
pub fn deserialize_optional_volume<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptionalVisitor;

    impl<'de> Visitor<'de> for OptionalVisitor {
        type Value = Option<f32>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("null, a linear volume or a string like \"-6db\"")
        }

        fn visit_none<E: DeError>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: DeError>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2>(self, deserializer: D2) -> Result<Self::Value, D2::Error>
        where
            D2: Deserializer<'de>,
        {
            deserialize_volume(deserializer).map(Some)
        }
    }

    deserializer.deserialize_option(OptionalVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "deserialize_volume")]
        volume: f32,
        #[serde(default, deserialize_with = "deserialize_optional_volume")]
        from: Option<f32>,
    }

    #[test]
    fn parses_linear_and_db_strings() {
        assert_eq!(parse_volume("0.5"), Some(0.5));
        assert!((parse_volume("-6dB").unwrap() - 0.501_187).abs() < 1e-5);
        assert_eq!(parse_volume("0 db"), Some(1.0));
        assert_eq!(parse_volume("loud"), None);
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let holder: Holder = serde_json::from_str(r#"{"volume":"-20db","from":0}"#).unwrap();
        assert!((holder.volume - 0.1).abs() < 1e-6);
        assert_eq!(holder.from, Some(0.0));

        let holder: Holder = serde_json::from_str(r#"{"volume":1}"#).unwrap();
        assert_eq!(holder.volume, 1.0);
        assert_eq!(holder.from, None);

        assert!(serde_json::from_str::<Holder>(r#"{"volume":"x"}"#).is_err());
    }
}
