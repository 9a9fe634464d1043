//! Serde helpers for lenient decoding of hub payloads.
//!
//! When the `tracing` feature is enabled, [`deserialize_with_warnings`] also logs
//! unknown fields and the path of any decode failure, which helps spot firmware
//! changes on the hub side.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize JSON, warning about fields the target type does not capture.
///
/// Unknown fields never fail deserialization.
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    use std::any::type_name;

    let original = value.to_string();
    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        let jd = &mut serde_json::Deserializer::from_str(&original);
        if let Err(path_err) = serde_path_to_error::deserialize::<_, T>(jd) {
            tracing::warn!(
                type_name = %type_name::<T>(),
                path = %path_err.path(),
                error = %path_err.inner(),
                "inbound message failed to deserialize"
            );
        }
    })?;

    for path in unknown_paths {
        tracing::debug!(
            type_name = %type_name::<T>(),
            field = %path,
            "unknown field in inbound message"
        );
    }

    Ok(result)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    serde_json::from_value(value)
}

/// Timestamps sent either as RFC 3339 strings or as Unix epoch milliseconds.
///
/// Always serialized back as RFC 3339.
pub mod timestamp {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TimestampVisitor;

        impl Visitor<'_> for TimestampVisitor {
            type Value = DateTime<Utc>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("an RFC 3339 timestamp or epoch milliseconds")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                DateTime::parse_from_rfc3339(v)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(E::custom)
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                DateTime::from_timestamp_millis(v)
                    .ok_or_else(|| E::custom(format!("timestamp {v} out of range")))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let millis =
                    i64::try_from(v).map_err(|_e| E::custom(format!("timestamp {v} out of range")))?;
                self.visit_i64(millis)
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Strings that some firmware sends as bare integers (error codes).
pub mod string_or_number {
    use std::fmt;

    use serde::Deserializer;
    use serde::de::{self, Visitor};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StringOrNumberVisitor;

        impl Visitor<'_> for StringOrNumberVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("string or integer")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_owned())
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v)
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_string())
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_string())
            }
        }

        deserializer.deserialize_any(StringOrNumberVisitor)
    }
}
