/// Shared serde utilities for domain models
/// Optional `Duration` stored as whole milliseconds.
pub mod duration_opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Timed {
        #[serde(
            default,
            with = "duration_opt_millis",
            skip_serializing_if = "Option::is_none"
        )]
        duration: Option<Duration>,
    }

    #[test]
    fn duration_serializes_as_millis() {
        let obj = Timed {
            duration: Some(Duration::from_millis(1_250)),
        };

        let json = serde_json::to_string(&obj).unwrap();
        assert_eq!(json, r#"{"duration":1250}"#);
    }

    #[test]
    fn oversized_duration_saturates() {
        let obj = Timed {
            duration: Some(Duration::MAX),
        };

        let json = serde_json::to_string(&obj).unwrap();
        assert_eq!(json, format!(r#"{{"duration":{}}}"#, u64::MAX));
    }

    #[test]
    fn duration_deserializes_from_millis() {
        let obj: Timed = serde_json::from_str(r#"{"duration":40}"#).unwrap();
        assert_eq!(obj.duration, Some(Duration::from_millis(40)));
    }

    #[test]
    fn missing_duration_defaults_to_none() {
        let obj: Timed = serde_json::from_str("{}").unwrap();
        assert!(obj.duration.is_none());
    }
}
