//! `#[serde(with = "crate::serde_duration")]` for `Duration` as integer milliseconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = value.as_millis().min(u64::MAX as u128) as u64;
    serializer.serialize_u64(millis)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// Same encoding for `Option<Duration>`; `null` means absent.
pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => super::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamp {
        #[serde(with = "crate::serde_duration")]
        at: Duration,
        #[serde(with = "crate::serde_duration::option", default)]
        last: Option<Duration>,
    }

    #[test]
    fn durations_encode_as_millis() {
        let json = serde_json::to_string(&Stamp {
            at: Duration::from_millis(1_500),
            last: None,
        })
        .expect("serialize");
        assert_eq!(json, r#"{"at":1500,"last":null}"#);

        let parsed: Stamp = serde_json::from_str(r#"{"at":20}"#).expect("missing option defaults");
        assert_eq!(parsed.at, Duration::from_millis(20));
        assert_eq!(parsed.last, None);
    }
}
