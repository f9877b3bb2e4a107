use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the repository engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Where snapshots come from: an `http(s)://` URL, a `file://` URL, or a
    /// plain path.
    pub source: String,
    /// Poll upstream at this interval. `None` disables polling.
    #[serde(with = "optional_secs")]
    pub poll_interval: Option<Duration>,
    /// Upper bound for a single upstream fetch.
    #[serde(with = "secs")]
    pub fetch_timeout: Duration,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            poll_interval: None,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl RepoConfig {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
