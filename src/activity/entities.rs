use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One continuous span of attention to a single app/title/url. `end` is absent while the user is
/// still on it.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct ActivitySegment {
    #[serde(rename = "starttime", with = "instant_ser")]
    pub start: DateTime<Utc>,
    #[serde(
        rename = "endtime",
        default,
        with = "optional_instant_ser",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<DateTime<Utc>>,
    /// Process or application name. Empty means the user went idle.
    pub app: Arc<str>,
    #[serde(default)]
    pub url: Option<Arc<str>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: Arc<str>,
}

impl ActivitySegment {
    pub fn new(app: impl Into<Arc<str>>, start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            app: app.into(),
            url: None,
            title: "".into(),
        }
    }

    pub fn with_end(self, end: DateTime<Utc>) -> Self {
        Self {
            end: Some(end),
            ..self
        }
    }

    pub fn with_url(self, url: impl Into<Arc<str>>) -> Self {
        Self {
            url: Some(url.into()),
            ..self
        }
    }

    pub fn with_title(self, title: impl Into<Arc<str>>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn is_idle(&self) -> bool {
        self.app.is_empty()
    }

    /// Milliseconds covered by a closed segment. Open segments have no fixed duration.
    pub fn closed_millis(&self) -> Option<i64> {
        self.end.map(|end| (end - self.start).num_milliseconds())
    }

    /// Host component of `url`. Unparseable urls and urls without a host yield nothing.
    pub fn host(&self) -> Option<Arc<str>> {
        let url = url::Url::parse(self.url.as_deref()?).ok()?;
        url.host_str().filter(|v| !v.is_empty()).map(Arc::from)
    }
}

/// Timestamps arrive either as RFC 3339 strings or as epoch milliseconds. They always leave as
/// RFC 3339.
mod instant_ser {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum WireInstant {
        Millis(i64),
        Text(String),
    }

    impl WireInstant {
        pub(super) fn into_instant<E: Error>(self) -> Result<DateTime<Utc>, E> {
            match self {
                WireInstant::Millis(ms) => DateTime::from_timestamp_millis(ms)
                    .ok_or_else(|| E::custom(format!("timestamp {ms} is out of range"))),
                WireInstant::Text(text) => DateTime::parse_from_rfc3339(&text)
                    .map(|v| v.to_utc())
                    .map_err(|e| E::custom(format!("invalid timestamp {text:?}: {e}"))),
            }
        }
    }

    pub fn serialize<S>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        WireInstant::deserialize(deserializer)?.into_instant()
    }
}

mod optional_instant_ser {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::instant_ser::{self, WireInstant};

    pub fn serialize<S>(instant: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match instant {
            Some(v) => instant_ser::serialize(v, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<WireInstant>::deserialize(deserializer)?
            .map(WireInstant::into_instant)
            .transpose()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Arc<str>>::deserialize(deserializer)?.unwrap_or_else(|| "".into()))
}
