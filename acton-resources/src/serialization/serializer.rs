//! Field-level serializers
//!
//! A [`Serializer`] converts one native value to its wire form and back. The
//! stock implementation is [`DateTimeSerializer`], which speaks ISO-8601 on
//! the wire and understands both naive and offset-aware datetimes.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::error::{SerializationError, SerializationResult};

/// Bidirectional conversion between a native value and a wire value
pub trait Serializer: Send + Sync + 'static {
    /// The native type
    type Value;

    /// Native value to wire value
    fn dump(&self, value: &Self::Value) -> SerializationResult<Value>;

    /// Wire value to native value
    fn load(&self, serialized: &Value) -> SerializationResult<Self::Value>;
}

/// Type-erased [`Serializer`] operating on serde representations
///
/// Model serializers hold one of these per customised field. `to_wire`
/// receives whatever serde produced for the field and `from_wire` must return
/// something serde can deserialize back into it.
pub trait FieldSerializer: Send + Sync + 'static {
    /// serde representation to wire value
    fn to_wire(&self, native: Value) -> SerializationResult<Value>;

    /// Wire value to serde representation
    fn from_wire(&self, wire: &Value) -> SerializationResult<Value>;
}

impl<S> FieldSerializer for S
where
    S: Serializer,
    S::Value: Serialize + DeserializeOwned,
{
    fn to_wire(&self, native: Value) -> SerializationResult<Value> {
        let value: S::Value = serde_json::from_value(native)
            .map_err(|e| SerializationError::InvalidDocument(e.to_string()))?;
        self.dump(&value)
    }

    fn from_wire(&self, wire: &Value) -> SerializationResult<Value> {
        let value = self.load(wire)?;
        serde_json::to_value(value).map_err(|e| SerializationError::InvalidDocument(e.to_string()))
    }
}

/// A datetime that may or may not carry a UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireDateTime {
    /// No offset information
    Naive(NaiveDateTime),
    /// Fixed UTC offset (`Z` parses to an offset of zero)
    Aware(DateTime<FixedOffset>),
}

impl WireDateTime {
    /// The UTC offset, if any
    pub fn offset(&self) -> Option<FixedOffset> {
        match self {
            Self::Naive(_) => None,
            Self::Aware(dt) => Some(*dt.offset()),
        }
    }

    /// Wall-clock value without offset
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            Self::Naive(dt) => *dt,
            Self::Aware(dt) => dt.naive_local(),
        }
    }
}

impl From<NaiveDateTime> for WireDateTime {
    fn from(dt: NaiveDateTime) -> Self {
        Self::Naive(dt)
    }
}

impl From<DateTime<FixedOffset>> for WireDateTime {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::Aware(dt)
    }
}

/// `YYYY-MM-DD[T ]HH:MM[:SS][.f][tz]`, anchored at both ends
static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<Y>\d{2,4})-(?P<m>\d{2})-(?P<d>\d{2})",
        r"[T ]",
        r"(?P<H>\d{2}):(?P<M>\d{2})(:(?P<S>\d{2}))?(\.(?P<f>\d+))?",
        r"(?P<tz>[+-]\d{2}:?\d{2}|[Zz])?$",
    ))
    .expect("datetime regex is valid")
});

/// ISO-8601 datetime serializer
///
/// Accepts `YYYY-MM-DD[T ]HH:MM[:SS][.fraction][Z|±HH[:]MM]`. The year may
/// have two to four digits and the fraction any number of digits (anything
/// past nanoseconds is truncated).
///
/// ```rust
/// use acton_resources::serialization::{DateTimeSerializer, Serializer};
/// use serde_json::json;
///
/// let dt = DateTimeSerializer.load(&json!("2020-01-01T10:00:00+05:30")).unwrap();
/// assert_eq!(dt.offset().map(|o| o.local_minus_utc()), Some(19_800));
/// assert_eq!(DateTimeSerializer.dump(&dt).unwrap(), json!("2020-01-01T10:00:00+05:30"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeSerializer;

impl DateTimeSerializer {
    /// Parse a wire string
    pub fn parse(&self, text: &str) -> SerializationResult<WireDateTime> {
        let malformed = || SerializationError::MalformedDateTime(text.to_string());
        let caps = DATETIME_RE.captures(text).ok_or_else(malformed)?;

        let number = |name: &str| -> SerializationResult<u32> {
            caps.name(name)
                .map_or(Ok(0), |m| m.as_str().parse::<u32>().map_err(|_| malformed()))
        };

        let year = i32::try_from(number("Y")?).map_err(|_| malformed())?;
        let date = NaiveDate::from_ymd_opt(year, number("m")?, number("d")?).ok_or_else(malformed)?;

        let nanos = match caps.name("f") {
            Some(fraction) => {
                let digits: String = fraction.as_str().chars().take(9).collect();
                format!("{:0<9}", digits).parse::<u32>().map_err(|_| malformed())?
            }
            None => 0,
        };
        let time = NaiveTime::from_hms_nano_opt(number("H")?, number("M")?, number("S")?, nanos)
            .ok_or_else(malformed)?;
        let naive = NaiveDateTime::new(date, time);

        match caps.name("tz").map(|m| m.as_str()) {
            None => Ok(WireDateTime::Naive(naive)),
            Some(tz) => {
                let offset = parse_offset(tz).ok_or_else(malformed)?;
                naive
                    .and_local_timezone(offset)
                    .single()
                    .map(WireDateTime::Aware)
                    .ok_or_else(malformed)
            }
        }
    }

    /// Render a datetime as a wire string
    pub fn format(&self, value: &WireDateTime) -> String {
        match value {
            WireDateTime::Naive(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            WireDateTime::Aware(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

/// `Z`, `+HH:MM`, `-HHMM`; the sign applies to the whole offset so `-00:30`
/// is thirty minutes west of UTC
fn parse_offset(tz: &str) -> Option<FixedOffset> {
    if tz.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let sign = if tz.starts_with('-') { -1 } else { 1 };
    let hours: i32 = tz.get(1..3)?.parse().ok()?;
    let minutes: i32 = tz.get(tz.len() - 2..)?.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl Serializer for DateTimeSerializer {
    type Value = WireDateTime;

    fn dump(&self, value: &WireDateTime) -> SerializationResult<Value> {
        Ok(Value::String(self.format(value)))
    }

    fn load(&self, serialized: &Value) -> SerializationResult<WireDateTime> {
        match serialized {
            Value::String(text) => self.parse(text),
            other => Err(SerializationError::MalformedDateTime(other.to_string())),
        }
    }
}
