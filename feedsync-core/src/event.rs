//! Event model.
//!
//! An [`Event`] is an unordered mapping from property name to [`PropertyValue`].
//! Values are compared through their canonical form (see [`Canonical`]) so that
//! two encodings of the same instant, or the same address written with a
//! different parameter case, never look like an edit to the merge engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const UID: &str = "UID";
pub const SUMMARY: &str = "SUMMARY";
pub const LAST_MODIFIED: &str = "LAST-MODIFIED";

/// A date or date-time as it appears in an iCalendar property.
#[derive(Debug, Clone)]
pub enum EventTime {
    /// `VALUE=DATE`
    Date(NaiveDate),
    /// Trailing `Z`
    DateTimeUtc(DateTime<Utc>),
    /// No zone information at all
    DateTimeFloating(NaiveDateTime),
    /// `TZID=...` parameter
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    /// The UTC instant for this time, if it denotes one.
    ///
    /// Floating times, dates and zones unknown to the tz database have no instant.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            EventTime::DateTimeUtc(dt) => Some(*dt),
            EventTime::DateTimeZoned { datetime, tzid } => {
                let tz: Tz = tzid.parse().ok()?;
                tz.from_local_datetime(datetime)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            EventTime::Date(_) | EventTime::DateTimeFloating(_) => None,
        }
    }

    /// Format as an iCalendar value (without the TZID parameter).
    pub fn to_ics_string(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y%m%d").to_string(),
            EventTime::DateTimeUtc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::DateTimeFloating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::DateTimeZoned { datetime, .. } => {
                datetime.format("%Y%m%dT%H%M%S").to_string()
            }
        }
    }

    fn canonical(&self) -> Canonical {
        if let Some(instant) = self.to_utc() {
            return Canonical::Instant(instant);
        }
        match self {
            EventTime::Date(d) => Canonical::Date(*d),
            EventTime::DateTimeFloating(dt) => Canonical::Floating(*dt),
            EventTime::DateTimeZoned { datetime, tzid } => {
                Canonical::Zoned(*datetime, tzid.clone())
            }
            EventTime::DateTimeUtc(dt) => Canonical::Instant(*dt),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} {}", datetime.format("%Y-%m-%d %H:%M:%S"), tzid)
            }
        }
    }
}

/// A calendar user address (`ORGANIZER`, `ATTENDEE`) with its parameters.
#[derive(Debug, Clone)]
pub struct CalAddress {
    pub uri: String,
    /// Parameter names are stored upper-case.
    pub params: BTreeMap<String, String>,
}

impl CalAddress {
    pub fn new(uri: impl Into<String>) -> Self {
        CalAddress {
            uri: uri.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_ascii_uppercase(), value.into());
        self
    }
}

/// Fallback for value kinds the model does not interpret.
#[derive(Debug, Clone)]
pub struct RawValue {
    pub value: String,
    /// Parameter names are stored upper-case.
    pub params: BTreeMap<String, String>,
}

/// The value of one event property.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Text(String),
    DateTime(EventTime),
    Categories(Vec<String>),
    Address(CalAddress),
    Raw(RawValue),
    /// A property that occurs several times (e.g. one `ATTENDEE` line per guest).
    List(Vec<PropertyValue>),
}

/// Unpacked, comparable form of a [`PropertyValue`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Canonical {
    Text(String),
    Date(NaiveDate),
    Instant(DateTime<Utc>),
    Floating(NaiveDateTime),
    Zoned(NaiveDateTime, String),
    List(Vec<Canonical>),
    Map(BTreeMap<String, Canonical>),
}

impl PropertyValue {
    pub fn canonical(&self) -> Canonical {
        match self {
            PropertyValue::Text(s) => Canonical::Text(s.clone()),
            PropertyValue::DateTime(t) => t.canonical(),
            PropertyValue::Categories(items) => {
                Canonical::List(items.iter().cloned().map(Canonical::Text).collect())
            }
            PropertyValue::Address(addr) => {
                let mut map = BTreeMap::new();
                map.insert("uri".to_string(), Canonical::Text(canonical_uri(&addr.uri)));
                map.insert("params".to_string(), canonical_params(&addr.params));
                Canonical::Map(map)
            }
            PropertyValue::Raw(raw) => {
                let mut map = BTreeMap::new();
                map.insert("value".to_string(), Canonical::Text(raw.value.clone()));
                map.insert("params".to_string(), canonical_params(&raw.params));
                Canonical::Map(map)
            }
            PropertyValue::List(values) => {
                Canonical::List(values.iter().map(PropertyValue::canonical).collect())
            }
        }
    }

    /// The value as text, for values that have a single textual form.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Raw(raw) => Some(&raw.value),
            PropertyValue::Address(addr) => Some(&addr.uri),
            _ => None,
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for PropertyValue {}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<EventTime> for PropertyValue {
    fn from(t: EventTime) -> Self {
        PropertyValue::DateTime(t)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => write!(f, "{s}"),
            PropertyValue::DateTime(t) => write!(f, "{t}"),
            PropertyValue::Categories(items) => write!(f, "{}", items.join(",")),
            PropertyValue::Address(addr) => write!(f, "{}", addr.uri),
            PropertyValue::Raw(raw) => write!(f, "{}", raw.value),
            PropertyValue::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

// The scheme of a calendar address is case-insensitive ("MAILTO:" == "mailto:").
fn canonical_uri(uri: &str) -> String {
    match uri.split_once(':') {
        Some((scheme, rest)) => format!("{}:{}", scheme.to_ascii_lowercase(), rest),
        None => uri.to_string(),
    }
}

fn canonical_params(params: &BTreeMap<String, String>) -> Canonical {
    Canonical::Map(
        params
            .iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), Canonical::Text(v.clone())))
            .collect(),
    )
}

/// A calendar event as a property mapping.
///
/// Equality is key-set equality plus canonical equality of every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    properties: BTreeMap<String, PropertyValue>,
}

impl Event {
    pub fn new() -> Self {
        Event::default()
    }

    pub fn with_uid(uid: &str) -> Self {
        let mut event = Event::new();
        event.set(UID, uid);
        event
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut PropertyValue)> {
        self.properties.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn uid(&self) -> Option<&str> {
        self.get(UID).and_then(PropertyValue::as_text)
    }

    pub fn summary(&self) -> Option<&str> {
        self.get(SUMMARY).and_then(PropertyValue::as_text)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        match self.get(LAST_MODIFIED)? {
            PropertyValue::DateTime(t) => t.to_utc(),
            _ => None,
        }
    }

    /// Equality over every property except `ignored`.
    pub fn eq_ignoring(&self, other: &Event, ignored: &[&str]) -> bool {
        let relevant = |event: &Event| -> Vec<(String, Canonical)> {
            event
                .properties
                .iter()
                .filter(|(k, _)| !ignored.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.canonical()))
                .collect()
        };
        relevant(self) == relevant(other)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.summary().unwrap_or("(No title)"),
            self.uid().unwrap_or("no uid")
        )
    }
}
