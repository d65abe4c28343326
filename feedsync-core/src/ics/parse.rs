//! ICS parsing using the icalendar crate's parser.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use icalendar::parser::{Component, Property, read_calendar, unfold};
use tracing::warn;

use crate::error::{FeedSyncError, FeedSyncResult};
use crate::event::{CalAddress, Event, EventTime, PropertyValue, RawValue};

const DATE_TIME_PROPERTIES: &[&str] = &[
    "DTSTART",
    "DTEND",
    "DTSTAMP",
    "LAST-MODIFIED",
    "CREATED",
    "RECURRENCE-ID",
    "DUE",
];

pub(crate) const TEXT_PROPERTIES: &[&str] = &[
    "UID",
    "SUMMARY",
    "DESCRIPTION",
    "LOCATION",
    "COMMENT",
    "CONTACT",
    "STATUS",
    "TRANSP",
    "CLASS",
    "URL",
];

const ADDRESS_PROPERTIES: &[&str] = &["ORGANIZER", "ATTENDEE"];

/// Parse every `VEVENT` of a feed.
///
/// Events that cannot be read (e.g. without a `UID`) are skipped with a warning.
pub fn parse_feed(content: &str) -> FeedSyncResult<Vec<Event>> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| FeedSyncError::IcsParse(e.to_string()))?;

    let mut events = Vec::new();
    for component in &calendar.components {
        match component.name.as_ref() {
            "VEVENT" => match event_from_component(component) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "skipping unreadable event"),
            },
            "VTIMEZONE" => {}
            other => warn!(component = other, "component not implemented, skipping"),
        }
    }

    Ok(events)
}

/// Parse the first `VEVENT` of a single-event calendar (a stored file or cache entry).
pub fn parse_event(content: &str) -> FeedSyncResult<Event> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| FeedSyncError::IcsParse(e.to_string()))?;

    let vevent = calendar
        .components
        .iter()
        .find(|c| c.name.as_ref() == "VEVENT")
        .ok_or_else(|| FeedSyncError::IcsParse("no VEVENT found".into()))?;

    event_from_component(vevent)
}

fn event_from_component(vevent: &Component) -> FeedSyncResult<Event> {
    let mut grouped: BTreeMap<String, Vec<PropertyValue>> = BTreeMap::new();
    for prop in &vevent.properties {
        grouped
            .entry(prop.name.as_ref().to_string())
            .or_default()
            .push(property_value(prop));
    }

    let mut event = Event::new();
    for (name, mut values) in grouped {
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            PropertyValue::List(values)
        };
        event.set(name, value);
    }

    if event.uid().is_none() {
        return Err(FeedSyncError::IcsParse("event without UID".into()));
    }

    Ok(event)
}

fn property_value(prop: &Property) -> PropertyValue {
    let name = prop.name.as_ref();
    let value = prop.val.as_ref();
    let params = params_of(prop);

    if DATE_TIME_PROPERTIES.contains(&name) {
        if let Some(time) = parse_time(value, &params) {
            return PropertyValue::DateTime(time);
        }
    } else if ADDRESS_PROPERTIES.contains(&name) {
        return PropertyValue::Address(CalAddress {
            uri: value.to_string(),
            params,
        });
    } else if TEXT_PROPERTIES.contains(&name) {
        // Parameters (e.g. LANGUAGE) leave no room in a plain text value
        if !params.is_empty() {
            return PropertyValue::Raw(RawValue {
                value: unescape_text(value),
                params,
            });
        }
        return PropertyValue::Text(unescape_text(value));
    } else if name == "CATEGORIES" && params.is_empty() {
        return PropertyValue::Categories(
            split_text_list(value).iter().map(|s| unescape_text(s)).collect(),
        );
    }

    PropertyValue::Raw(RawValue {
        value: value.to_string(),
        params,
    })
}

/// The value `name` takes when it is written as `text` without parameters,
/// typed the way a stored file reads back.
pub(crate) fn value_for_property(name: &str, text: &str) -> PropertyValue {
    if DATE_TIME_PROPERTIES.contains(&name) {
        if let Some(time) = parse_time(text, &BTreeMap::new()) {
            return PropertyValue::DateTime(time);
        }
    } else if ADDRESS_PROPERTIES.contains(&name) {
        return PropertyValue::Address(CalAddress::new(text));
    } else if name == "CATEGORIES" {
        return PropertyValue::Categories(vec![text.to_string()]);
    } else if TEXT_PROPERTIES.contains(&name) {
        return PropertyValue::Text(text.to_string());
    }

    PropertyValue::Raw(RawValue {
        value: text.to_string(),
        params: BTreeMap::new(),
    })
}

fn params_of(prop: &Property) -> BTreeMap<String, String> {
    prop.params
        .iter()
        .map(|p| {
            let val = p
                .val
                .as_ref()
                .map(|v| unquote(v.as_ref()).to_string())
                .unwrap_or_default();
            (p.key.as_ref().to_ascii_uppercase(), val)
        })
        .collect()
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Parse a DATE or DATE-TIME value.
///
/// Handles:
/// - VALUE=DATE: `DTSTART;VALUE=DATE:20240108`
/// - TZID parameter: `DTSTART;TZID=America/New_York:20240108T100000`
/// - UTC: `DTSTART:20240108T100000Z`
/// - Floating: `DTSTART:20240108T100000`
fn parse_time(value: &str, params: &BTreeMap<String, String>) -> Option<EventTime> {
    let is_date = params.get("VALUE").is_some_and(|v| v == "DATE") || value.len() == 8;

    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(EventTime::Date);
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| EventTime::DateTimeUtc(dt.and_utc()));
    }

    let datetime = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    match params.get("TZID") {
        Some(tzid) => Some(EventTime::DateTimeZoned {
            datetime,
            tzid: tzid.clone(),
        }),
        None => Some(EventTime::DateTimeFloating(datetime)),
    }
}

/// Split a comma separated TEXT list, honouring `\,` escapes.
fn split_text_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);

    items
}

/// Undo RFC 5545 TEXT escaping.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}
