//! ICS file generation.

use std::collections::BTreeMap;

use icalendar::{Calendar, Component, Property};

use super::parse::TEXT_PROPERTIES;
use crate::error::{FeedSyncError, FeedSyncResult};
use crate::event::{Event, EventTime, PropertyValue};

/// Generate .ics content holding `event` as the only component.
pub fn generate_ics(event: &Event) -> FeedSyncResult<String> {
    if event.uid().is_none() {
        return Err(FeedSyncError::IcsGenerate(format!(
            "cannot write event without UID: {event}"
        )));
    }

    let mut cal = Calendar::new();
    let mut ics_event = icalendar::Event::new();

    for (name, value) in event.iter() {
        match value {
            // Multi-property (e.g. one ATTENDEE line per guest)
            PropertyValue::List(values) => {
                for value in values {
                    ics_event.append_multi_property(to_property(name, value));
                }
            }
            value => {
                ics_event.append_property(to_property(name, value));
            }
        }
    }

    cal.push(ics_event.done());
    let cal = cal.done();

    // icalendar stamps a DTSTAMP of its own when the event has none
    let keep_dtstamp = event.contains("DTSTAMP");
    Ok(strip_ics_bloat(&cal.to_string(), keep_dtstamp))
}

fn to_property(name: &str, value: &PropertyValue) -> Property {
    match value {
        PropertyValue::Text(text) => Property::new(name, escape_text(text)),
        PropertyValue::DateTime(time) => {
            let mut prop = Property::new(name, time.to_ics_string());
            match time {
                EventTime::Date(_) => {
                    prop.add_parameter("VALUE", "DATE");
                }
                EventTime::DateTimeZoned { tzid, .. } => {
                    prop.add_parameter("TZID", tzid);
                }
                EventTime::DateTimeUtc(_) | EventTime::DateTimeFloating(_) => {}
            }
            prop
        }
        PropertyValue::Categories(items) => {
            let joined: Vec<String> = items.iter().map(|i| escape_text(i)).collect();
            Property::new(name, joined.join(","))
        }
        PropertyValue::Address(addr) => with_params(Property::new(name, addr.uri.clone()), &addr.params),
        PropertyValue::Raw(raw) => {
            let value = if TEXT_PROPERTIES.contains(&name) {
                escape_text(&raw.value)
            } else {
                raw.value.clone()
            };
            with_params(Property::new(name, value), &raw.params)
        }
        // Nested lists have no line form of their own
        PropertyValue::List(values) => {
            let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            Property::new(name, joined.join(","))
        }
    }
}

fn with_params(mut prop: Property, params: &BTreeMap<String, String>) -> Property {
    for (key, value) in params {
        if value.contains([':', ';', ',']) {
            prop.add_parameter(key, &format!("\"{value}\""));
        } else {
            prop.add_parameter(key, value);
        }
    }
    prop
}

/// Apply RFC 5545 TEXT escaping.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with our own
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Remove the generated DTSTAMP unless the event carried one
fn strip_ics_bloat(ics: &str, keep_dtstamp: bool) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:-//feedsync//EN\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if !keep_dtstamp && (line.starts_with("DTSTAMP:") || line.starts_with("DTSTAMP;")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
