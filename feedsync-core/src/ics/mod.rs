//! ICS file generation and parsing.
//!
//! This module converts between RFC 5545 text and the property-map [`Event`](crate::event::Event).

mod generate;
mod parse;

pub use generate::generate_ics;
pub use parse::{parse_event, parse_feed};
pub(crate) use parse::value_for_property;
