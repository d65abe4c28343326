//! Rule-based event filtering.
//!
//! Rules are evaluated in order against a fetched event before it is merged.
//! A matching `keep` rule always wins over any `remove` rule, whatever their
//! order; `set` rules rewrite a field and never affect the decision.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use crate::error::{FeedSyncError, FeedSyncResult};
use crate::event::{Event, PropertyValue, SUMMARY};
use crate::ics::value_for_property;

/// A literal in a filter rule, or a field value prepared for comparison.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Integer(i64),
    Text(String),
    List(Vec<Operand>),
}

impl From<&PropertyValue> for Operand {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Text(s) => Operand::Text(s.clone()),
            PropertyValue::DateTime(t) => Operand::Text(t.to_ics_string()),
            PropertyValue::Categories(items) => {
                Operand::List(items.iter().cloned().map(Operand::Text).collect())
            }
            PropertyValue::Address(addr) => Operand::Text(addr.uri.clone()),
            PropertyValue::Raw(raw) => Operand::Text(raw.value.clone()),
            PropertyValue::List(values) => Operand::List(values.iter().map(Operand::from).collect()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Integer(n) => write!(f, "{n}"),
            Operand::Text(s) => write!(f, "{s}"),
            Operand::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    Match,
    NotMatch,
}

impl FromStr for Operator {
    type Err = FeedSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            "in" => Ok(Operator::In),
            "not in" => Ok(Operator::NotIn),
            "match" => Ok(Operator::Match),
            "not match" => Ok(Operator::NotMatch),
            other => Err(FeedSyncError::MalformedFilterRule(format!(
                "invalid operator '{other}', supported operators are \
                 '==', '!=', 'in', 'not in', 'match' and 'not match'"
            ))),
        }
    }
}

/// Apply `op` to two operands.
///
/// `in` tests whether `left` is contained in `right` (substring or list
/// membership). `match` treats `right` as a regular expression anchored at the
/// start of `left`.
pub fn apply_operator(left: &Operand, right: &Operand, op: Operator) -> FeedSyncResult<bool> {
    match op {
        Operator::Eq => Ok(left == right),
        Operator::Ne => Ok(left != right),
        Operator::In => contains(right, left),
        Operator::NotIn => contains(right, left).map(|found| !found),
        Operator::Match => regex_match(left, right),
        Operator::NotMatch => regex_match(left, right).map(|found| !found),
    }
}

fn contains(container: &Operand, item: &Operand) -> FeedSyncResult<bool> {
    match (container, item) {
        (Operand::Text(haystack), Operand::Text(needle)) => Ok(haystack.contains(needle.as_str())),
        (Operand::Text(_), other) => Err(FeedSyncError::InvalidFilterOperand(format!(
            "cannot search text for non-text value '{other}'"
        ))),
        (Operand::List(items), item) => Ok(items.contains(item)),
        (Operand::Integer(n), _) => Err(FeedSyncError::InvalidFilterOperand(format!(
            "'{n}' is not a container"
        ))),
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}

fn regex_match(subject: &Operand, pattern: &Operand) -> FeedSyncResult<bool> {
    let (Operand::Text(subject), Operand::Text(pattern)) = (subject, pattern) else {
        return Err(FeedSyncError::InvalidFilterOperand(format!(
            "regular expression match needs text, got '{subject}' and '{pattern}'"
        )));
    };
    let re = anchored(pattern).map_err(|e| FeedSyncError::InvalidFilterOperand(e.to_string()))?;
    Ok(re.is_match(subject))
}

/// What a matching rule does.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Remove,
    Keep,
    Set { field: String, value: Operand },
}

/// A filter rule as written in the configuration.
///
/// Every field is optional so that problems surface as [`FeedSyncError`]s
/// when the rule is checked or evaluated, not as deserialization failures.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterRule {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<Operand>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub action_field: Option<String>,
    #[serde(default)]
    pub action_value: Option<Operand>,
}

/// A checked [`FilterRule`] with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub field: String,
    pub operator: Operator,
    pub value: Operand,
    pub action: Action,
}

impl FilterRule {
    pub fn compile(&self) -> FeedSyncResult<CompiledRule> {
        let value = self.value.clone().ok_or_else(|| {
            FeedSyncError::MalformedFilterRule("missing filter parameter 'value'".into())
        })?;

        let operator: Operator = self.operator.as_deref().unwrap_or("==").parse()?;

        if matches!(operator, Operator::Match | Operator::NotMatch) {
            if let Operand::Text(pattern) = &value {
                anchored(pattern).map_err(|e| {
                    FeedSyncError::MalformedFilterRule(format!("invalid pattern '{pattern}': {e}"))
                })?;
            }
        }

        let action = match self.action.as_deref().unwrap_or("remove") {
            "remove" => Action::Remove,
            "keep" => Action::Keep,
            "set" => {
                let field = self.action_field.clone().ok_or_else(|| {
                    FeedSyncError::MalformedFilterRule(
                        "action 'set' needs 'action_field'".into(),
                    )
                })?;
                let value = self.action_value.clone().ok_or_else(|| {
                    FeedSyncError::MalformedFilterRule(
                        "action 'set' needs 'action_value'".into(),
                    )
                })?;
                Action::Set { field, value }
            }
            other => return Err(FeedSyncError::UnsupportedFilterAction(other.to_string())),
        };

        Ok(CompiledRule {
            field: self.field.clone().unwrap_or_else(|| SUMMARY.to_string()),
            operator,
            value,
            action,
        })
    }
}

impl CompiledRule {
    /// Whether the rule applies to `event`. Rules on absent fields never match.
    pub fn matches(&self, event: &Event) -> FeedSyncResult<bool> {
        let Some(field_value) = event.get(&self.field) else {
            return Ok(false);
        };
        let field_value = Operand::from(field_value);

        match self.operator {
            // A list literal enumerates accepted field values; any other
            // literal is searched for inside the field.
            Operator::In | Operator::NotIn => match (&field_value, &self.value) {
                // A list field matches when any of its members is listed
                (Operand::List(members), Operand::List(_)) => {
                    let mut found = false;
                    for member in members {
                        if apply_operator(member, &self.value, Operator::In)? {
                            found = true;
                            break;
                        }
                    }
                    Ok(found == (self.operator == Operator::In))
                }
                (_, Operand::List(_)) => apply_operator(&field_value, &self.value, self.operator),
                _ => apply_operator(&self.value, &field_value, self.operator),
            },
            _ => apply_operator(&field_value, &self.value, self.operator),
        }
    }
}

/// Outcome of running the rules over one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Undecided,
    Remove,
    Keep,
}

/// Evaluate `rules` in order, applying `set` rules to `event` as they match.
pub fn decide(event: &mut Event, rules: &[FilterRule]) -> FeedSyncResult<Decision> {
    let mut decision = Decision::Undecided;

    for rule in rules {
        let rule = rule.compile()?;
        if !rule.matches(event)? {
            continue;
        }

        match rule.action {
            Action::Remove => {
                if decision == Decision::Undecided {
                    decision = Decision::Remove;
                }
            }
            Action::Keep => decision = Decision::Keep,
            Action::Set { field, value } => {
                let value = set_value(&field, &value);
                event.set(field, value);
            }
        }
    }

    Ok(decision)
}

/// The literal of a `set` rule, typed the way `field` reads back from a stored file.
fn set_value(field: &str, value: &Operand) -> PropertyValue {
    match value {
        Operand::List(items) if field == "CATEGORIES" => {
            PropertyValue::Categories(items.iter().map(|i| i.to_string()).collect())
        }
        Operand::List(items) => {
            let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
            value_for_property(field, &parts.join(","))
        }
        other => value_for_property(field, &other.to_string()),
    }
}

/// Run the filter over `event`; `None` means the event is dropped.
pub fn filter_event(mut event: Event, rules: &[FilterRule]) -> FeedSyncResult<Option<Event>> {
    match decide(&mut event, rules)? {
        Decision::Remove => Ok(None),
        Decision::Undecided | Decision::Keep => Ok(Some(event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Operand {
        Operand::Text(s.to_string())
    }

    fn ints(items: &[i64]) -> Operand {
        Operand::List(items.iter().copied().map(Operand::Integer).collect())
    }

    fn rule(field: &str, operator: &str, value: &str, action: &str) -> FilterRule {
        FilterRule {
            field: Some(field.to_string()),
            operator: Some(operator.to_string()),
            value: Some(text(value)),
            action: Some(action.to_string()),
            ..Default::default()
        }
    }

    fn event() -> Event {
        let mut event = Event::with_uid("1");
        event.set(SUMMARY, "X");
        event.set("LOCATION", "Y");
        event
    }

    #[test]
    fn equal_operator() {
        let (five, six) = (Operand::Integer(5), Operand::Integer(6));
        assert!(apply_operator(&five, &five, Operator::Eq).unwrap());
        assert!(!apply_operator(&five, &six, Operator::Eq).unwrap());
        assert!(!apply_operator(&five, &five, Operator::Ne).unwrap());
        assert!(apply_operator(&five, &six, Operator::Ne).unwrap());
    }

    #[test]
    fn in_operator() {
        let list = ints(&[1, 2, 3]);
        assert!(apply_operator(&Operand::Integer(2), &list, Operator::In).unwrap());
        assert!(!apply_operator(&Operand::Integer(4), &list, Operator::In).unwrap());
        assert!(apply_operator(&Operand::Integer(4), &list, Operator::NotIn).unwrap());
        assert!(!apply_operator(&Operand::Integer(2), &list, Operator::NotIn).unwrap());
        assert!(apply_operator(&text("ice"), &text("office hours"), Operator::In).unwrap());
    }

    #[test]
    fn match_operator() {
        assert!(apply_operator(&text("apple"), &text(r"app\w+"), Operator::Match).unwrap());
        assert!(!apply_operator(&text("banana"), &text(r"app\w+"), Operator::Match).unwrap());
        assert!(!apply_operator(&text("apple"), &text(r"app\w+"), Operator::NotMatch).unwrap());
        assert!(apply_operator(&text("banana"), &text(r"app\w+"), Operator::NotMatch).unwrap());
    }

    #[test]
    fn match_is_anchored_at_start() {
        assert!(!apply_operator(&text("pineapple"), &text(r"app\w+"), Operator::Match).unwrap());
        assert!(apply_operator(&text("apple pie"), &text("apple"), Operator::Match).unwrap());
    }

    #[test]
    fn invalid_operator() {
        let err = "<".parse::<Operator>().unwrap_err();
        assert!(matches!(err, FeedSyncError::MalformedFilterRule(_)));
    }

    #[test]
    fn invalid_operands() {
        let err = apply_operator(&Operand::Integer(5), &Operand::Integer(6), Operator::In)
            .unwrap_err();
        assert!(matches!(err, FeedSyncError::InvalidFilterOperand(_)));

        let err =
            apply_operator(&Operand::Integer(5), &text("abc"), Operator::Match).unwrap_err();
        assert!(matches!(err, FeedSyncError::InvalidFilterOperand(_)));
    }

    #[test]
    fn keep_wins_regardless_of_order() {
        let remove = rule(SUMMARY, "==", "X", "remove");
        let keep = rule("LOCATION", "==", "Y", "keep");

        for rules in [vec![remove.clone(), keep.clone()], vec![keep, remove]] {
            let mut e = event();
            assert_eq!(decide(&mut e, &rules).unwrap(), Decision::Keep);
            assert!(filter_event(event(), &rules).unwrap().is_some());
        }
    }

    #[test]
    fn matching_remove_drops_event() {
        let rules = vec![rule(SUMMARY, "==", "X", "remove")];
        assert!(filter_event(event(), &rules).unwrap().is_none());

        let rules = vec![
            rule(SUMMARY, "==", "X", "remove"),
            rule(SUMMARY, "match", "X", "remove"),
        ];
        assert!(filter_event(event(), &rules).unwrap().is_none());
    }

    #[test]
    fn absent_field_never_matches() {
        let rules = vec![rule("CATEGORIES", "!=", "anything", "remove")];
        assert!(filter_event(event(), &rules).unwrap().is_some());
    }

    #[test]
    fn set_rewrites_field_without_deciding() {
        let rules = vec![FilterRule {
            value: Some(text("X")),
            action: Some("set".into()),
            action_field: Some("LOCATION".into()),
            action_value: Some(text("Online")),
            ..Default::default()
        }];
        let filtered = filter_event(event(), &rules).unwrap().expect("kept");
        assert_eq!(filtered.get("LOCATION"), Some(&PropertyValue::from("Online")));
        assert_eq!(filtered.summary(), Some("X"));
    }

    #[test]
    fn defaults_to_summary_equality_and_remove() {
        let rules = vec![FilterRule {
            value: Some(text("X")),
            ..Default::default()
        }];
        let compiled = rules[0].compile().unwrap();
        assert_eq!(compiled.field, SUMMARY);
        assert_eq!(compiled.operator, Operator::Eq);
        assert_eq!(compiled.action, Action::Remove);
        assert!(filter_event(event(), &rules).unwrap().is_none());
    }

    #[test]
    fn in_searches_field_for_literal() {
        let mut e = event();
        e.set(SUMMARY, "Team offsite 2024");
        let rules = vec![rule(SUMMARY, "in", "offsite", "remove")];
        assert!(filter_event(e, &rules).unwrap().is_none());
    }

    #[test]
    fn categories_membership() {
        let mut e = event();
        e.set(
            "CATEGORIES",
            PropertyValue::Categories(vec!["HOLIDAY".into(), "SCHOOL".into()]),
        );
        let rules = vec![rule("CATEGORIES", "in", "HOLIDAY", "remove")];
        assert!(filter_event(e, &rules).unwrap().is_none());
    }

    #[test]
    fn malformed_rules_are_reported() {
        let missing_value = FilterRule::default();
        assert!(matches!(
            filter_event(event(), &[missing_value]).unwrap_err(),
            FeedSyncError::MalformedFilterRule(_)
        ));

        let set_without_field = FilterRule {
            value: Some(text("X")),
            action: Some("set".into()),
            action_value: Some(text("Online")),
            ..Default::default()
        };
        assert!(matches!(
            filter_event(event(), &[set_without_field]).unwrap_err(),
            FeedSyncError::MalformedFilterRule(_)
        ));

        let bad_pattern = rule(SUMMARY, "match", "(", "remove");
        assert!(matches!(
            bad_pattern.compile().unwrap_err(),
            FeedSyncError::MalformedFilterRule(_)
        ));
    }

    #[test]
    fn unsupported_action_is_reported() {
        let rules = vec![rule(SUMMARY, "==", "X", "archive")];
        let err = filter_event(event(), &rules).unwrap_err();
        assert!(matches!(err, FeedSyncError::UnsupportedFilterAction(a) if a == "archive"));
    }

    #[test]
    fn rules_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Rules {
            filter: Vec<FilterRule>,
        }

        let rules: Rules = toml::from_str(
            r#"
            [[filter]]
            value = "Holiday"
            operator = "in"

            [[filter]]
            field = "LOCATION"
            operator = "in"
            value = ["Berlin", "Hamburg"]
            action = "keep"
            "#,
        )
        .unwrap();

        assert_eq!(rules.filter.len(), 2);
        assert_eq!(rules.filter[0].value, Some(text("Holiday")));
        assert_eq!(
            rules.filter[1].value,
            Some(Operand::List(vec![text("Berlin"), text("Hamburg")]))
        );
        assert_eq!(rules.filter[1].compile().unwrap().action, Action::Keep);

        let mut e = event();
        e.set(SUMMARY, "Holiday party");
        e.set("LOCATION", "Hamburg");
        let mut decided = e.clone();
        assert_eq!(decide(&mut decided, &rules.filter).unwrap(), Decision::Keep);
    }

    #[test]
    fn set_value_follows_field_kind() {
        let rules = vec![FilterRule {
            value: Some(text("X")),
            action: Some("set".into()),
            action_field: Some("CATEGORIES".into()),
            action_value: Some(text("WORK")),
            ..Default::default()
        }];
        let filtered = filter_event(event(), &rules).unwrap().expect("kept");
        assert_eq!(
            filtered.get("CATEGORIES"),
            Some(&PropertyValue::Categories(vec!["WORK".into()]))
        );
    }

    #[test]
    fn category_list_field_in_list_literal() {
        let mut e = event();
        e.set(
            "CATEGORIES",
            PropertyValue::Categories(vec!["HOLIDAY".into(), "SCHOOL".into()]),
        );
        let listed = Operand::List(vec![text("SCHOOL"), text("EXAM")]);

        let rules = vec![FilterRule {
            field: Some("CATEGORIES".into()),
            operator: Some("in".into()),
            value: Some(listed.clone()),
            ..Default::default()
        }];
        assert!(filter_event(e.clone(), &rules).unwrap().is_none());

        let rules = vec![FilterRule {
            field: Some("CATEGORIES".into()),
            operator: Some("not in".into()),
            value: Some(listed),
            ..Default::default()
        }];
        assert!(filter_event(e.clone(), &rules).unwrap().is_some());

        let unrelated = vec![FilterRule {
            field: Some("CATEGORIES".into()),
            operator: Some("in".into()),
            value: Some(Operand::List(vec![text("EXAM")])),
            ..Default::default()
        }];
        assert!(filter_event(e, &unrelated).unwrap().is_some());
    }

    #[test]
    fn list_literal_tests_field_membership() {
        let rules = vec![FilterRule {
            field: Some("LOCATION".into()),
            operator: Some("not in".into()),
            value: Some(Operand::List(vec![text("Y"), text("Z")])),
            ..Default::default()
        }];
        assert!(filter_event(event(), &rules).unwrap().is_some());

        let mut elsewhere = event();
        elsewhere.set("LOCATION", "Berlin");
        assert!(filter_event(elsewhere, &rules).unwrap().is_none());
    }
}
