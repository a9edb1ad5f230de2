//! Alert rule matching.
//!
//! Alerts are advisory. They are recomputed from scratch on every change and never gate
//! saving a result, including panic values.

use serde::Serialize;

use profiles::{AlertAction, AlertRule, ProfileComponent, ProfileDefinition};

use crate::value::{FieldValue, ValueMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

/// A parsed `{key} <op> literal` trigger.
#[derive(Clone, Debug, PartialEq)]
pub struct Trigger {
    pub key: String,
    pub comparison: Comparison,
    pub literal: Literal,
}

impl Trigger {
    /// Parse a trigger expression. Anything that does not fit the grammar yields `None`.
    ///
    /// Literals are decimal numbers or strings quoted with `'` or `"`.
    pub fn parse(trigger: &str) -> Option<Self> {
        let rest = trigger.trim().strip_prefix('{')?;
        let close = rest.find('}')?;
        let key = rest[..close].trim();
        if key.is_empty() {
            return None;
        }

        let rest = rest[close + 1..].trim_start();
        // Two-character operators first so `<=` is not read as `<` followed by `=`.
        let (comparison, rest) = [
            ("==", Comparison::Equal),
            ("!=", Comparison::NotEqual),
            ("<=", Comparison::LessOrEqual),
            (">=", Comparison::GreaterOrEqual),
            ("<", Comparison::Less),
            (">", Comparison::Greater),
        ]
        .into_iter()
        .find_map(|(symbol, comparison)| rest.strip_prefix(symbol).map(|r| (comparison, r)))?;

        let literal = parse_literal(rest.trim())?;
        if matches!(literal, Literal::Text(_))
            && !matches!(comparison, Comparison::Equal | Comparison::NotEqual)
        {
            return None;
        }

        Some(Self {
            key: key.to_owned(),
            comparison,
            literal,
        })
    }

    /// Whether `value` satisfies this trigger.
    pub fn matches(&self, value: &FieldValue) -> bool {
        match &self.literal {
            Literal::Number(expected) => {
                let Some(actual) = value.as_number() else {
                    return false;
                };
                match self.comparison {
                    Comparison::Less => actual < *expected,
                    Comparison::LessOrEqual => actual <= *expected,
                    Comparison::Greater => actual > *expected,
                    Comparison::GreaterOrEqual => actual >= *expected,
                    Comparison::Equal => actual == *expected,
                    Comparison::NotEqual => actual != *expected,
                }
            }
            Literal::Text(expected) => {
                let actual = value.display();
                let equal = actual.trim() == expected.trim();
                match self.comparison {
                    Comparison::Equal => equal,
                    Comparison::NotEqual => !equal,
                    _ => false,
                }
            }
        }
    }
}

fn parse_literal(raw: &str) -> Option<Literal> {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Some(Literal::Text(raw[1..raw.len() - 1].to_owned()));
        }
    }
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(Literal::Number)
}

/// An alert that fired for the current values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FiredAlert {
    pub key: String,
    /// Label of the component the rule tests, or the key if the profile has no such field.
    pub label: String,
    pub action: AlertAction,
    pub message: String,
    pub trigger: String,
    pub value: FieldValue,
}

/// Evaluate a single rule against `values`.
pub fn check_rule(
    profile: &ProfileDefinition,
    rule: &AlertRule,
    values: &ValueMap,
) -> Option<FiredAlert> {
    let trigger = Trigger::parse(&rule.trigger)?;
    let value = values.get(&trigger.key)?;
    if !trigger.matches(value) {
        return None;
    }

    let label = profile
        .component(&trigger.key)
        .map(|c| c.label().to_owned())
        .unwrap_or_else(|| trigger.key.clone());

    Some(FiredAlert {
        key: trigger.key,
        label,
        action: rule.action,
        message: rule.message.clone(),
        trigger: rule.trigger.clone(),
        value: value.clone(),
    })
}

/// Critical rules derived from each component's `panic_low` / `panic_high`.
pub fn panic_rules(profile: &ProfileDefinition) -> Vec<AlertRule> {
    profile
        .components()
        .iter()
        .filter_map(|component| {
            let key = component.key()?;
            let validation = component.validation()?;
            Some((component, key, validation))
        })
        .flat_map(|(component, key, validation)| {
            let unit = unit_suffix(component);
            let low = validation.panic_low.map(|limit| AlertRule {
                trigger: format!("{{{key}}} < {limit}"),
                action: AlertAction::Critical,
                message: format!(
                    "Critical: {} below panic limit of {limit}{unit}",
                    component.label()
                ),
            });
            let high = validation.panic_high.map(|limit| AlertRule {
                trigger: format!("{{{key}}} > {limit}"),
                action: AlertAction::Critical,
                message: format!(
                    "Critical: {} above panic limit of {limit}{unit}",
                    component.label()
                ),
            });
            low.into_iter().chain(high)
        })
        .collect()
}

fn unit_suffix(component: &ProfileComponent) -> String {
    component
        .unit()
        .map(|u| format!(" {u}"))
        .unwrap_or_default()
}

/// Every alert that fires for `values`: the profile's own rules in declaration order, then
/// panic-threshold rules in component order.
pub fn check_alerts(profile: &ProfileDefinition, values: &ValueMap) -> Vec<FiredAlert> {
    let panic = panic_rules(profile);
    profile
        .alerts()
        .iter()
        .chain(panic.iter())
        .filter_map(|rule| check_rule(profile, rule, values))
        .collect()
}
