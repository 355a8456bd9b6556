//! Connector templates and definition validation.
//!
//! A [`ConnectorTemplate`] lists the arguments a connector kind understands.
//! [`ConnectorTemplate::validate`] is the only way to obtain a
//! [`BrokerDefinition`], so every broker constructor receives checked input.

use crate::model::{EntityDefinition, PolitenessConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Value kind of a template argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    String,
    Url,
    Integer,
    Boolean,
    Path,
    /// One of a fixed set of values
    Choice(Vec<String>),
}

impl ArgumentKind {
    /// Checks a raw value, returning a reason when it is malformed.
    fn check(&self, value: &str) -> Result<(), String> {
        match self {
            ArgumentKind::String | ArgumentKind::Path => Ok(()),
            ArgumentKind::Url => match value.split_once("://") {
                Some((scheme, rest))
                    if !scheme.is_empty()
                        && scheme
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
                        && !rest.is_empty() =>
                {
                    Ok(())
                }
                _ => Err(format!("'{value}' is not a valid URL")),
            },
            ArgumentKind::Integer => value
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("'{value}' is not an integer")),
            ArgumentKind::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err(format!("'{value}' is not a boolean")),
            },
            ArgumentKind::Choice(options) => {
                if options.iter().any(|o| o == value) {
                    Ok(())
                } else {
                    Err(format!("'{value}' is not one of [{}]", options.join(", ")))
                }
            }
        }
    }
}

/// Descriptor of one configuration argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub label: String,
    pub kind: ArgumentKind,
    pub required: bool,
    pub default: Option<String>,
}

impl Argument {
    pub fn required(name: &str, label: &str, kind: ArgumentKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, label: &str, kind: ArgumentKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, label, kind)
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// Configuration schema of one connector kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorTemplate {
    pub type_key: String,
    pub display_name: String,
    pub arguments: Vec<Argument>,
}

impl ConnectorTemplate {
    pub fn new(type_key: &str, display_name: &str, arguments: Vec<Argument>) -> Self {
        Self {
            type_key: type_key.to_string(),
            display_name: display_name.to_string(),
            arguments,
        }
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Validates a raw definition against this template.
    ///
    /// Pure: no I/O is performed. Defaults of absent optional arguments are
    /// filled in; properties the template does not know are carried along.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDefinition`] listing every violated constraint.
    pub fn validate(
        &self,
        definition: &EntityDefinition,
    ) -> Result<BrokerDefinition, InvalidDefinition> {
        let mut violations = Vec::new();

        if definition.type_key != self.type_key {
            violations.push(Violation::WrongType {
                expected: self.type_key.clone(),
                actual: definition.type_key.clone(),
            });
        }

        let mut properties = definition.properties.clone();
        for argument in &self.arguments {
            match definition
                .properties
                .get(&argument.name)
                .filter(|v| !v.trim().is_empty())
            {
                Some(value) => {
                    if let Err(reason) = argument.kind.check(value.trim()) {
                        violations.push(Violation::Malformed {
                            argument: argument.name.clone(),
                            reason,
                        });
                    }
                }
                None if argument.required => {
                    violations.push(Violation::Missing {
                        argument: argument.name.clone(),
                    });
                }
                None => {
                    if let Some(default) = &argument.default {
                        properties.insert(argument.name.clone(), default.clone());
                    }
                }
            }
        }

        if !violations.is_empty() {
            return Err(InvalidDefinition {
                type_key: self.type_key.clone(),
                violations,
            });
        }

        Ok(BrokerDefinition {
            type_key: self.type_key.clone(),
            label: definition.label.clone(),
            properties,
            politeness: definition.politeness.clone(),
        })
    }
}

/// One violated template constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    WrongType { expected: String, actual: String },
    Missing { argument: String },
    Malformed { argument: String, reason: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::WrongType { expected, actual } => {
                write!(f, "definition type '{actual}' does not match '{expected}'")
            }
            Violation::Missing { argument } => write!(f, "missing required argument '{argument}'"),
            Violation::Malformed { argument, reason } => {
                write!(f, "invalid value for '{argument}': {reason}")
            }
        }
    }
}

/// A definition rejected by its connector's template.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid {type_key} definition: {}", render(.violations))]
pub struct InvalidDefinition {
    pub type_key: String,
    pub violations: Vec<Violation>,
}

impl InvalidDefinition {
    /// Rejection discovered while a connector builds its broker.
    pub fn single(type_key: &str, argument: &str, reason: impl Into<String>) -> Self {
        Self {
            type_key: type_key.to_string(),
            violations: vec![Violation::Malformed {
                argument: argument.to_string(),
                reason: reason.into(),
            }],
        }
    }
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Definition that passed template validation.
///
/// Has no public constructor: it only comes out of
/// [`ConnectorTemplate::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerDefinition {
    type_key: String,
    label: Option<String>,
    properties: BTreeMap<String, String>,
    politeness: Option<PolitenessConfig>,
}

impl BrokerDefinition {
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, name: &str, fallback: &'a str) -> &'a str {
        self.get(name).unwrap_or(fallback)
    }

    /// Fetches an argument the template declared as required.
    pub fn require(&self, name: &str) -> Result<&str, InvalidDefinition> {
        self.get(name).ok_or_else(|| InvalidDefinition {
            type_key: self.type_key.clone(),
            violations: vec![Violation::Missing {
                argument: name.to_string(),
            }],
        })
    }

    /// Parses an optional argument; `Ok(None)` when absent.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, InvalidDefinition> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                InvalidDefinition::single(&self.type_key, name, format!("cannot parse '{raw}'"))
            }),
        }
    }

    pub fn politeness(&self) -> Option<&PolitenessConfig> {
        self.politeness.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> ConnectorTemplate {
        ConnectorTemplate::new(
            "TEST",
            "Test",
            vec![
                Argument::required("root", "Root folder", ArgumentKind::Path),
                Argument::required("host", "Host URL", ArgumentKind::Url),
                Argument::optional("depth", "Depth", ArgumentKind::Integer).with_default("3"),
                Argument::optional(
                    "mode",
                    "Mode",
                    ArgumentKind::Choice(vec!["fast".into(), "slow".into()]),
                ),
            ],
        )
    }

    #[test]
    fn test_valid_definition_gets_defaults() {
        let definition = EntityDefinition::new("TEST")
            .with_property("root", "/data")
            .with_property("host", "https://example.com");

        let valid = template().validate(&definition).unwrap();

        assert_eq!(valid.get("root"), Some("/data"));
        assert_eq!(valid.parse::<u32>("depth").unwrap(), Some(3));
        assert_eq!(valid.get("mode"), None);
        assert_eq!(valid.type_key(), "TEST");
    }

    #[test]
    fn test_reports_every_violation() {
        let definition = EntityDefinition::new("OTHER")
            .with_property("host", "not a url")
            .with_property("depth", "deep")
            .with_property("mode", "medium");

        let error = template().validate(&definition).unwrap_err();

        assert_eq!(error.violations.len(), 5);
        assert!(error.violations.contains(&Violation::Missing {
            argument: "root".to_string()
        }));
        assert!(matches!(error.violations[0], Violation::WrongType { .. }));
        let message = error.to_string();
        assert!(message.contains("root"));
        assert!(message.contains("host"));
        assert!(message.contains("depth"));
        assert!(message.contains("mode"));
    }

    #[test]
    fn test_blank_required_value_is_missing() {
        let definition = EntityDefinition::new("TEST")
            .with_property("root", "   ")
            .with_property("host", "ftp://mirror");

        let error = template().validate(&definition).unwrap_err();

        assert_eq!(
            error.violations,
            vec![Violation::Missing {
                argument: "root".to_string()
            }]
        );
    }

    #[test]
    fn test_url_kind() {
        assert!(ArgumentKind::Url.check("http://host/path").is_ok());
        assert!(ArgumentKind::Url.check("://host").is_err());
        assert!(ArgumentKind::Url.check("http://").is_err());
        assert!(ArgumentKind::Url.check("host.example.com").is_err());
    }

    #[test]
    fn test_politeness_is_carried_unmodified() {
        let politeness = PolitenessConfig {
            request_interval_ms: 250,
            ..PolitenessConfig::default()
        };
        let definition = EntityDefinition::new("TEST")
            .with_property("root", "/data")
            .with_property("host", "https://example.com")
            .with_politeness(politeness.clone());

        let valid = template().validate(&definition).unwrap();

        assert_eq!(valid.politeness(), Some(&politeness));
    }
}
