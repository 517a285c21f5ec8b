#![forbid(unsafe_code)]

//! Named transforms applied to submitted text before it is stored.
//!
//! The set is closed: configuration picks one of the variants below, nothing is compiled
//! from user-provided source.

use crate::ids::CollectionKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    #[default]
    Identity,
    /// `{value}` and `{type}` are substituted; `{{` and `}}` are literal braces.
    TemplateSubstitution { template: String },
    ExternalCall { endpoint: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformInput<'a> {
    pub type_name: &'a str,
    pub value: &'a str,
}

/// Client for `Transform::ExternalCall`.
pub trait TransformEndpoint {
    fn call(&self, endpoint: &str, input: TransformInput<'_>) -> Result<String, String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransformError {
    EmptyEndpoint,
    UnknownPlaceholder(String),
    UnbalancedBrace { index: usize },
    NoEndpointClient,
    Endpoint(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyEndpoint => f.write_str("external_call endpoint must not be empty"),
            Self::UnknownPlaceholder(name) => write!(f, "unknown template placeholder {{{name}}}"),
            Self::UnbalancedBrace { index } => write!(f, "unbalanced brace at byte {index}"),
            Self::NoEndpointClient => f.write_str("no endpoint client configured"),
            Self::Endpoint(message) => write!(f, "endpoint call failed: {message}"),
        }
    }
}

impl std::error::Error for TransformError {}

enum Segment<'a> {
    Literal(&'a str),
    Value,
    TypeName,
}

fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, TransformError> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                segments.push(Segment::Literal(&template[literal_start..i + 1]));
                i += 2;
                literal_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                segments.push(Segment::Literal(&template[literal_start..i + 1]));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let Some(close) = template[i + 1..].find('}') else {
                    return Err(TransformError::UnbalancedBrace { index: i });
                };
                segments.push(Segment::Literal(&template[literal_start..i]));
                let name = &template[i + 1..i + 1 + close];
                match name {
                    "value" => segments.push(Segment::Value),
                    "type" => segments.push(Segment::TypeName),
                    other => return Err(TransformError::UnknownPlaceholder(other.to_string())),
                }
                i += close + 2;
                literal_start = i;
            }
            b'}' => return Err(TransformError::UnbalancedBrace { index: i }),
            _ => i += 1,
        }
    }
    segments.push(Segment::Literal(&template[literal_start..]));
    Ok(segments)
}

impl Transform {
    pub fn validate(&self) -> Result<(), TransformError> {
        match self {
            Self::Identity => Ok(()),
            Self::TemplateSubstitution { template } => parse_template(template).map(|_| ()),
            Self::ExternalCall { endpoint } => {
                if endpoint.trim().is_empty() {
                    Err(TransformError::EmptyEndpoint)
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn apply(
        &self,
        input: TransformInput<'_>,
        endpoint_client: Option<&dyn TransformEndpoint>,
    ) -> Result<String, TransformError> {
        match self {
            Self::Identity => Ok(input.value.to_string()),
            Self::TemplateSubstitution { template } => {
                let mut out = String::with_capacity(template.len() + input.value.len());
                for segment in parse_template(template)? {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Value => out.push_str(input.value),
                        Segment::TypeName => out.push_str(input.type_name),
                    }
                }
                Ok(out)
            }
            Self::ExternalCall { endpoint } => {
                if endpoint.trim().is_empty() {
                    return Err(TransformError::EmptyEndpoint);
                }
                let client = endpoint_client.ok_or(TransformError::NoEndpointClient)?;
                client
                    .call(endpoint, input)
                    .map_err(TransformError::Endpoint)
            }
        }
    }
}

/// Transform per collection key; keys without an entry use `Identity`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformSet {
    by_key: BTreeMap<CollectionKey, Transform>,
}

impl TransformSet {
    pub fn insert(&mut self, key: CollectionKey, transform: Transform) {
        self.by_key.insert(key, transform);
    }

    pub fn for_key(&self, key: &CollectionKey) -> &Transform {
        const IDENTITY: &Transform = &Transform::Identity;
        self.by_key.get(key).unwrap_or(IDENTITY)
    }

    pub fn validate(&self) -> Result<(), (CollectionKey, TransformError)> {
        for (key, transform) in &self.by_key {
            transform.validate().map_err(|err| (key.clone(), err))?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl TransformEndpoint for Upper {
        fn call(&self, endpoint: &str, input: TransformInput<'_>) -> Result<String, String> {
            if endpoint == "down" {
                return Err("503".to_string());
            }
            Ok(input.value.to_uppercase())
        }
    }

    fn input(value: &str) -> TransformInput<'_> {
        TransformInput {
            type_name: "Workout",
            value,
        }
    }

    #[test]
    fn template_substitutes_known_placeholders() {
        let transform = Transform::TemplateSubstitution {
            template: "{type}: {value} {{done}}".to_string(),
        };
        assert_eq!(
            transform.apply(input("Bench press"), None).unwrap(),
            "Workout: Bench press {done}"
        );
    }

    #[test]
    fn template_rejects_unknown_or_unbalanced_placeholders() {
        let unknown = Transform::TemplateSubstitution {
            template: "{user}".to_string(),
        };
        assert_eq!(
            unknown.validate().unwrap_err(),
            TransformError::UnknownPlaceholder("user".to_string())
        );
        let open = Transform::TemplateSubstitution {
            template: "x {value".to_string(),
        };
        assert_eq!(
            open.validate().unwrap_err(),
            TransformError::UnbalancedBrace { index: 2 }
        );
    }

    #[test]
    fn external_call_requires_a_client() {
        let transform = Transform::ExternalCall {
            endpoint: "https://example.invalid/upper".to_string(),
        };
        assert_eq!(
            transform.apply(input("x"), None).unwrap_err(),
            TransformError::NoEndpointClient
        );
        assert_eq!(transform.apply(input("squat"), Some(&Upper)).unwrap(), "SQUAT");

        let down = Transform::ExternalCall {
            endpoint: "down".to_string(),
        };
        assert_eq!(
            down.apply(input("x"), Some(&Upper)).unwrap_err(),
            TransformError::Endpoint("503".to_string())
        );
    }

    #[test]
    fn transform_set_is_configured_from_tagged_tables() {
        let set: TransformSet = serde_json::from_value(serde_json::json!({
            "workouts": { "kind": "template_substitution", "template": "[{value}]" },
            "goals": { "kind": "identity" }
        }))
        .expect("transform set");
        let workouts = CollectionKey::try_new("workouts").unwrap();
        let books = CollectionKey::try_new("books").unwrap();
        assert_eq!(
            set.for_key(&workouts).apply(input("row"), None).unwrap(),
            "[row]"
        );
        assert_eq!(set.for_key(&books), &Transform::Identity);
        assert!(set.validate().is_ok());
    }
}
