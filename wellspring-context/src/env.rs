//! Property resolution against an ordered list of sources, with `${key}` placeholder
//! substitution. The first source containing a key wins; placeholders may nest and may carry a
//! `:` separated default.

use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum PropertyResolutionError {
    #[error("required property not found: {0}")]
    MissingProperty(String),
    #[error("placeholder '${{{0}}}' could not be resolved")]
    UnresolvedPlaceholder(String),
    #[error("unclosed placeholder in: {0}")]
    UnclosedPlaceholder(String),
    #[error("property '{key}' value '{value}' cannot be parsed as {target}")]
    InvalidPropertyValue {
        key: String,
        value: String,
        target: &'static str,
    },
}

/// One named source of string properties.
#[cfg_attr(test, automock)]
pub trait PropertySource: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;
}

/// In-memory property source.
#[derive(Default)]
pub struct MapPropertySource {
    properties: FxHashMap<String, String>,
}

impl MapPropertySource {
    pub fn new<K: Into<String>, V: Into<String>, I: IntoIterator<Item = (K, V)>>(
        properties: I,
    ) -> Self {
        Self {
            properties: properties
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl PropertySource for MapPropertySource {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// Property source backed by process environment variables.
pub struct ProcessEnvPropertySource;

impl PropertySource for ProcessEnvPropertySource {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Ordered collection of property sources queried front to back.
#[derive(Default)]
pub struct Environment {
    sources: Vec<Box<dyn PropertySource>>,
}

impl Environment {
    /// Appends a source with lower precedence than all existing ones.
    pub fn add_source(&mut self, source: Box<dyn PropertySource>) {
        self.sources.push(source);
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.property(key))
    }

    pub fn required_property(&self, key: &str) -> Result<String, PropertyResolutionError> {
        self.property(key)
            .ok_or_else(|| PropertyResolutionError::MissingProperty(key.to_string()))
    }

    /// Parses a property into a concrete type; absent keys resolve to `None`.
    pub fn property_typed<T: FromStr>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PropertyResolutionError> {
        self.property(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| PropertyResolutionError::InvalidPropertyValue {
                        key: key.to_string(),
                        value,
                        target: std::any::type_name::<T>(),
                    })
            })
            .transpose()
    }

    /// Replaces `${key}` and `${key:default}` placeholders in the given text. Unresolvable
    /// placeholders without a default are left in place.
    pub fn resolve_placeholders(&self, text: &str) -> Result<String, PropertyResolutionError> {
        self.resolve(text, false)
    }

    /// Like [Environment::resolve_placeholders], but failing on any placeholder which resolves
    /// neither from the sources nor from a default.
    pub fn resolve_required_placeholders(
        &self,
        text: &str,
    ) -> Result<String, PropertyResolutionError> {
        self.resolve(text, true)
    }

    fn resolve(&self, text: &str, required: bool) -> Result<String, PropertyResolutionError> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = Self::closing_brace(after)
                .ok_or_else(|| PropertyResolutionError::UnclosedPlaceholder(text.to_string()))?;

            // nested placeholders resolve inside-out
            let inner = self.resolve(&after[..end], required)?;
            let (key, default) = match inner.split_once(':') {
                Some((key, default)) => (key.to_string(), Some(default.to_string())),
                None => (inner, None),
            };

            match self.property(&key).or(default) {
                Some(value) => result.push_str(&value),
                None if required => {
                    return Err(PropertyResolutionError::UnresolvedPlaceholder(key))
                }
                None => {
                    result.push_str("${");
                    result.push_str(&key);
                    result.push('}');
                }
            }

            rest = &after[end + 1..];
        }

        result.push_str(rest);
        Ok(result)
    }

    fn closing_brace(text: &str) -> Option<usize> {
        let mut depth = 0usize;
        let bytes = text.as_bytes();
        let mut index = 0;

        while index < bytes.len() {
            if bytes[index..].starts_with(b"${") {
                depth += 1;
                index += 2;
                continue;
            }
            if bytes[index] == b'}' {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
            }
            index += 1;
        }

        None
    }
}
