//! Seam between external definition sources and the
//! [BeanDefinitionRegistry](crate::registry::BeanDefinitionRegistry). Parsing concrete formats is
//! out of scope for this crate; a reader consumes whatever source it wraps and reports how many
//! definitions it loaded.

use crate::definition::BeanDefinition;
use crate::error::BeanDefinitionRegistryError;
use crate::registry::BeanDefinitionRegistry;

/// Loads bean definitions from some external representation into a registry.
pub trait BeanDefinitionReader {
    /// Registers all definitions from the wrapped source, returning the number loaded.
    fn load_bean_definitions(
        &self,
        registry: &mut BeanDefinitionRegistry,
    ) -> Result<usize, BeanDefinitionRegistryError>;
}

/// Reader over an in-memory collection of named definitions and aliases, mostly useful for
/// programmatic configuration and tests.
#[derive(Default)]
pub struct CollectionBeanDefinitionReader {
    definitions: Vec<(String, BeanDefinition)>,
    aliases: Vec<(String, String)>,
}

impl CollectionBeanDefinitionReader {
    pub fn with_definition<S: Into<String>>(
        mut self,
        name: S,
        definition: BeanDefinition,
    ) -> Self {
        self.definitions.push((name.into(), definition));
        self
    }

    /// Adds an `alias -> name` entry registered after all definitions.
    pub fn with_alias<A: Into<String>, S: Into<String>>(mut self, alias: A, name: S) -> Self {
        self.aliases.push((alias.into(), name.into()));
        self
    }
}

impl BeanDefinitionReader for CollectionBeanDefinitionReader {
    fn load_bean_definitions(
        &self,
        registry: &mut BeanDefinitionRegistry,
    ) -> Result<usize, BeanDefinitionRegistryError> {
        for (name, definition) in &self.definitions {
            registry.register_bean_definition(name.clone(), definition.clone())?;
        }

        for (alias, name) in &self.aliases {
            registry.register_alias(alias.clone(), name.clone())?;
        }

        Ok(self.definitions.len())
    }
}
