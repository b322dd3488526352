//! Registry of declarative [BeanDefinition]s, keyed by name, with alias resolution. The registry
//! stays mutable until the owning factory starts creating beans; from that point on the factory
//! only consults merged, read-only views.

use crate::definition::BeanDefinition;
use crate::error::BeanDefinitionRegistryError;
use fxhash::FxHashMap;
use std::any::TypeId;

/// Name-keyed storage for bean definitions plus the alias map. Aliases form an acyclic relation
/// resolving to a terminal canonical name.
#[derive(Clone, Debug)]
pub struct BeanDefinitionRegistry {
    definitions: FxHashMap<String, BeanDefinition>,
    registration_order: Vec<String>,
    aliases: FxHashMap<String, String>,
    allow_definition_overriding: bool,
}

impl Default for BeanDefinitionRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

impl BeanDefinitionRegistry {
    pub fn new(allow_definition_overriding: bool) -> Self {
        Self {
            definitions: Default::default(),
            registration_order: vec![],
            aliases: Default::default(),
            allow_definition_overriding,
        }
    }

    pub fn allow_definition_overriding(&self) -> bool {
        self.allow_definition_overriding
    }

    /// Registers a definition under the given name. Re-registering an existing name fails unless
    /// overriding is allowed; the replacement then takes the original registration slot.
    pub fn register_bean_definition<S: Into<String>>(
        &mut self,
        name: S,
        definition: BeanDefinition,
    ) -> Result<(), BeanDefinitionRegistryError> {
        let name = name.into();

        if self.definitions.contains_key(&name) {
            if !self.allow_definition_overriding {
                return Err(BeanDefinitionRegistryError::DuplicateBeanName(name));
            }
        } else {
            if self.aliases.contains_key(&name) {
                return Err(BeanDefinitionRegistryError::AliasShadowsBeanName {
                    alias: name.clone(),
                    name: self.aliases[&name].clone(),
                });
            }

            self.registration_order.push(name.clone());
        }

        self.definitions.insert(name, definition);
        Ok(())
    }

    /// Removes a definition, failing when the name is not registered.
    pub fn remove_bean_definition(
        &mut self,
        name: &str,
    ) -> Result<BeanDefinition, BeanDefinitionRegistryError> {
        self.definitions
            .remove(name)
            .map(|definition| {
                self.registration_order.retain(|existing| existing != name);
                definition
            })
            .ok_or_else(|| BeanDefinitionRegistryError::NotFound(name.to_string()))
    }

    /// Returns the raw (unmerged) definition registered under the given canonical name.
    pub fn bean_definition(
        &self,
        name: &str,
    ) -> Result<&BeanDefinition, BeanDefinitionRegistryError> {
        self.definitions
            .get(name)
            .ok_or_else(|| BeanDefinitionRegistryError::NotFound(name.to_string()))
    }

    pub fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Whether the name is taken, either by a definition or as an alias.
    pub fn is_in_use(&self, name: &str) -> bool {
        self.definitions.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Registers `alias` for the bean named `name`. Rejects aliases which would shadow an existing
    /// bean name (unless overriding is allowed), rebind an existing alias, or close a cycle in the
    /// alias relation.
    pub fn register_alias<A: Into<String>, S: Into<String>>(
        &mut self,
        alias: A,
        name: S,
    ) -> Result<(), BeanDefinitionRegistryError> {
        let alias = alias.into();
        let name = name.into();

        if alias == name {
            return Err(BeanDefinitionRegistryError::AliasCycle { alias, name });
        }

        if self.definitions.contains_key(&alias) && !self.allow_definition_overriding {
            return Err(BeanDefinitionRegistryError::AliasShadowsBeanName { alias, name });
        }

        if let Some(existing) = self.aliases.get(&alias) {
            if *existing != name && !self.allow_definition_overriding {
                return Err(BeanDefinitionRegistryError::AliasAlreadyBound {
                    alias,
                    existing: existing.clone(),
                });
            }
        }

        // walking from the target must not reach the alias being registered
        let mut current = name.clone();
        while let Some(next) = self.aliases.get(&current) {
            if *next == alias {
                return Err(BeanDefinitionRegistryError::AliasCycle { alias, name });
            }
            current = next.clone();
        }

        self.aliases.insert(alias, name);
        Ok(())
    }

    /// Removes an alias, failing when it is not registered. Definitions reachable through the
    /// alias are unaffected.
    pub fn remove_alias(&mut self, alias: &str) -> Result<(), BeanDefinitionRegistryError> {
        self.aliases
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| BeanDefinitionRegistryError::AliasNotFound(alias.to_string()))
    }

    /// Follows the alias chain to its terminal canonical name. Names without an alias entry are
    /// already canonical.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        while let Some(next) = self.aliases.get(current) {
            current = next;
        }
        current
    }

    /// All aliases resolving (directly or transitively) to the given canonical name.
    pub fn aliases_for(&self, name: &str) -> Vec<String> {
        self.aliases
            .keys()
            .filter(|alias| self.canonical_name(alias) == name)
            .cloned()
            .collect()
    }

    /// Definition names in registration order.
    pub fn bean_definition_names(&self) -> Vec<String> {
        self.registration_order.clone()
    }

    /// Names of non-abstract autowire candidates producing the given type, in registration order,
    /// paired with their primary flag.
    pub fn candidates_of_type(&self, type_id: TypeId) -> Vec<(String, bool)> {
        self.registration_order
            .iter()
            .filter_map(|name| {
                self.definitions.get(name).and_then(|definition| {
                    (definition.bean_type == type_id
                        && definition.autowire_candidate
                        && !definition.is_abstract)
                        .then(|| (name.clone(), definition.primary))
                })
            })
            .collect()
    }

    /// Resolves the merged view of a definition by folding it over its parent chain, child values
    /// overriding parent ones.
    pub fn merged_definition(
        &self,
        name: &str,
    ) -> Result<BeanDefinition, BeanDefinitionRegistryError> {
        let mut chain = vec![];
        let mut current_name = name.to_string();

        loop {
            let definition = self.definitions.get(&current_name).ok_or_else(|| {
                if chain.is_empty() {
                    BeanDefinitionRegistryError::NotFound(current_name.clone())
                } else {
                    BeanDefinitionRegistryError::MissingParent {
                        name: name.to_string(),
                        parent: current_name.clone(),
                    }
                }
            })?;

            chain.push(definition);

            match &definition.parent {
                Some(parent) => {
                    if chain.len() > self.definitions.len() {
                        return Err(BeanDefinitionRegistryError::ParentCycle(name.to_string()));
                    }
                    current_name = self.canonical_name(parent).to_string();
                }
                None => break,
            }
        }

        let mut remaining = chain.into_iter().rev();
        let mut resolved = match remaining.next() {
            Some(root) => root.clone(),
            None => return Err(BeanDefinitionRegistryError::NotFound(name.to_string())),
        };

        for child in remaining {
            resolved = child.merged_with_parent(&resolved);
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use crate::definition::BeanDefinition;
    use crate::error::BeanDefinitionRegistryError;
    use crate::registry::BeanDefinitionRegistry;

    struct Logger;
    struct Service;

    fn definition<T: Send + Sync + 'static>() -> BeanDefinition {
        BeanDefinition::builder::<T>().build()
    }

    #[test]
    fn should_register_and_get_definition() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition("logger", definition::<Logger>())
            .unwrap();

        assert!(registry.contains_bean_definition("logger"));
        assert!(registry.is_in_use("logger"));
        assert!(registry.bean_definition("logger").is_ok());
        assert_eq!(registry.bean_definition_names(), vec!["logger"]);
    }

    #[test]
    fn should_not_register_duplicate_name() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition("logger", definition::<Logger>())
            .unwrap();

        assert_eq!(
            registry
                .register_bean_definition("logger", definition::<Logger>())
                .unwrap_err(),
            BeanDefinitionRegistryError::DuplicateBeanName("logger".to_string())
        );
    }

    #[test]
    fn should_override_definition_when_allowed() {
        let mut registry = BeanDefinitionRegistry::new(true);
        registry
            .register_bean_definition("logger", definition::<Logger>())
            .unwrap();
        registry
            .register_bean_definition("logger", definition::<Service>())
            .unwrap();

        assert_eq!(registry.bean_definition_names().len(), 1);
    }

    #[test]
    fn should_fail_removing_missing_definition() {
        let mut registry = BeanDefinitionRegistry::default();
        assert_eq!(
            registry.remove_bean_definition("logger").unwrap_err(),
            BeanDefinitionRegistryError::NotFound("logger".to_string())
        );
    }

    #[test]
    fn should_resolve_alias_chains() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition("service", definition::<Service>())
            .unwrap();
        registry.register_alias("svc", "service").unwrap();
        registry.register_alias("the-service", "svc").unwrap();

        assert_eq!(registry.canonical_name("the-service"), "service");
        assert_eq!(registry.canonical_name("svc"), "service");
        assert!(registry.is_in_use("svc"));

        let mut aliases = registry.aliases_for("service");
        aliases.sort();
        assert_eq!(aliases, vec!["svc", "the-service"]);
    }

    #[test]
    fn should_reject_alias_cycle() {
        let mut registry = BeanDefinitionRegistry::default();
        registry.register_alias("b", "a").unwrap();

        assert!(matches!(
            registry.register_alias("a", "b").unwrap_err(),
            BeanDefinitionRegistryError::AliasCycle { .. }
        ));
        assert!(matches!(
            registry.register_alias("a", "a").unwrap_err(),
            BeanDefinitionRegistryError::AliasCycle { .. }
        ));
    }

    #[test]
    fn should_reject_alias_shadowing_bean_name() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition("service", definition::<Service>())
            .unwrap();

        assert!(matches!(
            registry.register_alias("service", "other").unwrap_err(),
            BeanDefinitionRegistryError::AliasShadowsBeanName { .. }
        ));
    }

    #[test]
    fn should_remove_alias_leaving_definition() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition("service", definition::<Service>())
            .unwrap();
        registry.register_alias("svc", "service").unwrap();

        registry.remove_alias("svc").unwrap();

        assert!(registry.contains_bean_definition("service"));
        assert!(!registry.is_in_use("svc"));
        assert_eq!(
            registry.remove_alias("svc").unwrap_err(),
            BeanDefinitionRegistryError::AliasNotFound("svc".to_string())
        );
    }

    #[test]
    fn should_merge_through_parent_chain() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition(
                "base",
                BeanDefinition::template()
                    .property_value("timeout", 5i64)
                    .build(),
            )
            .unwrap();
        registry
            .register_bean_definition(
                "service",
                BeanDefinition::builder::<Service>().parent("base").build(),
            )
            .unwrap();

        let merged = registry.merged_definition("service").unwrap();
        assert!(!merged.is_abstract);
        assert_eq!(merged.property_values.len(), 1);
    }

    #[test]
    fn should_fail_merging_with_missing_parent() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition(
                "service",
                BeanDefinition::builder::<Service>().parent("base").build(),
            )
            .unwrap();

        assert!(matches!(
            registry.merged_definition("service").unwrap_err(),
            BeanDefinitionRegistryError::MissingParent { .. }
        ));
    }

    #[test]
    fn should_detect_parent_cycle() {
        let mut registry = BeanDefinitionRegistry::default();
        registry
            .register_bean_definition(
                "a",
                BeanDefinition::builder::<Service>().parent("b").build(),
            )
            .unwrap();
        registry
            .register_bean_definition(
                "b",
                BeanDefinition::builder::<Service>().parent("a").build(),
            )
            .unwrap();

        assert!(matches!(
            registry.merged_definition("a").unwrap_err(),
            BeanDefinitionRegistryError::ParentCycle(_)
        ));
    }
}
