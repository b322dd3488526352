//! The container core: resolves bean names into live instances. The [BeanFactory] looks up or
//! creates instances per scope, applies constructor and property injection, invokes lifecycle
//! callbacks, runs the instance-wrapping post-processor pipeline and caches singletons in a
//! [SingletonRegistry].
//!
//! The factory is single-threaded by construction: all operations take `&mut self`, so one
//! container naturally serializes all check-and-create sequences. Shared multi-threaded access
//! goes through one outer lock per container (the application context layer does exactly that),
//! which doubles as the serialization point between destruction and in-flight creation.

use crate::definition::{
    downcast_bean, BeanDefinition, BeanPtr, PropertyValue, ValueRef, FACTORY_BEAN_PREFIX,
    PROTOTYPE, SINGLETON,
};
use crate::definition::AutowireMode;
use crate::error::{convert_error, BeanCreationError, ErrorPtr};
use crate::processor::{
    BeanFactoryPostProcessorPtr, BeanPostProcessorPtr, InstanceWrap,
};
use crate::registry::BeanDefinitionRegistry;
use crate::scope::Scope;
use crate::singleton::SingletonRegistry;
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use std::any::{type_name, TypeId};
use std::sync::Arc;
use tracing::debug;

pub type ScopePtr = Box<dyn Scope + Send + Sync>;

/// Generic factory for bean instances, driven by the definitions in a
/// [BeanDefinitionRegistry].
pub struct BeanFactory {
    registry: BeanDefinitionRegistry,
    singletons: SingletonRegistry,
    merged_cache: FxHashMap<String, Arc<BeanDefinition>>,
    post_processors: Vec<BeanPostProcessorPtr>,
    custom_scopes: FxHashMap<String, ScopePtr>,
    factory_products: FxHashMap<String, BeanPtr>,
    prototypes_in_creation: FxHashSet<String>,
    creation_stack: Vec<String>,
}

impl Default for BeanFactory {
    fn default() -> Self {
        Self::new(BeanDefinitionRegistry::default())
    }
}

impl BeanFactory {
    pub fn new(registry: BeanDefinitionRegistry) -> Self {
        Self {
            registry,
            singletons: SingletonRegistry::default(),
            merged_cache: Default::default(),
            post_processors: vec![],
            custom_scopes: Default::default(),
            factory_products: Default::default(),
            prototypes_in_creation: Default::default(),
            creation_stack: vec![],
        }
    }

    pub fn registry(&self) -> &BeanDefinitionRegistry {
        &self.registry
    }

    /// Mutable definition access; invalidates merged views, so only meaningful before beans are
    /// created.
    pub fn registry_mut(&mut self) -> &mut BeanDefinitionRegistry {
        self.merged_cache.clear();
        &mut self.registry
    }

    /// Registers a definition, additionally rejecting names already bound to a manually
    /// registered singleton instance when overriding is disallowed.
    pub fn register_bean_definition<S: Into<String>>(
        &mut self,
        name: S,
        definition: BeanDefinition,
    ) -> Result<(), BeanCreationError> {
        let name = name.into();

        if self.singletons.contains(&name)
            && !self.registry.contains_bean_definition(&name)
            && !self.registry.allow_definition_overriding()
        {
            return Err(crate::error::BeanDefinitionRegistryError::SingletonAlreadyBound(name).into());
        }

        self.merged_cache.clear();
        self.registry.register_bean_definition(name, definition)?;
        Ok(())
    }

    /// Registers a manually supplied singleton instance, bypassing definitions.
    pub fn register_singleton<S: Into<String>>(
        &mut self,
        name: S,
        instance: BeanPtr,
    ) -> Result<(), BeanCreationError> {
        self.singletons.register_singleton(name, instance)
    }

    /// Registers a custom scope under the given name.
    pub fn register_scope<S: Into<String>>(&mut self, name: S, scope: ScopePtr) {
        self.custom_scopes.insert(name.into(), scope);
    }

    /// Adds an instance-wrapping post-processor; the pipeline is kept in precedence order.
    pub fn add_bean_post_processor(&mut self, processor: BeanPostProcessorPtr) {
        self.post_processors.push(processor);
        crate::processor::sort_by_precedence(&mut self.post_processors, |processor| {
            processor.order()
        });
    }

    /// Runs definition-mutating post-processors, in the order given, against the definition
    /// registry. Any failure aborts immediately.
    pub fn apply_bean_factory_post_processors(
        &mut self,
        processors: &[BeanFactoryPostProcessorPtr],
    ) -> Result<(), BeanCreationError> {
        for processor in processors {
            processor
                .post_process_definitions(&mut self.registry)
                .map_err(|cause| creation_failure("<definitions>", "definition post-processing", cause))?;
        }

        self.merged_cache.clear();
        Ok(())
    }

    /// Instantiates all eager singletons in registration order.
    pub fn pre_instantiate_singletons(&mut self) -> Result<(), BeanCreationError> {
        for name in self.registry.bean_definition_names() {
            let Some(definition) = self.merged_opt(&name)? else {
                continue;
            };

            if definition.is_abstract || definition.lazy_init || definition.scope != SINGLETON {
                continue;
            }

            self.bean(&name)?;
        }

        Ok(())
    }

    /// Central resolution operation: returns the bean registered under the given name, creating
    /// it (and anything it depends on) as necessary.
    pub fn bean(&mut self, name: &str) -> Result<BeanPtr, BeanCreationError> {
        self.do_get_bean(name, None)
    }

    /// Like [BeanFactory::bean], but overriding the definition's constructor arguments with the
    /// given values. Only meaningful for prototype-like creation paths.
    pub fn bean_with_args(
        &mut self,
        name: &str,
        args: Vec<BeanPtr>,
    ) -> Result<BeanPtr, BeanCreationError> {
        self.do_get_bean(name, Some(args))
    }

    /// Typed variant of [BeanFactory::bean], failing when the instance is not of the requested
    /// type.
    pub fn bean_typed<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<Arc<T>, BeanCreationError> {
        self.bean(name)
            .and_then(|instance| downcast_bean(name, instance))
    }

    /// Resolves the unique (or primary) bean of the given type.
    pub fn bean_of_type<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, BeanCreationError> {
        let name = self.type_candidate(TypeId::of::<T>(), type_name::<T>())?;
        self.bean_typed(&name)
    }

    /// Resolves all candidate beans of the given type, in registration order.
    pub fn beans_of_type<T: Send + Sync + 'static>(
        &mut self,
    ) -> Result<Vec<Arc<T>>, BeanCreationError> {
        self.registry
            .candidates_of_type(TypeId::of::<T>())
            .into_iter()
            .map(|(name, _)| self.bean_typed(&name))
            .try_collect()
    }

    /// Whether the name resolves to a definition or a manually registered singleton.
    pub fn contains_bean(&self, name: &str) -> bool {
        let canonical = self.registry.canonical_name(name);
        self.registry.contains_bean_definition(canonical) || self.singletons.contains(canonical)
    }

    pub fn is_singleton(&mut self, name: &str) -> Result<bool, BeanCreationError> {
        let canonical = self.registry.canonical_name(name).to_string();
        if let Some(definition) = self.merged_opt(&canonical)? {
            return Ok(definition.scope == SINGLETON);
        }
        Ok(self.singletons.contains(&canonical))
    }

    /// Completed singleton names in creation order.
    pub fn singleton_names(&self) -> Vec<String> {
        self.singletons.singleton_names()
    }

    /// Destroys all cached singletons in reverse dependency order. Idempotent.
    pub fn destroy_singletons(&mut self) {
        debug!("Destroying singletons");
        self.factory_products.clear();
        self.singletons.destroy_singletons();
    }

    fn do_get_bean(
        &mut self,
        name: &str,
        explicit_args: Option<Vec<BeanPtr>>,
    ) -> Result<BeanPtr, BeanCreationError> {
        let (lookup, factory_deref) = match name.strip_prefix(FACTORY_BEAN_PREFIX) {
            Some(rest) => (rest, true),
            None => (name, false),
        };
        let canonical = self.registry.canonical_name(lookup).to_string();

        // fast path for cached (or early-exposed) singletons
        if explicit_args.is_none() {
            if let Some(instance) = self.singletons.singleton(&canonical, true) {
                let definition = self.merged_opt(&canonical)?;
                return self.unwrap_factory_product(
                    &canonical,
                    definition.as_deref(),
                    factory_deref,
                    instance,
                );
            }
        }

        let merged = self.merged(&canonical)?;
        if merged.is_abstract {
            return Err(BeanCreationError::AbstractDefinition(canonical));
        }

        for dep in &merged.depends_on {
            let dep = self.registry.canonical_name(dep).to_string();
            if self.singletons.is_dependent(&canonical, &dep) {
                return Err(BeanCreationError::CircularDependency {
                    cycle: vec![canonical.clone(), dep.clone(), canonical.clone()],
                });
            }
            self.singletons.register_dependent(&dep, &canonical);
            self.bean(&dep)?;
        }

        match merged.scope.as_str() {
            SINGLETON => {
                // depends-on resolution may already have created this bean
                if let Some(instance) = self.singletons.singleton(&canonical, true) {
                    return self.unwrap_factory_product(
                        &canonical,
                        Some(&merged),
                        factory_deref,
                        instance,
                    );
                }

                if let Err(error) = self.singletons.begin_creation(&canonical) {
                    return Err(match error {
                        BeanCreationError::CurrentlyInCreation(_) => {
                            BeanCreationError::CircularDependency {
                                cycle: self.cycle_through(&canonical),
                            }
                        }
                        other => other,
                    });
                }

                self.creation_stack.push(canonical.clone());
                let created = self.create_bean(&canonical, &merged, explicit_args.as_deref());
                self.creation_stack.pop();

                match created {
                    Ok(instance) => {
                        // identity policy: the earliest exposed reference is the reference of
                        // record, so a later replacement would leave other beans pointing at the
                        // raw object
                        if self.singletons.was_early_consumed(&canonical) {
                            if let Some(early) = self.singletons.early_reference(&canonical) {
                                if !Arc::ptr_eq(&early, &instance) {
                                    self.singletons.creation_failed(&canonical);
                                    return Err(creation_failure(
                                        &canonical,
                                        "after-initialization",
                                        convert_error(BeanCreationError::IllegalState(format!(
                                            "early reference to '{canonical}' escaped to other \
                                             beans but a post-processor replaced the instance \
                                             afterwards"
                                        ))),
                                    ));
                                }
                            }
                        }

                        self.singletons.complete(&canonical, instance.clone());
                        debug!("Created singleton bean '{canonical}'");
                        self.unwrap_factory_product(
                            &canonical,
                            Some(&merged),
                            factory_deref,
                            instance,
                        )
                    }
                    Err(error) => {
                        self.singletons.creation_failed(&canonical);
                        Err(error)
                    }
                }
            }
            PROTOTYPE => {
                if self.prototypes_in_creation.contains(&canonical) {
                    return Err(BeanCreationError::CircularDependency {
                        cycle: self.cycle_through(&canonical),
                    });
                }

                self.prototypes_in_creation.insert(canonical.clone());
                self.creation_stack.push(canonical.clone());
                let created = self.create_bean(&canonical, &merged, explicit_args.as_deref());
                self.creation_stack.pop();
                self.prototypes_in_creation.remove(&canonical);

                self.unwrap_factory_product(&canonical, Some(&merged), factory_deref, created?)
            }
            custom => {
                if !self.custom_scopes.contains_key(custom) {
                    return Err(BeanCreationError::UnrecognizedScope(custom.to_string()));
                }

                if let Some(instance) = self
                    .custom_scopes
                    .get(custom)
                    .and_then(|scope| scope.get(&canonical))
                {
                    return self.unwrap_factory_product(
                        &canonical,
                        Some(&merged),
                        factory_deref,
                        instance,
                    );
                }

                // scoped instances have no early-reference protocol, so a re-entrant request
                // for the same name is an unresolvable cycle
                if self.creation_stack.contains(&canonical) {
                    return Err(BeanCreationError::CircularDependency {
                        cycle: self.cycle_through(&canonical),
                    });
                }

                self.creation_stack.push(canonical.clone());
                let created = self.create_bean(&canonical, &merged, explicit_args.as_deref());
                self.creation_stack.pop();
                let instance = created?;

                if let Some(scope) = self.custom_scopes.get_mut(custom) {
                    scope.put(&canonical, instance.clone());
                }

                self.unwrap_factory_product(&canonical, Some(&merged), factory_deref, instance)
            }
        }
    }

    fn create_bean(
        &mut self,
        name: &str,
        definition: &BeanDefinition,
        explicit_args: Option<&[BeanPtr]>,
    ) -> Result<BeanPtr, BeanCreationError> {
        debug!("Creating bean '{name}'");

        let raw = self.instantiate(name, definition, explicit_args)?;

        // setter/field cycles resolve against the raw instance from here on
        if definition.scope == SINGLETON {
            self.singletons.expose_early(name, raw.clone());
        }

        self.populate_properties(name, definition, &raw)?;

        let mut instance = raw;
        let processors = self.post_processors.clone();

        for processor in &processors {
            match processor
                .before_initialization(name, instance.clone())
                .map_err(|cause| creation_failure(name, "before-initialization", cause))?
            {
                InstanceWrap::Replace(replacement) => instance = replacement,
                InstanceWrap::PassThrough => {}
            }
        }

        if let Some(init) = &definition.init {
            init(&instance).map_err(|cause| creation_failure(name, "initialization", cause))?;
        }

        for processor in &processors {
            match processor
                .after_initialization(name, instance.clone())
                .map_err(|cause| creation_failure(name, "after-initialization", cause))?
            {
                InstanceWrap::Replace(replacement) => instance = replacement,
                InstanceWrap::PassThrough => {}
            }
        }

        if definition.scope == SINGLETON {
            if let Some(destroy) = &definition.destroy {
                self.singletons
                    .register_disposable(name, instance.clone(), destroy.clone());
            }
        }

        Ok(instance)
    }

    fn instantiate(
        &mut self,
        name: &str,
        definition: &BeanDefinition,
        explicit_args: Option<&[BeanPtr]>,
    ) -> Result<BeanPtr, BeanCreationError> {
        let args = match explicit_args {
            Some(args) => args.to_vec(),
            None => {
                let mut args = Vec::with_capacity(definition.constructor_args.len());
                for value in &definition.constructor_args {
                    args.push(self.resolve_value(name, value)?);
                }
                args
            }
        };

        if let Some(factory_method) = &definition.factory_method {
            let factory_instance = self.bean(&factory_method.factory_bean)?;
            (factory_method.invoke)(&factory_instance, &args)
                .map_err(|cause| creation_failure(name, "instantiation", cause))
        } else if let Some(supplier) = &definition.supplier {
            supplier(&args).map_err(|cause| creation_failure(name, "instantiation", cause))
        } else {
            Err(BeanCreationError::InvalidDefinition {
                bean: name.to_string(),
                reason: "definition declares neither a supplier nor a factory method".to_string(),
            })
        }
    }

    fn populate_properties(
        &mut self,
        name: &str,
        definition: &BeanDefinition,
        instance: &BeanPtr,
    ) -> Result<(), BeanCreationError> {
        let mut values = definition.property_values.clone();

        match definition.autowire {
            AutowireMode::ByName => {
                for binding in &definition.setters {
                    if values.iter().any(|pv| pv.name == binding.property) {
                        continue;
                    }
                    if self.registry.is_in_use(&binding.property) {
                        values.push(PropertyValue {
                            name: binding.property.clone(),
                            value: ValueRef::Bean(binding.property.clone()),
                        });
                    }
                }
            }
            AutowireMode::ByType => {
                for binding in &definition.setters {
                    if values.iter().any(|pv| pv.name == binding.property) {
                        continue;
                    }
                    match self
                        .type_candidate(binding.dependency.type_id, binding.dependency.type_name)
                    {
                        Ok(candidate) => values.push(PropertyValue {
                            name: binding.property.clone(),
                            value: ValueRef::Bean(candidate),
                        }),
                        Err(BeanCreationError::NoSuchBeanDefinition(_)) => {}
                        Err(error) => return Err(error),
                    }
                }
            }
            AutowireMode::No | AutowireMode::Constructor => {}
        }

        for property in &values {
            let binding = definition
                .setters
                .iter()
                .find(|binding| binding.property == property.name)
                .ok_or_else(|| BeanCreationError::InvalidDefinition {
                    bean: name.to_string(),
                    reason: format!("no setter binding for property '{}'", property.name),
                })?;

            let value = self.resolve_value(name, &property.value)?;
            (binding.apply)(instance, value)
                .map_err(|cause| creation_failure(name, "property population", cause))?;
        }

        Ok(())
    }

    fn resolve_value(
        &mut self,
        dependent: &str,
        value: &ValueRef,
    ) -> Result<BeanPtr, BeanCreationError> {
        match value {
            ValueRef::Bean(bean_name) => {
                let canonical = self.registry.canonical_name(bean_name).to_string();
                self.singletons.register_dependent(&canonical, dependent);
                self.bean(&canonical)
            }
            ValueRef::Value(value) => Ok(value.clone()),
            ValueRef::Autowired(descriptor) => {
                let candidate = self.type_candidate(descriptor.type_id, descriptor.type_name)?;
                self.singletons.register_dependent(&candidate, dependent);
                self.bean(&candidate)
            }
        }
    }

    /// Selects the single injectable candidate of a type: the only one registered, or the unique
    /// one marked primary.
    fn type_candidate(
        &self,
        type_id: TypeId,
        requested: &str,
    ) -> Result<String, BeanCreationError> {
        let candidates = self.registry.candidates_of_type(type_id);

        match candidates.len() {
            0 => Err(BeanCreationError::NoSuchBeanDefinition(requested.to_string())),
            1 => Ok(candidates
                .into_iter()
                .map(|(name, _)| name)
                .next()
                .unwrap_or_default()),
            _ => {
                let primaries = candidates
                    .iter()
                    .filter(|(_, primary)| *primary)
                    .collect_vec();

                if primaries.len() == 1 {
                    Ok(primaries[0].0.clone())
                } else {
                    Err(BeanCreationError::NoUniqueBeanDefinition {
                        requested: requested.to_string(),
                        candidates: candidates.into_iter().map(|(name, _)| name).collect(),
                    })
                }
            }
        }
    }

    fn unwrap_factory_product(
        &mut self,
        name: &str,
        definition: Option<&BeanDefinition>,
        factory_deref: bool,
        instance: BeanPtr,
    ) -> Result<BeanPtr, BeanCreationError> {
        let cast = definition.and_then(|definition| definition.factory_bean);

        let Some(cast) = cast else {
            return if factory_deref {
                Err(BeanCreationError::NotAFactoryBean(name.to_string()))
            } else {
                Ok(instance)
            };
        };

        if factory_deref {
            return Ok(instance);
        }

        let factory = cast(&instance).ok_or_else(|| BeanCreationError::TypeMismatch {
            bean: name.to_string(),
            requested: "FactoryBean".to_string(),
        })?;

        let shared = definition
            .map(|definition| definition.scope == SINGLETON)
            .unwrap_or(false)
            && factory.is_singleton();

        if shared {
            if let Some(product) = self.factory_products.get(name) {
                return Ok(product.clone());
            }

            let product = factory
                .object()
                .map_err(|cause| creation_failure(name, "factory product creation", cause))?;
            self.factory_products.insert(name.to_string(), product.clone());
            Ok(product)
        } else {
            factory
                .object()
                .map_err(|cause| creation_failure(name, "factory product creation", cause))
        }
    }

    fn merged(&mut self, name: &str) -> Result<Arc<BeanDefinition>, BeanCreationError> {
        self.merged_opt(name)?
            .ok_or_else(|| BeanCreationError::NoSuchBeanDefinition(name.to_string()))
    }

    fn merged_opt(
        &mut self,
        name: &str,
    ) -> Result<Option<Arc<BeanDefinition>>, BeanCreationError> {
        if let Some(cached) = self.merged_cache.get(name) {
            return Ok(Some(cached.clone()));
        }

        if !self.registry.contains_bean_definition(name) {
            return Ok(None);
        }

        let merged = Arc::new(self.registry.merged_definition(name)?);
        self.merged_cache.insert(name.to_string(), merged.clone());
        Ok(Some(merged))
    }

    fn cycle_through(&self, name: &str) -> Vec<String> {
        let mut cycle = match self.creation_stack.iter().position(|entry| entry == name) {
            Some(position) => self.creation_stack[position..].to_vec(),
            None => vec![name.to_string()],
        };
        cycle.push(name.to_string());
        cycle
    }
}

fn creation_failure(bean: &str, phase: &'static str, cause: ErrorPtr) -> BeanCreationError {
    BeanCreationError::CreationFailure {
        bean: bean.to_string(),
        phase,
        cause,
    }
}

#[cfg(test)]
mod tests {
    use crate::definition::{BeanDefinition, BeanPtr, PROTOTYPE};
    use crate::error::BeanCreationError;
    use crate::factory::BeanFactory;
    use crate::processor::{BeanPostProcessor, InstanceWrap};
    use crate::scope::MapScope;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Logger;

    #[test]
    fn should_cache_singletons() {
        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition(
                "logger",
                BeanDefinition::builder::<Logger>()
                    .supplier(|_| Ok(Logger))
                    .build(),
            )
            .unwrap();

        let first = factory.bean("logger").unwrap();
        let second = factory.bean("logger").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_create_fresh_prototypes() {
        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition(
                "logger",
                BeanDefinition::builder::<Logger>()
                    .scope(PROTOTYPE)
                    .supplier(|_| Ok(Logger))
                    .build(),
            )
            .unwrap();

        let first = factory.bean("logger").unwrap();
        let second = factory.bean("logger").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_fail_for_missing_definition() {
        let mut factory = BeanFactory::default();
        assert!(matches!(
            factory.bean("missing").unwrap_err(),
            BeanCreationError::NoSuchBeanDefinition(_)
        ));
    }

    #[test]
    fn should_fail_for_abstract_definition() {
        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition(
                "template",
                BeanDefinition::template().build(),
            )
            .unwrap();

        assert!(matches!(
            factory.bean("template").unwrap_err(),
            BeanCreationError::AbstractDefinition(_)
        ));
    }

    #[test]
    fn should_fail_without_supplier() {
        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition("logger", BeanDefinition::builder::<Logger>().build())
            .unwrap();

        assert!(matches!(
            factory.bean("logger").unwrap_err(),
            BeanCreationError::InvalidDefinition { .. }
        ));
    }

    #[test]
    fn should_fail_for_unrecognized_scope() {
        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition(
                "logger",
                BeanDefinition::builder::<Logger>()
                    .scope("session")
                    .supplier(|_| Ok(Logger))
                    .build(),
            )
            .unwrap();

        assert!(matches!(
            factory.bean("logger").unwrap_err(),
            BeanCreationError::UnrecognizedScope(_)
        ));
    }

    #[test]
    fn should_cache_in_custom_scope() {
        let mut factory = BeanFactory::default();
        factory.register_scope("session", Box::<MapScope>::default());
        factory
            .register_bean_definition(
                "logger",
                BeanDefinition::builder::<Logger>()
                    .scope("session")
                    .supplier(|_| Ok(Logger))
                    .build(),
            )
            .unwrap();

        let first = factory.bean("logger").unwrap();
        let second = factory.bean("logger").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_report_cycle_through_custom_scope() {
        struct Node;

        let mut factory = BeanFactory::default();
        factory.register_scope("session", Box::<MapScope>::default());
        factory
            .register_bean_definition(
                "node",
                BeanDefinition::builder::<Node>()
                    .scope("session")
                    .constructor_ref("node")
                    .supplier(|_| Ok(Node))
                    .build(),
            )
            .unwrap();

        assert!(matches!(
            factory.bean("node").unwrap_err(),
            BeanCreationError::CircularDependency { .. }
        ));
    }

    #[test]
    fn should_resolve_type_candidates_through_primary() {
        struct Repo(#[allow(dead_code)] &'static str);

        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition(
                "first",
                BeanDefinition::builder::<Repo>()
                    .supplier(|_| Ok(Repo("first")))
                    .build(),
            )
            .unwrap();
        factory
            .register_bean_definition(
                "second",
                BeanDefinition::builder::<Repo>()
                    .primary()
                    .supplier(|_| Ok(Repo("second")))
                    .build(),
            )
            .unwrap();

        let primary = factory.bean_of_type::<Repo>().unwrap();
        assert_eq!(primary.0, "second");
        assert_eq!(factory.beans_of_type::<Repo>().unwrap().len(), 2);
    }

    #[test]
    fn should_fail_on_ambiguous_type_without_primary() {
        #[derive(Debug)]
        struct Repo;

        let mut factory = BeanFactory::default();
        for name in ["first", "second"] {
            factory
                .register_bean_definition(
                    name,
                    BeanDefinition::builder::<Repo>()
                        .supplier(|_| Ok(Repo))
                        .build(),
                )
                .unwrap();
        }

        assert!(matches!(
            factory.bean_of_type::<Repo>().unwrap_err(),
            BeanCreationError::NoUniqueBeanDefinition { .. }
        ));
    }

    #[test]
    fn should_run_post_processors_in_precedence_order() {
        struct Recorder {
            label: &'static str,
            seen: Arc<std::sync::Mutex<Vec<&'static str>>>,
            order: Option<i32>,
        }

        impl BeanPostProcessor for Recorder {
            fn before_initialization(
                &self,
                _bean_name: &str,
                _instance: BeanPtr,
            ) -> Result<InstanceWrap, crate::error::ErrorPtr> {
                self.seen.lock().unwrap().push(self.label);
                Ok(InstanceWrap::PassThrough)
            }

            fn order(&self) -> Option<i32> {
                self.order
            }
        }

        let seen = Arc::new(std::sync::Mutex::new(vec![]));
        let mut factory = BeanFactory::default();

        for (label, order) in [("unordered", None), ("late", Some(10)), ("early", Some(-10))] {
            factory.add_bean_post_processor(Arc::new(Recorder {
                label,
                seen: seen.clone(),
                order,
            }));
        }

        factory
            .register_bean_definition(
                "logger",
                BeanDefinition::builder::<Logger>()
                    .supplier(|_| Ok(Logger))
                    .build(),
            )
            .unwrap();
        factory.bean("logger").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["early", "late", "unordered"]);
    }

    #[test]
    fn should_abort_creation_on_init_failure() {
        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition(
                "logger",
                BeanDefinition::builder::<Logger>()
                    .supplier(|_| Ok(Logger))
                    .init(|_| {
                        Err(crate::error::convert_error(BeanCreationError::IllegalState(
                            "init failure".to_string(),
                        )))
                    })
                    .build(),
            )
            .unwrap();

        match factory.bean("logger").unwrap_err() {
            BeanCreationError::CreationFailure { bean, phase, .. } => {
                assert_eq!(bean, "logger");
                assert_eq!(phase, "initialization");
            }
            other => panic!("unexpected error: {other}"),
        }

        // failed creation can be retried
        assert!(factory.bean("logger").is_err());
    }

    #[test]
    fn should_pass_explicit_args_to_prototype() {
        struct Greeter(String);

        let mut factory = BeanFactory::default();
        factory
            .register_bean_definition(
                "greeter",
                BeanDefinition::builder::<Greeter>()
                    .scope(PROTOTYPE)
                    .supplier(|args| {
                        let name = args[0]
                            .downcast_ref::<String>()
                            .cloned()
                            .unwrap_or_default();
                        Ok(Greeter(name))
                    })
                    .build(),
            )
            .unwrap();

        let greeter = factory
            .bean_with_args("greeter", vec![Arc::new("world".to_string()) as BeanPtr])
            .unwrap();
        assert_eq!(greeter.downcast_ref::<Greeter>().unwrap().0, "world");
    }

    #[test]
    fn should_count_supplier_invocations_for_singletons() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut factory = BeanFactory::default();

        let supplier_counter = counter.clone();
        factory
            .register_bean_definition(
                "logger",
                BeanDefinition::builder::<Logger>()
                    .supplier(move |_| {
                        supplier_counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Logger)
                    })
                    .build(),
            )
            .unwrap();

        factory.bean("logger").unwrap();
        factory.bean("logger").unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
