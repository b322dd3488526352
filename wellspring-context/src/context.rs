//! Application context: a configured view over the bean container with an explicit lifecycle.
//!
//! A context starts inactive. [ApplicationContext::refresh] builds a fresh bean factory from the
//! configured blueprint, runs the definition post-processor pipeline, installs instance
//! post-processors declared among the definitions, eagerly instantiates singletons and announces
//! [ContextRefreshedEvent]. [ApplicationContext::close] tears singletons down in reverse
//! dependency order and announces [ContextClosedEvent]. Bean lookups are only served while the
//! context is active; lookups missing locally fall back to the parent context, when one exists.
//!
//! The context is the shared, thread-safe handle over the single-threaded factory: one internal
//! lock serializes factory access, and no ambient global context exists. Whoever needs the
//! context receives a handle explicitly.

use crate::config::ContextConfig;
use crate::env::{Environment, ProcessEnvPropertySource, PropertySource};
use crate::event::{
    ApplicationEvent, ApplicationListenerPtr, ContextClosedEvent, ContextRefreshedEvent,
    EventMulticaster,
};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};
use wellspring_beans::definition::{BeanDefinition, BeanPtr};
use wellspring_beans::error::{BeanCreationError, BeanDefinitionRegistryError, ErrorPtr};
use wellspring_beans::factory::BeanFactory;
use wellspring_beans::processor::{sort_by_precedence, BeanFactoryPostProcessorPtr};
use wellspring_beans::reader::BeanDefinitionReader;
use wellspring_beans::registry::BeanDefinitionRegistry;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ContextState {
    Inactive,
    Active,
    Closed,
}

#[derive(Error, Clone, Debug)]
pub enum ContextError {
    #[error("context '{id}' cannot serve the request in state {state:?}")]
    IllegalState { id: String, state: ContextState },
    #[error(transparent)]
    BeanCreation(#[from] BeanCreationError),
    #[error(transparent)]
    Registry(#[from] BeanDefinitionRegistryError),
    #[error("error delivering application event: {0}")]
    EventDelivery(ErrorPtr),
}

struct ContextInner {
    state: ContextState,
    factory: Option<BeanFactory>,
}

/// Thread-safe handle over a configured bean container with lifecycle management and event
/// publication. Built with an [ApplicationContextBuilder].
pub struct ApplicationContext {
    id: String,
    parent: Option<Arc<ApplicationContext>>,
    environment: Arc<Environment>,
    multicaster: Mutex<EventMulticaster>,
    registry: BeanDefinitionRegistry,
    seed_singletons: Vec<(String, BeanPtr)>,
    factory_post_processors: Vec<BeanFactoryPostProcessorPtr>,
    inner: Mutex<ContextInner>,
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ApplicationContext {
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ContextState {
        self.locked().state
    }

    pub fn parent(&self) -> Option<&Arc<ApplicationContext>> {
        self.parent.as_ref()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Registers a listener receiving all future events published through this context.
    pub fn add_listener(&self, listener: ApplicationListenerPtr) {
        self.locked_multicaster().add_listener(listener);
    }

    /// Activates the context: builds a fresh factory from the configured definitions, runs the
    /// post-processor pipelines, eagerly instantiates singletons and publishes
    /// [ContextRefreshedEvent]. Legal from the inactive state and from the active state (existing
    /// singletons are destroyed first), never after close. A failed refresh destroys partially
    /// created singletons and leaves the context inactive.
    pub fn refresh(&self) -> Result<(), ContextError> {
        let mut inner = self.locked();

        match inner.state {
            ContextState::Closed => {
                return Err(self.illegal_state(ContextState::Closed));
            }
            ContextState::Active => {
                info!("Re-refreshing active context '{}'", self.id);
                if let Some(mut factory) = inner.factory.take() {
                    factory.destroy_singletons();
                }
                inner.state = ContextState::Inactive;
            }
            ContextState::Inactive => {
                info!("Refreshing context '{}'", self.id);
            }
        }

        let mut factory = BeanFactory::new(self.registry.clone());
        if let Err(error) = self.initialize_factory(&mut factory) {
            factory.destroy_singletons();
            return Err(error);
        }

        inner.factory = Some(factory);
        inner.state = ContextState::Active;
        drop(inner);

        debug!("Context '{}' is active", self.id);
        self.publish_event(&ContextRefreshedEvent {
            context_id: self.id.clone(),
        })
    }

    /// Deactivates the context: destroys singletons in reverse dependency order and publishes
    /// [ContextClosedEvent]. Idempotent; closing a never-refreshed context only marks it closed.
    pub fn close(&self) {
        let mut inner = self.locked();

        match inner.state {
            ContextState::Closed => return,
            ContextState::Inactive => {
                inner.state = ContextState::Closed;
                return;
            }
            ContextState::Active => {
                info!("Closing context '{}'", self.id);
                if let Some(mut factory) = inner.factory.take() {
                    factory.destroy_singletons();
                }
                inner.state = ContextState::Closed;
            }
        }

        drop(inner);

        let event = ContextClosedEvent {
            context_id: self.id.clone(),
        };
        if let Err(error) = self.locked_multicaster().multicast(&event) {
            warn!("Error delivering close event for context '{}': {error}", self.id);
        }
    }

    /// Publishes an event to all registered listeners. Requires an active context.
    pub fn publish_event(&self, event: &dyn ApplicationEvent) -> Result<(), ContextError> {
        {
            let inner = self.locked();
            if inner.state != ContextState::Active {
                return Err(self.illegal_state(inner.state));
            }
        }

        self.locked_multicaster()
            .multicast(event)
            .map_err(ContextError::EventDelivery)
    }

    /// Resolves a bean by name, falling back to the parent context when no local definition
    /// exists.
    pub fn bean(&self, name: &str) -> Result<BeanPtr, ContextError> {
        let result = self.with_factory(|factory| factory.bean(name))?;
        match (result, &self.parent) {
            (Err(BeanCreationError::NoSuchBeanDefinition(_)), Some(parent)) => parent.bean(name),
            (result, _) => result.map_err(Into::into),
        }
    }

    /// Typed variant of [ApplicationContext::bean].
    pub fn bean_typed<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContextError> {
        let result = self.with_factory(|factory| factory.bean_typed::<T>(name))?;
        match (result, &self.parent) {
            (Err(BeanCreationError::NoSuchBeanDefinition(_)), Some(parent)) => {
                parent.bean_typed(name)
            }
            (result, _) => result.map_err(Into::into),
        }
    }

    /// Resolves the unique (or primary) bean of a type, falling back to the parent when no local
    /// candidate exists.
    pub fn bean_of_type<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContextError> {
        let result = self.with_factory(|factory| factory.bean_of_type::<T>())?;
        match (result, &self.parent) {
            (Err(BeanCreationError::NoSuchBeanDefinition(_)), Some(parent)) => {
                parent.bean_of_type()
            }
            (result, _) => result.map_err(Into::into),
        }
    }

    /// Whether this context or any ancestor can resolve the given name. Does not require an
    /// active state.
    pub fn contains_bean(&self, name: &str) -> bool {
        let local = {
            let inner = self.locked();
            match &inner.factory {
                Some(factory) => factory.contains_bean(name),
                None => self.registry.contains_bean_definition(self.registry.canonical_name(name)),
            }
        };

        local
            || self
                .parent
                .as_ref()
                .map(|parent| parent.contains_bean(name))
                .unwrap_or(false)
    }

    fn initialize_factory(&self, factory: &mut BeanFactory) -> Result<(), ContextError> {
        for (name, instance) in &self.seed_singletons {
            factory.register_singleton(name.clone(), instance.clone())?;
        }

        let mut processors = self.factory_post_processors.clone();
        sort_by_precedence(&mut processors, |processor| processor.order());
        factory.apply_bean_factory_post_processors(&processors)?;

        // definitions flagged as instance post-processors are created first and installed into
        // the pipeline before any other bean exists
        let flagged: Vec<_> = factory
            .registry()
            .bean_definition_names()
            .into_iter()
            .filter_map(|name| {
                factory
                    .registry()
                    .bean_definition(&name)
                    .ok()
                    .and_then(|definition| definition.post_processor)
                    .map(|cast| (name, cast))
            })
            .collect();

        for (name, cast) in flagged {
            let instance = factory.bean(&name)?;
            let processor = cast(&instance).ok_or_else(|| BeanCreationError::TypeMismatch {
                bean: name.clone(),
                requested: "BeanPostProcessor".to_string(),
            })?;

            debug!("Installing bean post-processor '{name}'");
            factory.add_bean_post_processor(processor);
        }

        factory.pre_instantiate_singletons()?;
        Ok(())
    }

    fn with_factory<R>(
        &self,
        operation: impl FnOnce(&mut BeanFactory) -> R,
    ) -> Result<R, ContextError> {
        let mut inner = self.locked();
        let state = inner.state;
        match inner.factory.as_mut() {
            Some(factory) if state == ContextState::Active => Ok(operation(factory)),
            _ => Err(self.illegal_state(state)),
        }
    }

    fn illegal_state(&self, state: ContextState) -> ContextError {
        ContextError::IllegalState {
            id: self.id.clone(),
            state,
        }
    }

    fn locked(&self) -> MutexGuard<'_, ContextInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn locked_multicaster(&self) -> MutexGuard<'_, EventMulticaster> {
        match self.multicaster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ApplicationContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// Collects definitions, singletons, listeners and property sources; [build] yields an inactive
/// [ApplicationContext].
///
/// [build]: ApplicationContextBuilder::build
pub struct ApplicationContextBuilder {
    id: Option<String>,
    allow_definition_overriding: bool,
    parent: Option<Arc<ApplicationContext>>,
    definitions: Vec<(String, BeanDefinition)>,
    aliases: Vec<(String, String)>,
    readers: Vec<Box<dyn BeanDefinitionReader>>,
    singletons: Vec<(String, BeanPtr)>,
    factory_post_processors: Vec<BeanFactoryPostProcessorPtr>,
    listeners: Vec<ApplicationListenerPtr>,
    property_sources: Vec<Box<dyn PropertySource>>,
    include_process_env: bool,
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self {
            id: None,
            allow_definition_overriding: false,
            parent: None,
            definitions: vec![],
            aliases: vec![],
            readers: vec![],
            singletons: vec![],
            factory_post_processors: vec![],
            listeners: vec![],
            property_sources: vec![],
            include_process_env: true,
        }
    }
}

impl ApplicationContextBuilder {
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Applies a [ContextConfig]: context id, optional logger installation, and inline properties
    /// as the highest-precedence property source.
    pub fn with_config(mut self, config: &ContextConfig) -> Self {
        self.id = Some(config.context_id.clone());

        if config.install_tracing_logger {
            crate::config::install_tracing_logger();
        }

        if !config.properties.is_empty() {
            self.property_sources.insert(
                0,
                Box::new(crate::env::MapPropertySource::new(config.properties.clone())),
            );
        }

        self
    }

    pub fn with_parent(mut self, parent: Arc<ApplicationContext>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_definition_overriding(mut self, allow: bool) -> Self {
        self.allow_definition_overriding = allow;
        self
    }

    pub fn with_definition<S: Into<String>>(
        mut self,
        name: S,
        definition: BeanDefinition,
    ) -> Self {
        self.definitions.push((name.into(), definition));
        self
    }

    pub fn with_alias<A: Into<String>, S: Into<String>>(mut self, alias: A, name: S) -> Self {
        self.aliases.push((alias.into(), name.into()));
        self
    }

    pub fn with_reader(mut self, reader: Box<dyn BeanDefinitionReader>) -> Self {
        self.readers.push(reader);
        self
    }

    pub fn with_singleton<S: Into<String>>(mut self, name: S, instance: BeanPtr) -> Self {
        self.singletons.push((name.into(), instance));
        self
    }

    pub fn with_factory_post_processor(
        mut self,
        processor: BeanFactoryPostProcessorPtr,
    ) -> Self {
        self.factory_post_processors.push(processor);
        self
    }

    pub fn with_listener(mut self, listener: ApplicationListenerPtr) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Appends a property source with lower precedence than previously added ones.
    pub fn with_property_source(mut self, source: Box<dyn PropertySource>) -> Self {
        self.property_sources.push(source);
        self
    }

    /// Controls whether process environment variables back the context environment as the
    /// lowest-precedence source. On by default.
    pub fn with_process_env(mut self, include: bool) -> Self {
        self.include_process_env = include;
        self
    }

    pub fn build(self) -> Result<ApplicationContext, ContextError> {
        let mut registry = BeanDefinitionRegistry::new(self.allow_definition_overriding);

        for reader in &self.readers {
            let count = reader.load_bean_definitions(&mut registry)?;
            debug!("Loaded {count} bean definitions from reader");
        }

        for (name, definition) in self.definitions {
            registry.register_bean_definition(name, definition)?;
        }

        for (alias, name) in self.aliases {
            registry.register_alias(alias, name)?;
        }

        let mut environment = Environment::default();
        for source in self.property_sources {
            environment.add_source(source);
        }
        if self.include_process_env {
            environment.add_source(Box::new(ProcessEnvPropertySource));
        }

        let mut multicaster = EventMulticaster::default();
        for listener in self.listeners {
            multicaster.add_listener(listener);
        }

        Ok(ApplicationContext {
            id: self.id.unwrap_or_else(|| "wellspring".to_string()),
            parent: self.parent,
            environment: Arc::new(environment),
            multicaster: Mutex::new(multicaster),
            registry,
            seed_singletons: self.singletons,
            factory_post_processors: self.factory_post_processors,
            inner: Mutex::new(ContextInner {
                state: ContextState::Inactive,
                factory: None,
            }),
        })
    }
}
