//! Web deployment bootstrap: one root context per deployment unit, one child context per
//! dispatcher.
//!
//! A [DeploymentUnit] is the servlet-context equivalent: a named unit with string init
//! parameters and a shared attribute map. [ContextLoader] creates and refreshes the root
//! application context for a unit exactly once; a second initialization attempt records the
//! failure in the unit attributes and errors. [DispatcherBootstrap] then creates one child
//! context per dispatcher, parented to the root, so dispatcher-local beans can see shared root
//! beans but not vice versa.

use crate::config::DispatcherConfig;
use fxhash::FxHashMap;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};
use wellspring_beans::error::ErrorPtr;
use wellspring_context::context::{ApplicationContext, ContextError};

/// Init parameter naming the id of the root context.
pub const CONTEXT_ID_PARAM: &str = "contextId";

/// Init parameter naming the configuration location handed to the context factory.
pub const CONFIG_LOCATION_PARAM: &str = "contextConfigLocation";

/// Init parameter overriding the default child context namespace.
pub const NAMESPACE_PARAM: &str = "namespace";

/// Unit attribute under which the root context is stored.
pub const ROOT_CONTEXT_ATTRIBUTE: &str = "wellspring.web.context.root";

/// Unit attribute recording bootstrap failures, e.g. a duplicate initialization attempt.
pub const BOOTSTRAP_ERROR_ATTRIBUTE: &str = "wellspring.web.context.error";

/// Prefix of the unit attribute under which each dispatcher's child context is stored.
pub const DISPATCHER_CONTEXT_ATTRIBUTE_PREFIX: &str = "wellspring.web.context.dispatcher.";

#[derive(Error, Clone, Debug)]
pub enum WebBootstrapError {
    #[error("illegal bootstrap state: {0}")]
    IllegalState(String),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("context initializer failed: {0}")]
    Initializer(ErrorPtr),
}

type UnitAttributeMap = FxHashMap<String, Arc<dyn Any + Send + Sync>>;

/// The deployment environment a web application is installed into: a name, read-only init
/// parameters and a mutable attribute map shared by everything in the unit.
pub struct DeploymentUnit {
    name: String,
    init_params: FxHashMap<String, String>,
    attributes: Mutex<UnitAttributeMap>,
}

impl DeploymentUnit {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            init_params: Default::default(),
            attributes: Default::default(),
        }
    }

    pub fn with_init_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.init_params.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init_param(&self, key: &str) -> Option<&str> {
        self.init_params.get(key).map(String::as_str)
    }

    pub fn attribute<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.locked_attributes()
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn set_attribute<S: Into<String>>(&self, name: S, value: Arc<dyn Any + Send + Sync>) {
        self.locked_attributes().insert(name.into(), value);
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.locked_attributes().remove(name)
    }

    fn locked_attributes(&self) -> MutexGuard<'_, UnitAttributeMap> {
        match self.attributes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Builds an unrefreshed context for a deployment unit. The default factory produces an empty
/// context named after the unit; applications install their own factory to contribute bean
/// definitions.
pub type ContextFactory =
    Arc<dyn Fn(&DeploymentUnit) -> Result<ApplicationContext, ContextError> + Send + Sync>;

/// Programmatic hook run against the freshly built context before it is refreshed.
pub trait ContextInitializer: Send + Sync {
    fn initialize(
        &self,
        context: &ApplicationContext,
        unit: &DeploymentUnit,
    ) -> Result<(), ErrorPtr>;
}

/// Creates the shared root context of a deployment unit, exactly once.
pub struct ContextLoader {
    context_factory: ContextFactory,
    initializers: Vec<Arc<dyn ContextInitializer>>,
}

impl Default for ContextLoader {
    fn default() -> Self {
        Self {
            context_factory: Arc::new(|unit| {
                ApplicationContext::builder()
                    .with_id(
                        unit.init_param(CONTEXT_ID_PARAM)
                            .map(ToString::to_string)
                            .unwrap_or_else(|| format!("{}-root", unit.name())),
                    )
                    .build()
            }),
            initializers: vec![],
        }
    }
}

impl ContextLoader {
    pub fn with_context_factory(mut self, factory: ContextFactory) -> Self {
        self.context_factory = factory;
        self
    }

    pub fn with_initializer(mut self, initializer: Arc<dyn ContextInitializer>) -> Self {
        self.initializers.push(initializer);
        self
    }

    /// Builds, initializes and refreshes the root context, storing it as a unit attribute. A
    /// second call for the same unit records the error in the unit attributes and fails.
    pub fn initialize(
        &self,
        unit: &DeploymentUnit,
    ) -> Result<Arc<ApplicationContext>, WebBootstrapError> {
        if unit
            .attribute::<Arc<ApplicationContext>>(ROOT_CONTEXT_ATTRIBUTE)
            .is_some()
        {
            let error = WebBootstrapError::IllegalState(format!(
                "root context already initialized for deployment unit '{}'",
                unit.name()
            ));
            unit.set_attribute(BOOTSTRAP_ERROR_ATTRIBUTE, Arc::new(error.clone()));
            return Err(error);
        }

        info!("Initializing root context for deployment unit '{}'", unit.name());

        let context = Arc::new((self.context_factory)(unit)?);

        for initializer in &self.initializers {
            initializer
                .initialize(&context, unit)
                .map_err(WebBootstrapError::Initializer)?;
        }

        context.refresh()?;
        unit.set_attribute(ROOT_CONTEXT_ATTRIBUTE, Arc::new(context.clone()));
        Ok(context)
    }

    /// The root context previously stored for the unit, if initialization succeeded.
    pub fn root_context(unit: &DeploymentUnit) -> Option<Arc<ApplicationContext>> {
        unit.attribute::<Arc<ApplicationContext>>(ROOT_CONTEXT_ATTRIBUTE)
            .map(|context| (*context).clone())
    }

    /// Closes and removes the root context. A unit can not be re-initialized afterwards; the
    /// recorded attribute keeps the double-initialization protection in place.
    pub fn close(&self, unit: &DeploymentUnit) {
        if let Some(context) = Self::root_context(unit) {
            info!("Closing root context for deployment unit '{}'", unit.name());
            context.close();
        }
    }
}

/// Creates the child context of one dispatcher, parented to the unit's root context when one
/// exists.
pub struct DispatcherBootstrap {
    name: String,
    config: DispatcherConfig,
    context_factory: Option<ContextFactory>,
}

impl DispatcherBootstrap {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            config: DispatcherConfig::default(),
            context_factory: None,
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_context_factory(mut self, factory: ContextFactory) -> Self {
        self.context_factory = Some(factory);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The child context namespace: explicit config, then the unit init parameter, then the
    /// dispatcher name with a `-servlet` suffix.
    pub fn namespace(&self, unit: &DeploymentUnit) -> String {
        self.config
            .namespace
            .clone()
            .or_else(|| unit.init_param(NAMESPACE_PARAM).map(ToString::to_string))
            .unwrap_or_else(|| format!("{}-servlet", self.name))
    }

    /// Builds and refreshes the dispatcher's child context, storing it as a unit attribute.
    pub fn initialize(
        &self,
        unit: &DeploymentUnit,
    ) -> Result<Arc<ApplicationContext>, WebBootstrapError> {
        let attribute = self.context_attribute();
        if unit.attribute::<Arc<ApplicationContext>>(&attribute).is_some() {
            return Err(WebBootstrapError::IllegalState(format!(
                "dispatcher '{}' already initialized for deployment unit '{}'",
                self.name,
                unit.name()
            )));
        }

        let namespace = self.namespace(unit);
        debug!(
            "Initializing dispatcher '{}' with namespace '{namespace}'",
            self.name
        );

        let context = match &self.context_factory {
            Some(factory) => factory(unit)?,
            None => {
                let mut builder = ApplicationContext::builder().with_id(
                    self.config.context_id.clone().unwrap_or_else(|| namespace.clone()),
                );
                if let Some(root) = ContextLoader::root_context(unit) {
                    builder = builder.with_parent(root);
                }
                builder.build()?
            }
        };

        context.refresh()?;

        let context = Arc::new(context);
        unit.set_attribute(attribute, Arc::new(context.clone()));
        Ok(context)
    }

    /// Closes and removes the dispatcher's child context, leaving the root untouched.
    pub fn close(&self, unit: &DeploymentUnit) {
        if let Some(context) = unit
            .remove_attribute(&self.context_attribute())
            .and_then(|value| value.downcast::<Arc<ApplicationContext>>().ok())
        {
            debug!("Closing dispatcher context '{}'", self.name);
            context.close();
        }
    }

    fn context_attribute(&self) -> String {
        format!("{DISPATCHER_CONTEXT_ATTRIBUTE_PREFIX}{}", self.name)
    }
}
