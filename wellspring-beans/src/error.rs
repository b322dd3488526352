use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Type-erased error for failures originating in user code, e.g. bean constructors or lifecycle
/// callbacks. Kept behind an [Arc] so errors can be cloned together with the results they
/// poisoned.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Converts a concrete error into an [ErrorPtr].
pub fn convert_error<E: Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}

/// Errors related to registering and retrieving bean definitions and aliases.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum BeanDefinitionRegistryError {
    #[error("no bean definition found for name: {0}")]
    NotFound(String),
    #[error("a bean definition named '{0}' is already registered and overriding is disallowed")]
    DuplicateBeanName(String),
    #[error("bean name '{0}' is already bound to a registered singleton instance")]
    SingletonAlreadyBound(String),
    #[error("no alias registered under: {0}")]
    AliasNotFound(String),
    #[error("alias '{alias}' is already bound to '{existing}'")]
    AliasAlreadyBound { alias: String, existing: String },
    #[error("alias '{alias}' would shadow the bean name '{name}'")]
    AliasShadowsBeanName { alias: String, name: String },
    #[error("registering alias '{alias}' for '{name}' would create an alias cycle")]
    AliasCycle { alias: String, name: String },
    #[error("parent definition '{parent}' of bean '{name}' is not registered")]
    MissingParent { name: String, parent: String },
    #[error("parent chain of bean definition '{0}' contains a cycle")]
    ParentCycle(String),
}

/// Errors related to resolving bean names into live instances.
#[derive(Error, Clone, Debug)]
pub enum BeanCreationError {
    #[error("no such bean definition: {0}")]
    NoSuchBeanDefinition(String),
    #[error("no unique bean of type '{requested}' - {} candidates found with no single primary marked", candidates.len())]
    NoUniqueBeanDefinition {
        requested: String,
        candidates: Vec<String>,
    },
    #[error("error creating bean '{bean}' during {phase}: {cause}")]
    CreationFailure {
        bean: String,
        phase: &'static str,
        cause: ErrorPtr,
    },
    #[error("circular dependency requiring constructor injection: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
    #[error("bean '{0}' is currently in creation")]
    CurrentlyInCreation(String),
    #[error("cannot instantiate abstract bean definition: {0}")]
    AbstractDefinition(String),
    #[error("bean '{bean}' is not of the requested type: {requested}")]
    TypeMismatch { bean: String, requested: String },
    #[error("bean '{0}' is not a factory bean")]
    NotAFactoryBean(String),
    #[error("no scope registered under name: {0}")]
    UnrecognizedScope(String),
    #[error("bean definition for '{bean}' is malformed: {reason}")]
    InvalidDefinition { bean: String, reason: String },
    #[error("illegal container state: {0}")]
    IllegalState(String),
    #[error(transparent)]
    Registry(#[from] BeanDefinitionRegistryError),
}
