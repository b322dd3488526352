//! Bean-to-container callback capabilities. A bean may opt into an init hook invoked after
//! property population ([InitializingBean]), a destroy hook invoked during shutdown
//! ([DisposableBean]), or declare itself a producer of another object ([FactoryBean]).
//!
//! The capabilities are wired into a definition through
//! [BeanDefinitionBuilder](crate::definition::BeanDefinitionBuilder); the container itself only
//! sees the type-erased callbacks stored there.

use crate::definition::BeanPtr;
use crate::error::ErrorPtr;
#[cfg(test)]
use mockall::automock;

/// Init hook invoked once all properties of a bean have been populated. Raising an error aborts
/// the creation of the bean.
pub trait InitializingBean {
    fn after_properties_set(&self) -> Result<(), ErrorPtr>;
}

/// Destroy hook invoked while the owning container shuts down. Errors are logged per bean and do
/// not stop destruction of the remaining beans.
pub trait DisposableBean {
    fn destroy(&self) -> Result<(), ErrorPtr>;
}

/// A bean whose managed product, not itself, is what callers receive when requesting its name.
/// Requesting the name with the `&` prefix returns the factory itself.
#[cfg_attr(test, automock)]
pub trait FactoryBean {
    /// Returns the product managed by this factory.
    fn object(&self) -> Result<BeanPtr, ErrorPtr>;

    /// Whether the product is shared. Shared products are created once and cached by the owning
    /// bean factory; non-shared products are created on every request.
    fn is_singleton(&self) -> bool {
        true
    }
}
