//! Declarative bean container: named [definitions](definition::BeanDefinition) describing how to
//! construct application objects, a [factory](factory::BeanFactory) resolving those definitions
//! into shared instances, and the lifecycle machinery around them.
//!
//! The container separates three phases. Definitions are first loaded into a
//! [registry](registry::BeanDefinitionRegistry) and may be freely rewritten by
//! [definition post-processors](processor::BeanFactoryPostProcessor). The factory then resolves
//! names into instances on demand: constructor arguments and properties are injected per the
//! definition's explicit plan, [instance post-processors](processor::BeanPostProcessor) wrap each
//! bean around its initialization, and singletons land in a shared cache. Finally, destruction
//! tears singletons down in reverse dependency order, invoking registered destroy callbacks.
//!
//! Beans referencing each other through setters may form cycles; the factory resolves those by
//! handing out early references to not-yet-initialized instances. Cycles requiring fully
//! constructed instances on both sides (constructor injection) are detected and reported instead.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wellspring_beans::definition::BeanDefinition;
//! use wellspring_beans::factory::BeanFactory;
//!
//! struct Logger;
//!
//! struct Service {
//!     logger: Arc<Logger>,
//! }
//!
//! # fn main() -> Result<(), wellspring_beans::error::BeanCreationError> {
//! let mut factory = BeanFactory::default();
//! factory.register_bean_definition(
//!     "logger",
//!     BeanDefinition::builder::<Logger>()
//!         .supplier(|_| Ok(Logger))
//!         .build(),
//! )?;
//! factory.register_bean_definition(
//!     "service",
//!     BeanDefinition::builder::<Service>()
//!         .constructor_ref("logger")
//!         .supplier(|args| {
//!             Ok(Service {
//!                 logger: args[0].clone().downcast::<Logger>().unwrap(),
//!             })
//!         })
//!         .build(),
//! )?;
//!
//! let service = factory.bean_typed::<Service>("service")?;
//! # let _ = &service.logger;
//! # Ok(())
//! # }
//! ```

pub mod definition;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod processor;
pub mod reader;
pub mod registry;
pub mod scope;
pub mod singleton;

pub use definition::{BeanDefinition, BeanPtr};
pub use factory::BeanFactory;
pub use registry::BeanDefinitionRegistry;
