//! Application context layer over [wellspring_beans]: a thread-safe container handle with an
//! explicit lifecycle (inactive, active, closed), synchronous application events, an
//! environment abstraction with property sources and placeholder resolution, and file/env-based
//! configuration.
//!
//! # Example
//!
//! ```rust
//! use wellspring_beans::definition::BeanDefinition;
//! use wellspring_context::context::ApplicationContext;
//!
//! struct Greeter;
//!
//! # fn main() -> Result<(), wellspring_context::context::ContextError> {
//! let context = ApplicationContext::builder()
//!     .with_id("example")
//!     .with_definition(
//!         "greeter",
//!         BeanDefinition::builder::<Greeter>()
//!             .supplier(|_| Ok(Greeter))
//!             .build(),
//!     )
//!     .build()?;
//!
//! context.refresh()?;
//! let greeter = context.bean_typed::<Greeter>("greeter")?;
//! context.close();
//! # let _ = greeter;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod env;
pub mod event;

pub use context::{ApplicationContext, ApplicationContextBuilder, ContextError, ContextState};
