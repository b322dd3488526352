//! Ordered post-processing hooks around the container. Two independent pipelines exist:
//! definition-mutating processors ([BeanFactoryPostProcessor]) run exactly once after all
//! definitions are loaded and before any instantiation, while instance-wrapping processors
//! ([BeanPostProcessor]) run around the initialization of every bean, every time one is created.
//!
//! Both pipelines sort by the same precedence rule: explicit order values ascending first, then
//! processors without an order in registration order. A failing processor aborts the surrounding
//! refresh or creation with its error surfaced.
//!
//! Definition-mutating processors receive only the mutable
//! [BeanDefinitionRegistry](crate::registry::BeanDefinitionRegistry), never the factory, so
//! triggering premature bean instantiation from one is not expressible.

use crate::definition::BeanPtr;
use crate::error::ErrorPtr;
use crate::registry::BeanDefinitionRegistry;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

pub type BeanFactoryPostProcessorPtr = Arc<dyn BeanFactoryPostProcessor + Send + Sync>;
pub type BeanPostProcessorPtr = Arc<dyn BeanPostProcessor + Send + Sync>;

/// Result of one instance-wrapping step: either keep the instance being processed, or substitute
/// a replacement exposing the same capability. The pipeline always feeds the latest substitution
/// into the next processor; proxying (AOP) plugs in here.
pub enum InstanceWrap {
    PassThrough,
    Replace(BeanPtr),
}

/// Hook mutating bean definitions before any bean is instantiated. Runs exactly once per
/// container refresh.
#[cfg_attr(test, automock)]
pub trait BeanFactoryPostProcessor: Send + Sync {
    fn post_process_definitions(
        &self,
        registry: &mut BeanDefinitionRegistry,
    ) -> Result<(), ErrorPtr>;

    /// Explicit precedence; processors without one run last, in registration order.
    fn order(&self) -> Option<i32> {
        None
    }
}

/// Hook wrapping bean instances around their initialization. Runs for every created bean, in
/// precedence order, before and after the init callback.
#[cfg_attr(test, automock)]
pub trait BeanPostProcessor: Send + Sync {
    fn before_initialization(
        &self,
        bean_name: &str,
        instance: BeanPtr,
    ) -> Result<InstanceWrap, ErrorPtr> {
        let _ = (bean_name, instance);
        Ok(InstanceWrap::PassThrough)
    }

    fn after_initialization(
        &self,
        bean_name: &str,
        instance: BeanPtr,
    ) -> Result<InstanceWrap, ErrorPtr> {
        let _ = (bean_name, instance);
        Ok(InstanceWrap::PassThrough)
    }

    /// Explicit precedence; processors without one run last, in registration order.
    fn order(&self) -> Option<i32> {
        None
    }
}

/// Stable sort by declared precedence: explicit order values ascending, unordered entries last in
/// their original relative order.
pub fn sort_by_precedence<T, F: Fn(&T) -> Option<i32>>(items: &mut [T], order_of: F) {
    items.sort_by_key(|item| {
        let order = order_of(item);
        (order.is_none(), order.unwrap_or(0))
    });
}
