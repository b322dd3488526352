//! Custom bean scopes beyond the built-in [singleton](crate::definition::SINGLETON) and
//! [prototype](crate::definition::PROTOTYPE) policies, which the factory handles itself (the
//! singleton policy needs the early-reference protocol, the prototype policy needs none). A
//! custom scope decides when a cached instance is reused versus created afresh, e.g. tying
//! instance lifetime to a session or a request.
//!
//! Note: scope resolution happens at creation time, which can surprise when incompatible scopes
//! mix - a singleton depending on a shorter-lived bean captures whichever instance was current
//! when the singleton was created.

use crate::definition::BeanPtr;
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;

/// A container of bean instances with a custom reuse policy, registered in the factory under a
/// scope name which definitions can then reference.
#[cfg_attr(test, automock)]
pub trait Scope: Send + Sync {
    /// The instance cached for the given bean name, if this scope holds one.
    fn get(&self, bean_name: &str) -> Option<BeanPtr>;

    /// Stores an instance under the given bean name. A scope may ignore the instance if it does
    /// not cache.
    fn put(&mut self, bean_name: &str, instance: BeanPtr);

    /// Removes and returns the instance cached under the given bean name.
    fn remove(&mut self, bean_name: &str) -> Option<BeanPtr>;
}

/// Simple map-backed scope, reusing one instance per bean name until removed. Useful as the
/// building block for session-like scopes owned by an external lifecycle.
#[derive(Default)]
pub struct MapScope {
    instances: FxHashMap<String, BeanPtr>,
}

impl Scope for MapScope {
    #[inline]
    fn get(&self, bean_name: &str) -> Option<BeanPtr> {
        self.instances.get(bean_name).cloned()
    }

    #[inline]
    fn put(&mut self, bean_name: &str, instance: BeanPtr) {
        self.instances.insert(bean_name.to_string(), instance);
    }

    #[inline]
    fn remove(&mut self, bean_name: &str) -> Option<BeanPtr> {
        self.instances.remove(bean_name)
    }
}
