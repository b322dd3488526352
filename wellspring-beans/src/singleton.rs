//! Cache of singleton instances plus the bookkeeping making circular-dependency resolution safe.
//!
//! Every cached name owns one indirection cell which only moves forward:
//! in creation -> early-exposed -> ready -> destroyed. While a bean populates its properties, the
//! raw, not-yet-initialized instance sits in the cell as an early reference; a re-entrant lookup
//! for the same name receives that reference instead of starting a second construction.
//!
//! All mutation goes through a single [Mutex], so "is this name currently being created" is
//! checked and set atomically relative to "create and cache it", and destruction serializes
//! against in-flight creation through the same point.

use crate::definition::{BeanPtr, LifecycleCallback};
use crate::error::BeanCreationError;
use fxhash::{FxHashMap, FxHashSet};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Forward-only state of one singleton cache cell.
enum SingletonEntry {
    InCreation,
    Early(BeanPtr),
    Ready(BeanPtr),
    Destroyed,
}

struct DisposableEntry {
    name: String,
    instance: BeanPtr,
    destroy: LifecycleCallback,
}

#[derive(Default)]
struct SingletonCache {
    entries: FxHashMap<String, SingletonEntry>,
    /// Completion order; destruction walks it in reverse.
    creation_order: Vec<String>,
    /// Names whose early reference has been handed out to another bean.
    early_consumed: FxHashSet<String>,
    /// name -> names depending on it (via depends-on or injection), destroyed before it.
    dependents: FxHashMap<String, FxHashSet<String>>,
    disposables: Vec<DisposableEntry>,
}

/// Registry of fully and partially constructed singletons for one container.
#[derive(Default)]
pub struct SingletonRegistry {
    cache: Mutex<SingletonCache>,
}

impl SingletonRegistry {
    fn locked(&self) -> std::sync::MutexGuard<'_, SingletonCache> {
        // a poisoned cache means a panic mid-creation; propagate the inner state regardless
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a manually supplied singleton, bypassing bean definitions. The name transitions
    /// directly to ready.
    pub fn register_singleton<S: Into<String>>(
        &self,
        name: S,
        instance: BeanPtr,
    ) -> Result<(), BeanCreationError> {
        let name = name.into();
        let mut cache = self.locked();

        if cache.entries.contains_key(&name) {
            return Err(BeanCreationError::IllegalState(format!(
                "singleton '{name}' is already bound"
            )));
        }

        cache.entries.insert(name.clone(), SingletonEntry::Ready(instance));
        cache.creation_order.push(name);
        Ok(())
    }

    /// Returns the cached instance for a name. With `allow_early` set, a name under construction
    /// yields its early reference (and is recorded as consumed); otherwise only fully initialized
    /// singletons are returned.
    pub fn singleton(&self, name: &str, allow_early: bool) -> Option<BeanPtr> {
        let mut cache = self.locked();
        match cache.entries.get(name) {
            Some(SingletonEntry::Ready(instance)) => Some(instance.clone()),
            Some(SingletonEntry::Early(instance)) if allow_early => {
                let instance = instance.clone();
                cache.early_consumed.insert(name.to_string());
                Some(instance)
            }
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(self.locked().entries.get(name), Some(SingletonEntry::Ready(_)))
    }

    pub fn is_in_creation(&self, name: &str) -> bool {
        matches!(
            self.locked().entries.get(name),
            Some(SingletonEntry::InCreation | SingletonEntry::Early(_))
        )
    }

    /// Atomically checks and marks a name as in creation. Fails when the name is already being
    /// created (a constructor-injection cycle at the factory level) or was destroyed.
    pub fn begin_creation(&self, name: &str) -> Result<(), BeanCreationError> {
        let mut cache = self.locked();
        match cache.entries.get(name) {
            None => {
                cache
                    .entries
                    .insert(name.to_string(), SingletonEntry::InCreation);
                Ok(())
            }
            Some(SingletonEntry::InCreation | SingletonEntry::Early(_)) => {
                Err(BeanCreationError::CurrentlyInCreation(name.to_string()))
            }
            Some(SingletonEntry::Ready(_)) => Err(BeanCreationError::IllegalState(format!(
                "singleton '{name}' is already fully initialized"
            ))),
            Some(SingletonEntry::Destroyed) => Err(BeanCreationError::IllegalState(format!(
                "singleton '{name}' has been destroyed and cannot be recreated"
            ))),
        }
    }

    /// Exposes the raw instance of a name under construction for circular-dependency resolution.
    pub fn expose_early(&self, name: &str, instance: BeanPtr) {
        let mut cache = self.locked();
        if matches!(cache.entries.get(name), Some(SingletonEntry::InCreation)) {
            cache
                .entries
                .insert(name.to_string(), SingletonEntry::Early(instance));
        }
    }

    /// The currently exposed early reference, if any, without marking it consumed.
    pub fn early_reference(&self, name: &str) -> Option<BeanPtr> {
        match self.locked().entries.get(name) {
            Some(SingletonEntry::Early(instance)) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Whether the early reference of a name escaped into another bean.
    pub fn was_early_consumed(&self, name: &str) -> bool {
        self.locked().early_consumed.contains(name)
    }

    /// Finalizes a creation: the cell moves to ready and the name joins the creation order.
    pub fn complete(&self, name: &str, instance: BeanPtr) {
        let mut cache = self.locked();
        cache
            .entries
            .insert(name.to_string(), SingletonEntry::Ready(instance));
        if !cache.creation_order.iter().any(|existing| existing == name) {
            cache.creation_order.push(name.to_string());
        }
    }

    /// Rolls back a failed creation so the name can be retried.
    pub fn creation_failed(&self, name: &str) {
        let mut cache = self.locked();
        cache.entries.remove(name);
        cache.early_consumed.remove(name);
    }

    /// Records that `dependent` must be destroyed before `name`.
    pub fn register_dependent(&self, name: &str, dependent: &str) {
        let mut cache = self.locked();
        cache
            .dependents
            .entry(name.to_string())
            .or_default()
            .insert(dependent.to_string());
    }

    /// Whether `candidate` transitively depends on `name` through registered dependent edges.
    pub fn is_dependent(&self, name: &str, candidate: &str) -> bool {
        let cache = self.locked();
        let mut seen = FxHashSet::default();
        let mut stack = vec![name];

        while let Some(current) = stack.pop() {
            if !seen.insert(current.to_string()) {
                continue;
            }
            if let Some(dependents) = cache.dependents.get(current) {
                if dependents.contains(candidate) {
                    return true;
                }
                stack.extend(dependents.iter().map(String::as_str));
            }
        }

        false
    }

    /// Registers the destroy callback to run for a singleton during shutdown.
    pub fn register_disposable<S: Into<String>>(
        &self,
        name: S,
        instance: BeanPtr,
        destroy: LifecycleCallback,
    ) {
        self.locked().disposables.push(DisposableEntry {
            name: name.into(),
            instance,
            destroy,
        });
    }

    /// Names of completed singletons in creation order.
    pub fn singleton_names(&self) -> Vec<String> {
        self.locked().creation_order.clone()
    }

    /// Destroys all singletons: reverse creation order, with registered dependents of a bean
    /// destroyed before the bean itself. Callback failures are logged per bean and do not stop
    /// the remaining destruction. Repeated invocation is a no-op.
    pub fn destroy_singletons(&self) {
        let mut cache = self.locked();

        let mut disposables: FxHashMap<String, DisposableEntry> = cache
            .disposables
            .drain(..)
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        let dependents = std::mem::take(&mut cache.dependents);
        let order = std::mem::take(&mut cache.creation_order);

        for entry in cache.entries.values_mut() {
            *entry = SingletonEntry::Destroyed;
        }
        cache.early_consumed.clear();
        drop(cache);

        for name in order.iter().rev() {
            Self::destroy_bean(name, &mut disposables, &dependents);
        }

        // disposables for beans outside the creation order (defensively drained)
        let leftovers: Vec<_> = disposables.keys().cloned().collect();
        for name in leftovers {
            Self::destroy_bean(&name, &mut disposables, &dependents);
        }
    }

    fn destroy_bean(
        name: &str,
        disposables: &mut FxHashMap<String, DisposableEntry>,
        dependents: &FxHashMap<String, FxHashSet<String>>,
    ) {
        if let Some(names) = dependents.get(name) {
            for dependent in names {
                Self::destroy_bean(dependent, disposables, dependents);
            }
        }

        if let Some(entry) = disposables.remove(name) {
            debug!("Destroying singleton '{name}'");
            if let Err(error) = (entry.destroy)(&entry.instance) {
                warn!("Error destroying singleton '{name}': {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::definition::BeanPtr;
    use crate::error::BeanCreationError;
    use crate::singleton::SingletonRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn instance() -> BeanPtr {
        Arc::new(0i8) as BeanPtr
    }

    #[test]
    fn should_register_and_return_manual_singleton() {
        let registry = SingletonRegistry::default();
        registry.register_singleton("logger", instance()).unwrap();

        assert!(registry.contains("logger"));
        assert!(registry.singleton("logger", false).is_some());
        assert!(matches!(
            registry.register_singleton("logger", instance()).unwrap_err(),
            BeanCreationError::IllegalState(_)
        ));
    }

    #[test]
    fn should_expose_early_reference_only_while_in_creation() {
        let registry = SingletonRegistry::default();
        registry.begin_creation("service").unwrap();

        assert!(registry.singleton("service", true).is_none());

        let raw = instance();
        registry.expose_early("service", raw.clone());

        assert!(registry.singleton("service", false).is_none());
        let early = registry.singleton("service", true).unwrap();
        assert!(Arc::ptr_eq(&early, &raw));
        assert!(registry.was_early_consumed("service"));

        registry.complete("service", raw);
        assert!(registry.contains("service"));
    }

    #[test]
    fn should_reject_second_creation_of_same_name() {
        let registry = SingletonRegistry::default();
        registry.begin_creation("service").unwrap();

        assert!(matches!(
            registry.begin_creation("service").unwrap_err(),
            BeanCreationError::CurrentlyInCreation(_)
        ));
    }

    #[test]
    fn should_roll_back_failed_creation() {
        let registry = SingletonRegistry::default();
        registry.begin_creation("service").unwrap();
        registry.creation_failed("service");

        registry.begin_creation("service").unwrap();
    }

    #[test]
    fn should_not_recreate_destroyed_singleton() {
        let registry = SingletonRegistry::default();
        registry.begin_creation("service").unwrap();
        registry.complete("service", instance());
        registry.destroy_singletons();

        assert!(matches!(
            registry.begin_creation("service").unwrap_err(),
            BeanCreationError::IllegalState(_)
        ));
    }

    #[test]
    fn should_track_transitive_dependents() {
        let registry = SingletonRegistry::default();
        registry.register_dependent("logger", "service");
        registry.register_dependent("service", "controller");

        assert!(registry.is_dependent("logger", "service"));
        assert!(registry.is_dependent("logger", "controller"));
        assert!(!registry.is_dependent("controller", "logger"));
    }

    #[test]
    fn should_destroy_in_reverse_creation_order_with_dependents_first() {
        let registry = SingletonRegistry::default();
        let sequence = Arc::new(std::sync::Mutex::new(vec![]));
        let counter = Arc::new(AtomicUsize::new(0));

        for name in ["logger", "service"] {
            registry.begin_creation(name).unwrap();
            let bean = instance();
            registry.complete(name, bean.clone());

            let sequence = sequence.clone();
            let counter = counter.clone();
            let name = name.to_string();
            registry.register_disposable(
                name.clone(),
                bean,
                Arc::new(move |_| {
                    sequence.lock().unwrap().push(name.clone());
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }
        // service depends on logger
        registry.register_dependent("logger", "service");

        registry.destroy_singletons();
        registry.destroy_singletons();

        assert_eq!(*sequence.lock().unwrap(), vec!["service", "logger"]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn should_continue_destruction_after_callback_failure() {
        let registry = SingletonRegistry::default();
        let destroyed = Arc::new(AtomicUsize::new(0));

        for (name, fail) in [("a", false), ("b", true), ("c", false)] {
            registry.begin_creation(name).unwrap();
            let bean = instance();
            registry.complete(name, bean.clone());

            let destroyed = destroyed.clone();
            registry.register_disposable(
                name,
                bean,
                Arc::new(move |_| {
                    if fail {
                        Err(crate::error::convert_error(
                            BeanCreationError::IllegalState("destroy failure".to_string()),
                        ))
                    } else {
                        destroyed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );
        }

        registry.destroy_singletons();
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }
}
