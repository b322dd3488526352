//! Declarative metadata describing how to build beans. A [BeanDefinition] is the unit of
//! configuration consumed by the [BeanFactory](crate::factory::BeanFactory): it names the produced
//! type, selects a scope, lists dependencies and carries the explicit injection plan (constructor
//! argument values plus setter bindings) which replaces reflective property population.
//!
//! Definitions are assembled with a typed [BeanDefinitionBuilder], which erases user closures into
//! the shared function types used by the factory. Definitions stay mutable in the registry until
//! the first bean is created; the factory only ever works on merged, read-only views.

use crate::error::{BeanCreationError, ErrorPtr};
use crate::lifecycle::{DisposableBean, FactoryBean, InitializingBean};
use crate::processor::BeanPostProcessor;
use derivative::Derivative;
use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

/// Scope name under which a single shared instance is cached per container.
pub const SINGLETON: &str = "singleton";

/// Scope name under which every request creates a fresh instance owned by the caller.
pub const PROTOTYPE: &str = "prototype";

/// Prefix requesting the factory bean itself instead of its product.
pub const FACTORY_BEAN_PREFIX: &str = "&";

/// Type-erased, shared bean instance.
pub type BeanPtr = Arc<dyn Any + Send + Sync>;

/// Constructor for type-erased instances, receiving already-resolved argument values.
pub type BeanSupplier = Arc<dyn Fn(&[BeanPtr]) -> Result<BeanPtr, ErrorPtr> + Send + Sync>;

/// Applies one resolved value to one property of a bean instance.
pub type PropertySetter = Arc<dyn Fn(&BeanPtr, BeanPtr) -> Result<(), ErrorPtr> + Send + Sync>;

/// Init/destroy callback invoked on a type-erased instance.
pub type LifecycleCallback = Arc<dyn Fn(&BeanPtr) -> Result<(), ErrorPtr> + Send + Sync>;

/// Recovers the [FactoryBean] capability from a type-erased instance.
pub type FactoryBeanCast = fn(&BeanPtr) -> Option<Arc<dyn FactoryBean + Send + Sync>>;

/// Recovers the [BeanPostProcessor] capability from a type-erased instance.
pub type PostProcessorCast = fn(&BeanPtr) -> Option<Arc<dyn BeanPostProcessor + Send + Sync>>;

/// Downcasts a [BeanPtr] to a concrete type, reporting a typed failure.
pub fn downcast_bean<T: Send + Sync + 'static>(
    bean_name: &str,
    instance: BeanPtr,
) -> Result<Arc<T>, BeanCreationError> {
    instance
        .downcast::<T>()
        .map_err(|_| BeanCreationError::TypeMismatch {
            bean: bean_name.to_string(),
            requested: type_name::<T>().to_string(),
        })
}

/// Describes a dependency resolvable by type, used for constructor and by-type setter autowiring.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct TypeDescriptor {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

/// Source for an injected value: a reference to another bean, an inline value, or a dependency
/// resolved by type at creation time.
#[derive(Clone)]
pub enum ValueRef {
    Bean(String),
    Value(BeanPtr),
    Autowired(TypeDescriptor),
}

impl Debug for ValueRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueRef::Bean(name) => f.debug_tuple("Bean").field(name).finish(),
            ValueRef::Value(_) => f.write_str("Value(..)"),
            ValueRef::Autowired(descriptor) => {
                f.debug_tuple("Autowired").field(&descriptor.type_name).finish()
            }
        }
    }
}

/// A named property and the source of its value. Merging is per property name, with child
/// definitions overriding parent ones.
#[derive(Clone, Debug)]
pub struct PropertyValue {
    pub name: String,
    pub value: ValueRef,
}

/// One entry of the injection plan: which property, which dependency type, and how to apply a
/// resolved value to an instance.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct SetterBinding {
    pub property: String,
    pub dependency: TypeDescriptor,
    #[derivative(Debug = "ignore")]
    pub apply: PropertySetter,
}

/// Factory-bean/factory-method indirection: the product is created by invoking a method on
/// another, fully initialized bean.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct FactoryMethod {
    pub factory_bean: String,
    #[derivative(Debug = "ignore")]
    pub invoke: Arc<dyn Fn(&BeanPtr, &[BeanPtr]) -> Result<BeanPtr, ErrorPtr> + Send + Sync>,
}

/// Dependency resolution policy applied while creating a bean.
#[derive(Clone, Copy, Eq, PartialEq, Default, Debug)]
pub enum AutowireMode {
    /// Only explicitly configured values are injected.
    #[default]
    No,
    /// Setter bindings without an explicit value receive the bean registered under the property
    /// name, when one exists.
    ByName,
    /// Setter bindings without an explicit value receive the unique (or primary) bean of the
    /// declared dependency type, when one exists.
    ByType,
    /// Constructor arguments are resolved greedily by their declared type descriptors.
    Constructor,
}

/// Role hint for tooling: whether a definition belongs to the application, a supporting part of
/// a configuration, or container infrastructure.
#[derive(Clone, Copy, Eq, PartialEq, Default, Debug)]
pub enum BeanRole {
    #[default]
    Application,
    Support,
    Infrastructure,
}

/// Declarative recipe for building one bean.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct BeanDefinition {
    /// Name of the produced type, informational only.
    pub class_name: String,
    /// [TypeId] of the produced type, used for by-type candidate resolution.
    pub bean_type: TypeId,
    pub scope: String,
    pub lazy_init: bool,
    /// Abstract definitions are pure templates for child definitions and cannot be instantiated.
    pub is_abstract: bool,
    /// With multiple candidates of a type, the primary one wins single-instance requests.
    pub primary: bool,
    /// Whether this definition may satisfy by-type autowiring of other beans.
    pub autowire_candidate: bool,
    pub autowire: AutowireMode,
    pub role: BeanRole,
    /// Originating definition for inheritance-style overrides.
    pub parent: Option<String>,
    /// Beans guaranteed to be fully initialized before this one.
    pub depends_on: Vec<String>,
    pub constructor_args: Vec<ValueRef>,
    pub property_values: Vec<PropertyValue>,
    pub setters: Vec<SetterBinding>,
    #[derivative(Debug = "ignore")]
    pub supplier: Option<BeanSupplier>,
    pub factory_method: Option<FactoryMethod>,
    #[derivative(Debug = "ignore")]
    pub init: Option<LifecycleCallback>,
    #[derivative(Debug = "ignore")]
    pub destroy: Option<LifecycleCallback>,
    #[derivative(Debug = "ignore")]
    pub factory_bean: Option<FactoryBeanCast>,
    #[derivative(Debug = "ignore")]
    pub post_processor: Option<PostProcessorCast>,
}

impl BeanDefinition {
    /// Starts a builder for a definition producing `T`.
    pub fn builder<T: Send + Sync + 'static>() -> BeanDefinitionBuilder<T> {
        BeanDefinitionBuilder {
            definition: Self::empty(type_name::<T>().to_string(), TypeId::of::<T>()),
            _target: PhantomData,
        }
    }

    /// Starts a builder for an abstract template definition, which carries shared configuration
    /// for child definitions and produces nothing itself.
    pub fn template() -> BeanDefinitionBuilder<()> {
        let mut builder = Self::builder::<()>();
        builder.definition.is_abstract = true;
        builder.definition.class_name = "<template>".to_string();
        builder
    }

    fn empty(class_name: String, bean_type: TypeId) -> Self {
        Self {
            class_name,
            bean_type,
            scope: SINGLETON.to_string(),
            lazy_init: false,
            is_abstract: false,
            primary: false,
            autowire_candidate: true,
            autowire: AutowireMode::default(),
            role: BeanRole::default(),
            parent: None,
            depends_on: vec![],
            constructor_args: vec![],
            property_values: vec![],
            setters: vec![],
            supplier: None,
            factory_method: None,
            init: None,
            destroy: None,
            factory_bean: None,
            post_processor: None,
        }
    }

    /// Produces the resolved view of a child definition on top of its parent: scalar settings and
    /// construction come from the child when present, property values merge per name with the
    /// child overriding, and depends-on lists are concatenated.
    pub(crate) fn merged_with_parent(&self, parent: &BeanDefinition) -> BeanDefinition {
        let mut merged = self.clone();

        let mut property_values = parent.property_values.clone();
        for value in &self.property_values {
            if let Some(existing) = property_values.iter_mut().find(|pv| pv.name == value.name) {
                *existing = value.clone();
            } else {
                property_values.push(value.clone());
            }
        }
        merged.property_values = property_values;

        let mut setters = parent.setters.clone();
        for binding in &self.setters {
            if let Some(existing) = setters.iter_mut().find(|b| b.property == binding.property) {
                *existing = binding.clone();
            } else {
                setters.push(binding.clone());
            }
        }
        merged.setters = setters;

        let mut depends_on = parent.depends_on.clone();
        for dep in &self.depends_on {
            if !depends_on.contains(dep) {
                depends_on.push(dep.clone());
            }
        }
        merged.depends_on = depends_on;

        if merged.constructor_args.is_empty() {
            merged.constructor_args = parent.constructor_args.clone();
        }
        if merged.supplier.is_none() {
            merged.supplier = parent.supplier.clone();
        }
        if merged.factory_method.is_none() {
            merged.factory_method = parent.factory_method.clone();
        }
        if merged.init.is_none() {
            merged.init = parent.init.clone();
        }
        if merged.destroy.is_none() {
            merged.destroy = parent.destroy.clone();
        }

        merged
    }
}

/// Typed builder erasing user closures into the function types stored in a [BeanDefinition].
pub struct BeanDefinitionBuilder<T> {
    definition: BeanDefinition,
    _target: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> BeanDefinitionBuilder<T> {
    pub fn scope<S: Into<String>>(mut self, scope: S) -> Self {
        self.definition.scope = scope.into();
        self
    }

    pub fn lazy_init(mut self, lazy_init: bool) -> Self {
        self.definition.lazy_init = lazy_init;
        self
    }

    pub fn abstract_definition(mut self) -> Self {
        self.definition.is_abstract = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.definition.primary = true;
        self
    }

    pub fn autowire_candidate(mut self, candidate: bool) -> Self {
        self.definition.autowire_candidate = candidate;
        self
    }

    pub fn autowire(mut self, mode: AutowireMode) -> Self {
        self.definition.autowire = mode;
        self
    }

    pub fn role(mut self, role: BeanRole) -> Self {
        self.definition.role = role;
        self
    }

    pub fn parent<S: Into<String>>(mut self, parent: S) -> Self {
        self.definition.parent = Some(parent.into());
        self
    }

    pub fn depends_on<S: Into<String>, I: IntoIterator<Item = S>>(mut self, names: I) -> Self {
        self.definition
            .depends_on
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds a constructor argument referencing another bean by name.
    pub fn constructor_ref<S: Into<String>>(mut self, bean_name: S) -> Self {
        self.definition
            .constructor_args
            .push(ValueRef::Bean(bean_name.into()));
        self
    }

    /// Adds an inline constructor argument value.
    pub fn constructor_value<V: Send + Sync + 'static>(mut self, value: V) -> Self {
        self.definition
            .constructor_args
            .push(ValueRef::Value(Arc::new(value) as BeanPtr));
        self
    }

    /// Adds a constructor argument resolved by type at creation time.
    pub fn constructor_autowired<D: Send + Sync + 'static>(mut self) -> Self {
        self.definition
            .constructor_args
            .push(ValueRef::Autowired(TypeDescriptor::of::<D>()));
        self
    }

    /// Sets the constructor closure, receiving resolved argument values in declaration order.
    pub fn supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&[BeanPtr]) -> Result<T, ErrorPtr> + Send + Sync + 'static,
    {
        self.definition.supplier = Some(Arc::new(move |args| {
            supplier(args).map(|instance| Arc::new(instance) as BeanPtr)
        }));
        self
    }

    /// Routes instantiation through a method on another bean of type `FB`.
    pub fn factory_method<FB, S, F>(mut self, factory_bean: S, invoke: F) -> Self
    where
        FB: Send + Sync + 'static,
        S: Into<String>,
        F: Fn(&FB, &[BeanPtr]) -> Result<T, ErrorPtr> + Send + Sync + 'static,
    {
        self.definition.factory_method = Some(FactoryMethod {
            factory_bean: factory_bean.into(),
            invoke: Arc::new(move |factory, args| {
                let factory = factory
                    .downcast_ref::<FB>()
                    .ok_or_else(|| incompatible_instance::<FB>())?;
                invoke(factory, args).map(|instance| Arc::new(instance) as BeanPtr)
            }),
        });
        self
    }

    /// Adds a property value referencing another bean by name.
    pub fn property_ref<P: Into<String>, S: Into<String>>(mut self, property: P, bean_name: S) -> Self {
        self.definition.property_values.push(PropertyValue {
            name: property.into(),
            value: ValueRef::Bean(bean_name.into()),
        });
        self
    }

    /// Adds an inline property value.
    pub fn property_value<P: Into<String>, V: Send + Sync + 'static>(
        mut self,
        property: P,
        value: V,
    ) -> Self {
        self.definition.property_values.push(PropertyValue {
            name: property.into(),
            value: ValueRef::Value(Arc::new(value) as BeanPtr),
        });
        self
    }

    /// Declares how a property of this bean receives a dependency of type `D`. The binding is the
    /// setter half of the injection plan; values come from explicit property entries or from
    /// by-name/by-type autowiring.
    pub fn setter<D, P, F>(mut self, property: P, apply: F) -> Self
    where
        D: Send + Sync + 'static,
        P: Into<String>,
        F: Fn(&T, Arc<D>) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.definition.setters.push(SetterBinding {
            property: property.into(),
            dependency: TypeDescriptor::of::<D>(),
            apply: Arc::new(move |instance, value| {
                let target = instance
                    .downcast_ref::<T>()
                    .ok_or_else(|| incompatible_instance::<T>())?;
                let value = value
                    .downcast::<D>()
                    .map_err(|_| incompatible_instance::<D>())?;
                apply(target, value)
            }),
        });
        self
    }

    /// Sets a custom init callback, invoked after property population.
    pub fn init<F>(mut self, init: F) -> Self
    where
        F: Fn(&T) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.definition.init = Some(lifecycle_callback::<T, F>(init));
        self
    }

    /// Sets a custom destroy callback, invoked during container shutdown.
    pub fn destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&T) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.definition.destroy = Some(lifecycle_callback::<T, F>(destroy));
        self
    }

    /// Wires the init callback to the [InitializingBean] convention trait.
    pub fn initializing_bean(self) -> Self
    where
        T: InitializingBean,
    {
        self.init(T::after_properties_set)
    }

    /// Wires the destroy callback to the [DisposableBean] convention trait.
    pub fn disposable_bean(self) -> Self
    where
        T: DisposableBean,
    {
        self.destroy(T::destroy)
    }

    /// Marks the produced bean as a [FactoryBean]: requests for this definition's name yield the
    /// factory's product instead of the factory itself.
    pub fn factory_bean(mut self) -> Self
    where
        T: FactoryBean,
    {
        self.definition.factory_bean = Some(cast_factory_bean::<T>);
        self
    }

    /// Marks the produced bean as an instance-wrapping post-processor, installed into the factory
    /// during context refresh.
    pub fn bean_post_processor(mut self) -> Self
    where
        T: BeanPostProcessor,
    {
        self.definition.post_processor = Some(cast_post_processor::<T>);
        self
    }

    pub fn build(self) -> BeanDefinition {
        self.definition
    }
}

fn lifecycle_callback<T, F>(callback: F) -> LifecycleCallback
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> Result<(), ErrorPtr> + Send + Sync + 'static,
{
    Arc::new(move |instance| {
        let target = instance
            .downcast_ref::<T>()
            .ok_or_else(|| incompatible_instance::<T>())?;
        callback(target)
    })
}

fn cast_factory_bean<T: FactoryBean + Send + Sync + 'static>(
    instance: &BeanPtr,
) -> Option<Arc<dyn FactoryBean + Send + Sync>> {
    instance
        .clone()
        .downcast::<T>()
        .ok()
        .map(|factory| factory as Arc<dyn FactoryBean + Send + Sync>)
}

fn cast_post_processor<T: BeanPostProcessor + Send + Sync + 'static>(
    instance: &BeanPtr,
) -> Option<Arc<dyn BeanPostProcessor + Send + Sync>> {
    instance
        .clone()
        .downcast::<T>()
        .ok()
        .map(|processor| processor as Arc<dyn BeanPostProcessor + Send + Sync>)
}

fn incompatible_instance<T: 'static>() -> ErrorPtr {
    Arc::new(BeanCreationError::TypeMismatch {
        bean: "<instance>".to_string(),
        requested: type_name::<T>().to_string(),
    }) as ErrorPtr
}
