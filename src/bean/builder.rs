use super::declaration::{AnyInstance, BeanDeclaration, BeanId, BeanKind, Caster, InjectionPoint};
use super::factory::{BeanFactory, FnFactory, InjectionArgs};
use super::qualifier::{self, Qualifier};
use super::scope::Scope;
use super::types::BeanType;
use crate::intercept::InterceptorBinding;
use anyhow::anyhow;
use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Fluent construction of a [`BeanDeclaration`] for instances of `T`.
///
/// # Example
///
/// ```rust,ignore
/// let service = BeanBuilder::<OrderService>::class("order-service")
///     .scope(Scope::Singleton)
///     .inject(InjectionPoint::constructor(0, "repo", BeanType::of::<dyn OrderRepository>()))
///     .constructor(|args| Ok(OrderService { repo: args.arc("repo")? }))
///     .build();
/// ```
pub struct BeanBuilder<T> {
    id: BeanId,
    kind: BeanKind,
    bean_types: Vec<BeanType>,
    restricted_to: Option<Vec<BeanType>>,
    qualifiers: Vec<Qualifier>,
    scope: Scope,
    injection_points: Vec<InjectionPoint>,
    class_bindings: Vec<InterceptorBinding>,
    method_bindings: BTreeMap<String, Vec<InterceptorBinding>>,
    alternative: bool,
    priority: Option<i32>,
    default_bean: bool,
    vetoed: bool,
    viable_constructor: bool,
    declaring_bean: Option<BeanId>,
    casters: HashMap<TypeId, Caster>,
    factory: FnFactory<T>,
    custom_factory: Option<Arc<dyn BeanFactory>>,
}

impl<T: Send + Sync + 'static> BeanBuilder<T> {
    fn new(id: impl Into<BeanId>, kind: BeanKind) -> Self {
        let mut casters: HashMap<TypeId, Caster> = HashMap::new();
        casters.insert(
            TypeId::of::<T>(),
            Arc::new(|instance: &AnyInstance| {
                let typed = instance.clone().downcast::<T>().ok()?;
                Some(Box::new(typed) as Box<dyn Any + Send + Sync>)
            }),
        );
        casters.insert(
            TypeId::of::<dyn Any + Send + Sync>(),
            Arc::new(|instance: &AnyInstance| {
                Some(Box::new(instance.clone()) as Box<dyn Any + Send + Sync>)
            }),
        );
        Self {
            id: id.into(),
            kind,
            bean_types: vec![BeanType::of::<T>()],
            restricted_to: None,
            qualifiers: Vec::new(),
            scope: Scope::Dependent,
            injection_points: Vec::new(),
            class_bindings: Vec::new(),
            method_bindings: BTreeMap::new(),
            alternative: false,
            priority: None,
            default_bean: false,
            vetoed: false,
            viable_constructor: true,
            declaring_bean: None,
            casters,
            factory: FnFactory::default(),
            custom_factory: None,
        }
    }

    pub fn class(id: impl Into<BeanId>) -> Self {
        Self::new(id, BeanKind::Class)
    }

    /// A bean produced by a method of the bean `declaring`.
    pub fn producer_method(id: impl Into<BeanId>, declaring: impl Into<BeanId>) -> Self {
        let mut builder = Self::new(id, BeanKind::ProducerMethod);
        builder.declaring_bean = Some(declaring.into());
        builder
    }

    /// A bean read from a field of the bean `declaring`.
    pub fn producer_field(id: impl Into<BeanId>, declaring: impl Into<BeanId>) -> Self {
        let mut builder = Self::new(id, BeanKind::ProducerField);
        builder.declaring_bean = Some(declaring.into());
        builder
    }

    /// A bean with no declaring class; it must supply its own callbacks.
    pub fn synthetic(id: impl Into<BeanId>) -> Self {
        Self::new(id, BeanKind::Synthetic)
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.qualifier(Qualifier::named(name))
    }

    /// Make the bean injectable as `U`, typically a trait object it implements.
    pub fn expose<U, F>(mut self, caster: F) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.bean_types.push(BeanType::of::<U>());
        self.casters.insert(
            TypeId::of::<U>(),
            Arc::new(move |instance: &AnyInstance| {
                let typed = instance.clone().downcast::<T>().ok()?;
                Some(Box::new(caster(typed)) as Box<dyn Any + Send + Sync>)
            }),
        );
        self
    }

    /// Add a metadata-only bean type, used for matching but not for casting.
    pub fn bean_type(mut self, bean_type: BeanType) -> Self {
        if !self.bean_types.contains(&bean_type) {
            self.bean_types.push(bean_type);
        }
        self
    }

    /// Restrict the bean types to the given subset of the declared ones.
    pub fn typed<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = BeanType>,
    {
        self.restricted_to = Some(types.into_iter().collect());
        self
    }

    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Yield to any other bean with a matching type and qualifiers.
    pub fn default_bean(mut self) -> Self {
        self.default_bean = true;
        self
    }

    pub fn vetoed(mut self) -> Self {
        self.vetoed = true;
        self
    }

    pub fn no_viable_constructor(mut self) -> Self {
        self.viable_constructor = false;
        self
    }

    pub fn inject(mut self, injection_point: InjectionPoint) -> Self {
        self.injection_points.push(injection_point);
        self
    }

    /// Field injection point for `U` with default qualifiers.
    pub fn inject_field<U: ?Sized + 'static>(self, name: impl Into<String>) -> Self {
        self.inject(InjectionPoint::field(name, BeanType::of::<U>()))
    }

    /// Next constructor parameter of type `U`.
    pub fn inject_param<U: ?Sized + 'static>(self, name: impl Into<String>) -> Self {
        let position = self
            .injection_points
            .iter()
            .filter(|ip| ip.target().rank() == 0)
            .count();
        self.inject(InjectionPoint::constructor(position, name, BeanType::of::<U>()))
    }

    pub fn interceptor_binding(mut self, binding: InterceptorBinding) -> Self {
        self.class_bindings.push(binding);
        self
    }

    /// A binding that only applies to invocations of `method`.
    pub fn method_binding(mut self, method: impl Into<String>, binding: InterceptorBinding) -> Self {
        self.method_bindings
            .entry(method.into())
            .or_default()
            .push(binding);
        self
    }

    pub fn constructor<F>(mut self, construct: F) -> Self
    where
        F: Fn(&InjectionArgs) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.factory.construct = Some(Box::new(construct));
        self
    }

    /// Producer body, called with the declaring bean's instance.
    pub fn produces<D, F>(mut self, produce: F) -> Self
    where
        D: Send + Sync + 'static,
        F: Fn(&D, &InjectionArgs) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.factory.construct = Some(Box::new(move |args: &InjectionArgs| {
            let declaring = args.declaring::<D>()?;
            produce(&declaring, args)
        }));
        self
    }

    /// Initializer method, run after construction and before post-construct.
    pub fn initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&T, &InjectionArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.factory.initializers.push(Box::new(initializer));
        self
    }

    pub fn post_construct<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.factory.post_construct.push(Box::new(hook));
        self
    }

    pub fn pre_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.factory.pre_destroy.push(Box::new(hook));
        self
    }

    /// Destruction callback of a synthetic bean.
    pub fn destroyer<F>(self, hook: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.pre_destroy(hook)
    }

    /// Disposer of a produced instance, called with the declaring bean's instance.
    pub fn disposer<D, F>(mut self, dispose: F) -> Self
    where
        D: Send + Sync + 'static,
        F: Fn(&T, &D) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.factory.disposer = Some(Box::new(move |instance: &T, declaring: Option<&AnyInstance>| {
            let declaring = declaring
                .ok_or_else(|| anyhow!("disposer of {} has no declaring instance", type_name::<T>()))?
                .clone()
                .downcast::<D>()
                .map_err(|_| anyhow!("declaring instance is not a {}", type_name::<D>()))?;
            dispose(instance, &declaring)
        }));
        self
    }

    /// Replace the closure-based factory with a custom implementation.
    pub fn factory(mut self, factory: Arc<dyn BeanFactory>) -> Self {
        self.custom_factory = Some(factory);
        self
    }

    pub fn build(self) -> BeanDeclaration {
        let declared_types = self.bean_types;
        let bean_types = match &self.restricted_to {
            Some(restricted) => declared_types
                .iter()
                .filter(|ty| restricted.contains(ty))
                .cloned()
                .collect(),
            None => declared_types.clone(),
        };

        let factory: Option<Arc<dyn BeanFactory>> = match self.custom_factory {
            Some(factory) => Some(factory),
            None if self.factory.construct.is_some() => Some(Arc::new(self.factory)),
            None => None,
        };

        let mut injection_points = self.injection_points;
        injection_points.sort_by_key(|ip| ip.target().rank());

        BeanDeclaration {
            id: self.id,
            kind: self.kind,
            implementation: type_name::<T>(),
            bean_types,
            declared_types,
            restricted_to: self.restricted_to,
            qualifiers: qualifier::normalize_bean_qualifiers(self.qualifiers),
            scope: self.scope,
            injection_points,
            class_bindings: self.class_bindings,
            method_bindings: self.method_bindings,
            alternative: self.alternative,
            priority: self.priority,
            default_bean: self.default_bean,
            vetoed: self.vetoed,
            viable_constructor: self.viable_constructor,
            declaring_bean: self.declaring_bean,
            factory,
            casters: self.casters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_exposed_type_can_be_cast() {
        let bean = BeanBuilder::<English>::class("english")
            .expose::<dyn Greeter, _>(|english| english)
            .constructor(|_| Ok(English))
            .build();

        assert!(bean.has_type(&BeanType::of::<dyn Greeter>()));
        let instance: AnyInstance = Arc::new(English);
        let greeter = bean.cast::<dyn Greeter>(&instance).unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(bean.cast::<String>(&instance).is_none());
    }

    #[test]
    fn test_typed_restricts_bean_types() {
        let bean = BeanBuilder::<English>::class("english")
            .expose::<dyn Greeter, _>(|english| english)
            .typed([BeanType::of::<dyn Greeter>()])
            .constructor(|_| Ok(English))
            .build();

        assert_eq!(bean.bean_types(), &[BeanType::of::<dyn Greeter>()]);
        assert!(!bean.has_type(&BeanType::of::<English>()));
        assert!(bean.has_declared_type(&BeanType::of::<English>()));
    }

    #[test]
    fn test_injection_points_are_ordered_constructor_field_initializer() {
        let bean = BeanBuilder::<English>::class("english")
            .inject(InjectionPoint::initializer("setup", 0, "late", BeanType::named("C")))
            .inject_field::<u8>("field")
            .inject_param::<u16>("first")
            .inject_param::<u32>("second")
            .constructor(|_| Ok(English))
            .build();

        let names: Vec<&str> = bean.injection_points().iter().map(|ip| ip.name()).collect();
        assert_eq!(names, ["first", "second", "field", "late"]);
        assert!(bean.validate().is_empty());
    }

    #[test]
    fn test_synthetic_bean_without_callback_is_invalid() {
        let bean = BeanBuilder::<English>::synthetic("synthetic").build();
        let errors = bean.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("missing its creation callback"));
    }

    #[test]
    fn test_producer_requires_declaring_bean_and_parameters_only() {
        let bean = BeanBuilder::<String>::producer_method("name", "config")
            .inject_field::<u8>("field")
            .produces(|_config: &English, _| Ok("x".to_string()))
            .build();
        let errors = bean.validate();
        assert!(errors.iter().any(|e| e.to_string().contains("parameter injection points")));
    }

    #[test]
    fn test_typed_outside_declared_types_is_invalid() {
        let bean = BeanBuilder::<English>::class("english")
            .typed([BeanType::named("Unrelated")])
            .constructor(|_| Ok(English))
            .build();
        let errors = bean.validate();
        assert!(errors.iter().any(|e| e.to_string().contains("typed()")));
    }
}
