use super::declaration::{AnyInstance, BeanDeclaration};
use crate::context::ContextualInstance;
use crate::di::container::ContainerInner;
use crate::di::{BeanRef, ClientProxy, Container, ErasedProxy};
use crate::error::{CdiError, Result, UnsatisfiedReason};
use anyhow::anyhow;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// The opaque capability a bean's owner supplies to build and tear down instances.
///
/// Implementations may be closures ([`FnFactory`]), generated code from
/// `#[derive(Injectable)]`, or anything else. The engine only calls these hooks
/// in lifecycle order and never inspects the instance.
pub trait BeanFactory: Send + Sync {
    /// Allocate the instance from constructor parameters and field values.
    fn construct(&self, args: &InjectionArgs) -> anyhow::Result<AnyInstance>;

    /// Deliver initializer-method injection points after construction.
    fn inject(&self, _instance: &AnyInstance, _args: &InjectionArgs) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_construct(&self, _instance: &AnyInstance) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre_destroy(&self, _instance: &AnyInstance) -> anyhow::Result<()> {
        Ok(())
    }

    /// Producer counterpart of `pre_destroy`, given the declaring bean's instance.
    fn dispose(
        &self,
        _instance: &AnyInstance,
        _declaring: Option<&AnyInstance>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

type Construct<T> = Box<dyn Fn(&InjectionArgs) -> anyhow::Result<T> + Send + Sync>;
type Initializer<T> = Box<dyn Fn(&T, &InjectionArgs) -> anyhow::Result<()> + Send + Sync>;
type Hook<T> = Box<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;
type Disposer<T> = Box<dyn Fn(&T, Option<&AnyInstance>) -> anyhow::Result<()> + Send + Sync>;

/// A [`BeanFactory`] assembled from closures by [`BeanBuilder`](super::BeanBuilder).
pub struct FnFactory<T> {
    pub(crate) construct: Option<Construct<T>>,
    pub(crate) initializers: Vec<Initializer<T>>,
    pub(crate) post_construct: Vec<Hook<T>>,
    pub(crate) pre_destroy: Vec<Hook<T>>,
    pub(crate) disposer: Option<Disposer<T>>,
}

impl<T> Default for FnFactory<T> {
    fn default() -> Self {
        Self {
            construct: None,
            initializers: Vec::new(),
            post_construct: Vec::new(),
            pre_destroy: Vec::new(),
            disposer: None,
        }
    }
}

impl<T: Send + Sync + 'static> FnFactory<T> {
    fn typed(instance: &AnyInstance) -> anyhow::Result<Arc<T>> {
        instance
            .clone()
            .downcast::<T>()
            .map_err(|_| anyhow!("instance is not a {}", type_name::<T>()))
    }
}

impl<T: Send + Sync + 'static> BeanFactory for FnFactory<T> {
    fn construct(&self, args: &InjectionArgs) -> anyhow::Result<AnyInstance> {
        let construct = self
            .construct
            .as_ref()
            .ok_or_else(|| anyhow!("no constructor registered for {}", type_name::<T>()))?;
        let instance: AnyInstance = Arc::new(construct(args)?);
        Ok(instance)
    }

    fn inject(&self, instance: &AnyInstance, args: &InjectionArgs) -> anyhow::Result<()> {
        if self.initializers.is_empty() {
            return Ok(());
        }
        let typed = Self::typed(instance)?;
        for initializer in &self.initializers {
            initializer(&typed, args)?;
        }
        Ok(())
    }

    fn post_construct(&self, instance: &AnyInstance) -> anyhow::Result<()> {
        let typed = Self::typed(instance)?;
        self.post_construct.iter().try_for_each(|hook| hook(&typed))
    }

    fn pre_destroy(&self, instance: &AnyInstance) -> anyhow::Result<()> {
        let typed = Self::typed(instance)?;
        self.pre_destroy.iter().try_for_each(|hook| hook(&typed))
    }

    fn dispose(&self, instance: &AnyInstance, declaring: Option<&AnyInstance>) -> anyhow::Result<()> {
        let Some(disposer) = &self.disposer else {
            return Ok(());
        };
        let typed = Self::typed(instance)?;
        disposer(&typed, declaring)
    }
}

/// A resolved value waiting to be handed to a factory.
#[derive(Clone)]
pub(crate) enum InjectedValue {
    Instance(Arc<ContextualInstance>),
    Proxy(ErasedProxy),
    Absent,
}

/// Resolved injection point values, by injection point name.
///
/// Values backed by a context are dereferenced on demand: `get` on a
/// normal-scoped dependency resolves the current contextual instance, while
/// `proxy` keeps the indirection and never creates anything.
pub struct InjectionArgs {
    bean: Arc<BeanDeclaration>,
    values: HashMap<String, InjectedValue>,
    declaring: Option<AnyInstance>,
    container: Weak<ContainerInner>,
}

impl InjectionArgs {
    pub(crate) fn new(
        bean: Arc<BeanDeclaration>,
        values: HashMap<String, InjectedValue>,
        declaring: Option<AnyInstance>,
        container: Weak<ContainerInner>,
    ) -> Self {
        Self {
            bean,
            values,
            declaring,
            container,
        }
    }

    /// The bean being created.
    pub fn bean(&self) -> &BeanDeclaration {
        &self.bean
    }

    pub fn container(&self) -> Option<Container> {
        self.container.upgrade().map(Container::from_inner)
    }

    fn value(&self, name: &str) -> Result<&InjectedValue> {
        self.values.get(name).ok_or_else(|| {
            CdiError::definition(format!(
                "bean {} has no injection point named {name}",
                self.bean.id()
            ))
        })
    }

    pub fn get<T>(&self, name: &str) -> Result<BeanRef<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_optional(name)?
            .ok_or_else(|| CdiError::UnsatisfiedResolution {
                required_type: type_name::<T>().to_string(),
                qualifiers: "[]".to_string(),
                target: format!("{}.{name}", self.bean.id()),
                reason: UnsatisfiedReason::NoTypeMatch,
            })
    }

    /// `None` when an optional injection point resolved to no bean.
    pub fn get_optional<T>(&self, name: &str) -> Result<Option<BeanRef<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.value(name)? {
            InjectedValue::Instance(contextual) => BeanRef::new(contextual.clone()).map(Some),
            InjectedValue::Proxy(proxy) => BeanRef::new(proxy.contextual_instance()?).map(Some),
            InjectedValue::Absent => Ok(None),
        }
    }

    pub fn arc<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>(name).map(BeanRef::into_arc)
    }

    pub fn arc_optional<T>(&self, name: &str) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Ok(self.get_optional::<T>(name)?.map(BeanRef::into_arc))
    }

    /// A client proxy for the value, without resolving it now.
    pub fn proxy<T>(&self, name: &str) -> Result<ClientProxy<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.proxy_optional(name)?
            .ok_or_else(|| CdiError::UnsatisfiedResolution {
                required_type: type_name::<T>().to_string(),
                qualifiers: "[]".to_string(),
                target: format!("{}.{name}", self.bean.id()),
                reason: UnsatisfiedReason::NoTypeMatch,
            })
    }

    pub fn proxy_optional<T>(&self, name: &str) -> Result<Option<ClientProxy<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.value(name)? {
            InjectedValue::Proxy(proxy) => Ok(Some(ClientProxy::from_erased(proxy.clone()))),
            InjectedValue::Instance(contextual) => {
                let proxy = ErasedProxy::new(self.container.clone(), contextual.bean().clone())?;
                Ok(Some(ClientProxy::from_erased(proxy)))
            }
            InjectedValue::Absent => Ok(None),
        }
    }

    /// The declaring bean's instance, for producer callbacks.
    pub fn declaring<D: Send + Sync + 'static>(&self) -> Result<Arc<D>> {
        let declaring = self.declaring.as_ref().ok_or_else(|| {
            CdiError::definition(format!("bean {} is not a producer", self.bean.id()))
        })?;
        declaring
            .clone()
            .downcast::<D>()
            .map_err(|_| CdiError::TypeMismatch {
                bean: self.bean.declaring_bean().map(ToString::to_string).unwrap_or_default(),
                requested: type_name::<D>().to_string(),
            })
    }
}

impl fmt::Debug for InjectionArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("InjectionArgs")
            .field("bean", &self.bean.id())
            .field("values", &names)
            .finish()
    }
}
