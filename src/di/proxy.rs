use super::BeanRef;
use super::container::ContainerInner;
use crate::bean::BeanDeclaration;
use crate::context::ContextualInstance;
use crate::error::{CdiError, Result};
use crate::intercept::InvocationContext;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// Untyped client proxy: a container handle plus the bean it stands for.
///
/// Holds no instance. Every dereference asks the bean's context for the
/// current contextual instance, creating it if needed.
#[derive(Clone)]
pub struct ErasedProxy {
    container: Weak<ContainerInner>,
    bean: Arc<BeanDeclaration>,
}

impl ErasedProxy {
    pub(crate) fn new(container: Weak<ContainerInner>, bean: Arc<BeanDeclaration>) -> Result<Self> {
        if bean.scope().is_dependent() {
            return Err(CdiError::UnproxyableResolution {
                message: format!("bean {} is Dependent and cannot be client-proxied", bean.id()),
            });
        }
        Ok(Self { container, bean })
    }

    pub fn bean(&self) -> &Arc<BeanDeclaration> {
        &self.bean
    }

    /// The instance the proxy currently delegates to.
    pub fn contextual_instance(&self) -> Result<Arc<ContextualInstance>> {
        let container = self.container.upgrade().ok_or(CdiError::ContainerShutDown)?;
        container.contextual_instance(&self.bean)
    }
}

impl fmt::Debug for ErasedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedProxy")
            .field("bean", self.bean.id())
            .field("scope", self.bean.scope())
            .finish()
    }
}

/// A client proxy for a normal-scoped bean, viewed as `T`.
///
/// Cheap to clone and safe to keep in long-lived beans: a request-scoped bean
/// behind a proxy resolves to the current thread's request instance on each
/// call, and fails with `ContextNotActive` outside a request.
///
/// # Example
///
/// ```rust,ignore
/// let cart: ClientProxy<Cart> = args.proxy("cart")?;
/// let total = cart.get()?.total();
/// ```
pub struct ClientProxy<T: ?Sized> {
    inner: ErasedProxy,
    _type: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ClientProxy<T> {
    pub(crate) fn from_erased(inner: ErasedProxy) -> Self {
        Self {
            inner,
            _type: PhantomData,
        }
    }

    /// Resolve the current contextual instance.
    pub fn get(&self) -> Result<BeanRef<T>> {
        BeanRef::new(self.inner.contextual_instance()?)
    }

    /// Call a business method on the current instance through its interception chain.
    pub fn invoke<R, F>(
        &self,
        method: &str,
        parameters: Vec<Box<dyn Any + Send>>,
        body: F,
    ) -> Result<R>
    where
        R: Send + 'static,
        F: FnMut(&T, &mut InvocationContext<'_>) -> anyhow::Result<R>,
    {
        self.get()?.invoke(method, parameters, body)
    }

    pub fn bean(&self) -> &Arc<BeanDeclaration> {
        self.inner.bean()
    }
}

impl<T: ?Sized> Clone for ClientProxy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _type: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ClientProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("bean", self.inner.bean.id())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
