use crate::context::ContextualInstance;
use crate::error::{CdiError, Result};
use crate::intercept::{InvocationContext, InvocationResult};
use anyhow::anyhow;
use std::any::{Any, type_name};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A typed reference to a contextual instance.
///
/// Derefs to the raw instance. Business methods that should run through the
/// bean's interceptors and decorators go through [`BeanRef::invoke`].
pub struct BeanRef<T: ?Sized> {
    instance: Arc<T>,
    contextual: Arc<ContextualInstance>,
}

impl<T: ?Sized + Send + Sync + 'static> BeanRef<T> {
    pub(crate) fn new(contextual: Arc<ContextualInstance>) -> Result<Self> {
        let instance = contextual
            .bean()
            .cast::<T>(contextual.instance())
            .ok_or_else(|| CdiError::TypeMismatch {
                bean: contextual.bean().id().to_string(),
                requested: type_name::<T>().to_string(),
            })?;
        Ok(Self {
            instance,
            contextual,
        })
    }

    pub fn into_arc(self) -> Arc<T> {
        self.instance
    }

    pub fn contextual(&self) -> &Arc<ContextualInstance> {
        &self.contextual
    }

    /// Run `body` as business method `method` of this bean.
    ///
    /// Without interceptors or decorators `body` is called directly. Otherwise
    /// the composed chain runs first and `body` is its target; it may run more
    /// than once if an interceptor proceeds again.
    pub fn invoke<R, F>(
        &self,
        method: &str,
        parameters: Vec<Box<dyn Any + Send>>,
        mut body: F,
    ) -> Result<R>
    where
        R: Send + 'static,
        F: FnMut(&T, &mut InvocationContext<'_>) -> anyhow::Result<R>,
    {
        let bean = self.contextual.bean();
        let failed = |cause: anyhow::Error| CdiError::Invocation {
            bean: bean.id().to_string(),
            method: method.to_string(),
            cause,
        };
        let mut ctx = InvocationContext::new(bean, method, parameters, self.contextual.instance());

        let Some(interception) = self.contextual.interception() else {
            return body(&self.instance, &mut ctx).map_err(failed);
        };
        let instance = &self.instance;
        let result = interception
            .invoke(&mut ctx, &mut |ctx: &mut InvocationContext<'_>| -> InvocationResult {
                let value = body(instance, ctx)?;
                Ok(Box::new(value))
            })
            .map_err(failed)?;
        result
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| failed(anyhow!("chain returned a value that is not a {}", type_name::<R>())))
    }
}

/// Raw access, bypassing interceptors and decorators.
impl<T: ?Sized> Deref for BeanRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T: ?Sized> Clone for BeanRef<T> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            contextual: self.contextual.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for BeanRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRef")
            .field("bean", self.contextual.bean().id())
            .field("instance", &self.contextual.id())
            .finish()
    }
}
