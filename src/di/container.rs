use super::{BeanRef, Instance, InstanceHandle};
use crate::bean::{BeanDeclaration, BeanId, BeanRegistry, BeanType, Qualifier, Scope};
use crate::config::ContainerConfig;
use crate::context::{ContextualInstance, GlobalContext, InjectableContext, RequestContext};
use crate::error::{CdiError, Result};
use crate::intercept::{BeanInterception, BindingRegistry, DecoratorDeclaration, InterceptorDeclaration};
use crate::lifecycle::{DestructionReport, LifecycleController};
use crate::resolve::{Resolutions, resolve_ambiguity};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Deployment results and runtime contexts shared by every handle.
pub(crate) struct ContainerInner {
    pub(crate) id: Uuid,
    pub(crate) config: ContainerConfig,
    pub(crate) registry: BeanRegistry,
    pub(crate) resolutions: Resolutions,
    pub(crate) bindings: BindingRegistry,
    pub(crate) interceptors: Vec<InterceptorDeclaration>,
    pub(crate) decorators: Vec<DecoratorDeclaration>,
    pub(crate) interceptions: HashMap<BeanId, Arc<BeanInterception>>,
    pub(crate) singleton: Arc<GlobalContext>,
    pub(crate) application: Arc<GlobalContext>,
    pub(crate) request: Arc<RequestContext>,
    pub(crate) custom: BTreeMap<Scope, Arc<dyn InjectableContext>>,
    pub(crate) dependent_lookups: Mutex<Vec<Arc<ContextualInstance>>>,
    /// New lookups are accepted.
    pub(crate) running: AtomicBool,
    /// Every context has been destroyed; proxies stop resolving too.
    pub(crate) torn_down: AtomicBool,
}

impl ContainerInner {
    pub(crate) fn context_for(&self, scope: &Scope) -> Result<Arc<dyn InjectableContext>> {
        let context: Arc<dyn InjectableContext> = match scope {
            Scope::Singleton => self.singleton.clone(),
            Scope::Application => self.application.clone(),
            Scope::Request => self.request.clone(),
            Scope::Dependent => {
                return Err(CdiError::Internal(
                    "Dependent instances are not stored in a context".to_string(),
                ));
            }
            Scope::Custom(_) => self.custom.get(scope).cloned().ok_or_else(|| {
                CdiError::Configuration {
                    message: format!("no context registered for scope {scope}"),
                }
            })?,
        };
        Ok(context)
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CdiError::ContainerShutDown)
        }
    }

    /// The current instance of `bean` in its context.
    ///
    /// Still served while shutdown tears the contexts down, so pre-destroy
    /// callbacks can reach beans that are not destroyed yet.
    pub(crate) fn contextual_instance(
        self: &Arc<Self>,
        bean: &Arc<BeanDeclaration>,
    ) -> Result<Arc<ContextualInstance>> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(CdiError::ContainerShutDown);
        }
        let context = self.context_for(bean.scope())?;
        if !context.is_active() {
            return Err(CdiError::context_not_active(bean.scope()));
        }
        context.get_or_create(bean, &LifecycleController::new(self))
    }

    pub(crate) fn track_dependent(&self, instance: Arc<ContextualInstance>) {
        self.dependent_lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(instance);
    }

    pub(crate) fn untrack_dependent(&self, instance: &ContextualInstance) {
        self.dependent_lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tracked| tracked.id() != instance.id());
    }
}

/// A deployed container.
///
/// Cheap to clone; every clone shares the same contexts. Built by
/// [`ContainerBuilder`](super::ContainerBuilder).
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ContainerInner> {
        &self.inner
    }

    /// Programmatic lookup of `T` with the given qualifiers.
    pub fn select<T>(&self, qualifiers: impl IntoIterator<Item = Qualifier>) -> Instance<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Instance::new(self.clone(), BeanType::of::<T>(), qualifiers.into_iter().collect())
    }

    /// Lookup by an explicit bean type, for types not known at compile time.
    pub fn select_type(
        &self,
        required_type: BeanType,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> Instance<dyn Any + Send + Sync> {
        Instance::new(self.clone(), required_type, qualifiers.into_iter().collect())
    }

    /// The `@Default` bean of type `T`.
    ///
    /// A Dependent instance returned here is owned by the caller alone. Use
    /// [`select`](Self::select) and [`InstanceHandle::destroy`] when its
    /// pre-destroy callbacks must run.
    pub fn get<T>(&self) -> Result<BeanRef<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.select::<T>([]).get_detached()
    }

    /// The enabled bean with the given identifier.
    pub fn bean(&self, id: &str) -> Result<&Arc<BeanDeclaration>> {
        self.inner.ensure_running()?;
        self.inner
            .registry
            .get(id)
            .ok_or_else(|| CdiError::UnknownBean { id: id.to_string() })
    }

    /// Lookup by `@Named` value, whatever the bean's type, viewed as `T`.
    ///
    /// Ambiguity rules apply among the beans carrying the name.
    pub fn instance_by_name<T>(&self, name: &str) -> Result<InstanceHandle<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.inner.ensure_running()?;
        let qualifier = Qualifier::named(name);
        let named: Vec<Arc<BeanDeclaration>> = self
            .inner
            .registry
            .beans()
            .iter()
            .filter(|bean| bean.qualifiers().contains(&qualifier))
            .cloned()
            .collect();
        match resolve_ambiguity(named).as_slice() {
            [] => Err(CdiError::UnknownBean {
                id: qualifier.to_string(),
            }),
            [bean] => self.select::<T>([]).handle(bean, true),
            candidates => Err(CdiError::AmbiguousResolution {
                required_type: BeanType::of::<T>().to_string(),
                qualifiers: qualifier.to_string(),
                target: format!("lookup by name {name}"),
                candidates: candidates.iter().map(|bean| bean.to_string()).collect(),
            }),
        }
    }

    pub fn destroy<T>(&self, handle: InstanceHandle<T>) -> DestructionReport
    where
        T: ?Sized + Send + Sync + 'static,
    {
        handle.destroy()
    }

    pub fn request_context(&self) -> &RequestContext {
        &self.inner.request
    }

    pub fn context(&self, scope: &Scope) -> Result<Arc<dyn InjectableContext>> {
        self.inner.context_for(scope)
    }

    pub fn resolutions(&self) -> &Resolutions {
        &self.inner.resolutions
    }

    pub fn registry(&self) -> &BeanRegistry {
        &self.inner.registry
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.inner.bindings
    }

    /// Composed interception of a bean, if any interceptor or decorator applies.
    pub fn interception(&self, bean: &str) -> Option<&BeanInterception> {
        self.inner.interceptions.get(bean).map(Arc::as_ref)
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Destroy every contextual instance, best effort.
    ///
    /// Order: the current thread's request, Dependent lookups newest first,
    /// custom contexts, application, singleton. Requests still active on other
    /// threads are left to their own `deactivate()`. New lookups fail with
    /// `ContainerShutDown` as soon as shutdown starts, client proxies once the
    /// last context is destroyed. A second call does nothing.
    pub fn shutdown_all(&self) -> DestructionReport {
        let mut report = DestructionReport::new();
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            tracing::debug!("Container {} already shut down", self.inner.id);
            return report;
        }
        tracing::info!("Shutting down container {}", self.inner.id);

        report.merge(self.inner.request.deactivate());

        let lookups = std::mem::take(
            &mut *self
                .inner
                .dependent_lookups
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for instance in lookups.iter().rev() {
            instance.destroy(&mut report);
        }

        for context in self.inner.custom.values().rev() {
            report.merge(context.destroy_all());
        }
        report.merge(self.inner.application.destroy_all());
        report.merge(self.inner.singleton.destroy_all());
        self.inner.torn_down.store(true, Ordering::Release);

        if report.is_clean() {
            tracing::info!(
                "Container shut down, {} instance(s) destroyed",
                report.destroyed().len()
            );
        } else {
            tracing::warn!(
                "Container shut down, {} instance(s) destroyed, {} destruction failure(s)",
                report.destroyed().len(),
                report.failures().len()
            );
        }
        report
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("beans", &self.inner.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}
