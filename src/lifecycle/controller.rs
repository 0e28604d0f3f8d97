use super::report::{DestructionError, DestructionPhase, DestructionReport, contain_panic};
use crate::bean::{AnyInstance, BeanDeclaration, InjectedValue, InjectionArgs, InjectionPoint};
use crate::context::{ContextualInstance, CreationalState, InstanceLifecycle};
use crate::di::ErasedProxy;
use crate::di::container::ContainerInner;
use crate::error::{CdiError, Result};
use crate::intercept::BoundInterception;
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything created on behalf of an instance that is still being built.
#[derive(Default)]
struct Owned {
    dependents: Vec<Arc<ContextualInstance>>,
    creational: CreationalState,
}

impl Owned {
    fn discard(self, report: &mut DestructionReport) {
        for dependent in self.dependents.iter().rev() {
            dependent.destroy(report);
        }
        if self.creational.owns_declaring {
            if let Some(declaring) = &self.creational.declaring {
                declaring.destroy(report);
            }
        }
    }
}

/// Instance Lifecycle Controller
///
/// Builds instances for the contexts: materializes injection point values,
/// runs the bean's factory, binds its interceptors and decorators and runs
/// post-construct callbacks. Destruction is the free function
/// [`destroy_instance`].
pub struct LifecycleController<'c> {
    container: &'c Arc<ContainerInner>,
}

impl<'c> LifecycleController<'c> {
    pub(crate) fn new(container: &'c Arc<ContainerInner>) -> Self {
        Self { container }
    }

    /// A fresh, fully initialized instance, owned by the caller.
    ///
    /// Used for Dependent beans, which no context stores.
    pub fn create(&self, bean: &Arc<BeanDeclaration>) -> Result<Arc<ContextualInstance>> {
        let instance = self.instantiate(bean)?;
        if let Err(e) = self.post_construct(&instance) {
            let mut report = DestructionReport::new();
            instance.destroy(&mut report);
            return Err(e);
        }
        Ok(instance)
    }

    fn build(
        &self,
        bean: &Arc<BeanDeclaration>,
        owned: &mut Owned,
    ) -> Result<(AnyInstance, Option<BoundInterception>)> {
        let factory = bean.factory().ok_or_else(|| {
            CdiError::creation(bean.id(), anyhow!("bean has no creation callback"))
        })?;
        let declaring = self.declaring_instance(bean, owned)?;

        let mut values = HashMap::with_capacity(bean.injection_points().len());
        for injection_point in bean.injection_points() {
            let value = self.materialize(bean, injection_point, owned)?;
            values.insert(injection_point.name().to_string(), value);
        }
        let args = InjectionArgs::new(
            bean.clone(),
            values,
            declaring,
            Arc::downgrade(self.container),
        );

        let instance = contain_panic(|| factory.construct(&args))
            .map_err(|e| CdiError::creation(bean.id(), e))?;
        contain_panic(|| factory.inject(&instance, &args))
            .map_err(|e| CdiError::creation(bean.id(), e))?;

        let interception = match self.container.interceptions.get(bean.id()) {
            Some(plan) => Some(BoundInterception::bind(
                plan.clone(),
                &self.container.interceptors,
                &self.container.decorators,
            )?),
            None => None,
        };
        Ok((instance, interception))
    }

    fn declaring_instance(
        &self,
        bean: &BeanDeclaration,
        owned: &mut Owned,
    ) -> Result<Option<AnyInstance>> {
        let Some(declaring_id) = bean.declaring_bean() else {
            return Ok(None);
        };
        let declaring = self
            .container
            .registry
            .get(declaring_id)
            .ok_or_else(|| CdiError::UnknownBean {
                id: declaring_id.to_string(),
            })?;
        let instance = if declaring.scope().is_dependent() {
            owned.creational.owns_declaring = true;
            self.create(declaring)?
        } else {
            self.container.contextual_instance(declaring)?
        };
        let raw = instance.instance().clone();
        owned.creational.declaring = Some(instance);
        Ok(Some(raw))
    }

    fn materialize(
        &self,
        bean: &BeanDeclaration,
        injection_point: &InjectionPoint,
        owned: &mut Owned,
    ) -> Result<InjectedValue> {
        let Some(resolved) = self
            .container
            .resolutions
            .get(bean.id(), injection_point.name())
            .and_then(|resolution| resolution.resolved())
        else {
            return Ok(InjectedValue::Absent);
        };

        if injection_point.is_proxied() || resolved.scope().is_normal() {
            let proxy = ErasedProxy::new(Arc::downgrade(self.container), resolved.clone())?;
            return Ok(InjectedValue::Proxy(proxy));
        }
        if resolved.scope().is_dependent() {
            let dependent = self.create(resolved)?;
            owned.dependents.push(dependent.clone());
            return Ok(InjectedValue::Instance(dependent));
        }
        Ok(InjectedValue::Instance(
            self.container.contextual_instance(resolved)?,
        ))
    }
}

impl InstanceLifecycle for LifecycleController<'_> {
    fn instantiate(&self, bean: &Arc<BeanDeclaration>) -> Result<Arc<ContextualInstance>> {
        let mut owned = Owned::default();
        match self.build(bean, &mut owned) {
            Ok((instance, interception)) => {
                tracing::debug!("Instantiated {}", bean.id());
                Ok(Arc::new(ContextualInstance::new(
                    bean.clone(),
                    instance,
                    owned.dependents,
                    interception,
                    owned.creational,
                )))
            }
            Err(e) => {
                let mut report = DestructionReport::new();
                owned.discard(&mut report);
                Err(e)
            }
        }
    }

    fn post_construct(&self, instance: &ContextualInstance) -> Result<()> {
        let bean = instance.bean();
        if bean.kind().is_producer() {
            return Ok(());
        }
        let Some(factory) = bean.factory() else {
            return Ok(());
        };
        contain_panic(|| factory.post_construct(instance.instance()))
            .map_err(|e| CdiError::creation(bean.id(), e))
    }
}

/// Destroy `instance` and everything it owns, recording failures.
///
/// Pre-destroy (or the disposer of a producer) runs first, then dependents
/// newest first, then an owned declaring instance, then interceptors and
/// decorators. A second call does nothing.
pub(crate) fn destroy_instance(instance: &ContextualInstance, report: &mut DestructionReport) {
    if !instance.mark_destroyed() {
        return;
    }
    let bean = instance.bean();
    if let Some(factory) = bean.factory() {
        let (phase, outcome) = if bean.kind().is_producer() {
            let declaring = instance
                .creational()
                .declaring
                .as_ref()
                .map(|declaring| declaring.instance());
            (
                DestructionPhase::Disposer,
                contain_panic(|| factory.dispose(instance.instance(), declaring)),
            )
        } else {
            (
                DestructionPhase::PreDestroy,
                contain_panic(|| factory.pre_destroy(instance.instance())),
            )
        };
        if let Err(cause) = outcome {
            report.record_failure(DestructionError::new(bean.id().as_ref(), phase, cause));
        }
    }

    for dependent in instance.dependents().iter().rev() {
        dependent.destroy(report);
    }
    let creational = instance.creational();
    if creational.owns_declaring {
        if let Some(declaring) = &creational.declaring {
            declaring.destroy(report);
        }
    }
    if let Some(interception) = instance.interception() {
        interception.destroy(bean.id(), report);
    }

    report.record_destroyed(bean.id().as_ref());
    tracing::debug!("Destroyed instance of {}", bean.id());
}
