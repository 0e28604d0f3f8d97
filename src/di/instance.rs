use super::{BeanRef, Container};
use crate::bean::{BeanDeclaration, BeanType, Qualifier};
use crate::error::{CdiError, Result};
use crate::lifecycle::{DestructionReport, LifecycleController};
use crate::resolve::Resolver;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Programmatic lookup of beans of one type and qualifier set.
///
/// Obtained from [`Container::select`]. Nothing is resolved until `get()`.
pub struct Instance<T: ?Sized> {
    container: Container,
    required_type: BeanType,
    qualifiers: Vec<Qualifier>,
    _type: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Instance<T> {
    pub(crate) fn new(container: Container, required_type: BeanType, qualifiers: Vec<Qualifier>) -> Self {
        Self {
            container,
            required_type,
            qualifiers,
            _type: PhantomData,
        }
    }

    pub fn required_type(&self) -> &BeanType {
        &self.required_type
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    fn matching(&self) -> Vec<Arc<BeanDeclaration>> {
        self.container
            .registry()
            .find_by_type_and_qualifiers(&self.required_type, &self.qualifiers)
    }

    pub fn is_unsatisfied(&self) -> bool {
        self.matching().is_empty()
    }

    pub fn is_ambiguous(&self) -> bool {
        Resolver::new(self.container.registry())
            .candidates(&self.required_type, &self.qualifiers)
            .len()
            > 1
    }

    /// Exactly one bean matches once ambiguity rules are applied.
    pub fn is_resolvable(&self) -> bool {
        Resolver::new(self.container.registry())
            .candidates(&self.required_type, &self.qualifiers)
            .len()
            == 1
    }

    /// Narrow the lookup with additional qualifiers.
    pub fn select(&self, qualifiers: impl IntoIterator<Item = Qualifier>) -> Instance<T> {
        let mut narrowed = self.qualifiers.clone();
        narrowed.extend(qualifiers);
        Instance::new(self.container.clone(), self.required_type.clone(), narrowed)
    }

    /// Resolve and obtain the instance.
    ///
    /// A Dependent instance is owned by the returned handle: it is destroyed by
    /// [`InstanceHandle::destroy`] or, at the latest, at container shutdown.
    pub fn get(&self) -> Result<InstanceHandle<T>> {
        self.handle(&self.resolved()?, true)
    }

    /// Resolve and obtain a reference the container keeps no record of.
    ///
    /// A Dependent instance obtained this way belongs to the caller and is
    /// dropped with the last reference, without pre-destroy callbacks.
    pub(crate) fn get_detached(&self) -> Result<BeanRef<T>> {
        self.handle(&self.resolved()?, false).map(|handle| handle.reference)
    }

    /// Handles for every bean left after ambiguity rules, in registration order.
    pub fn handles(&self) -> Result<Vec<InstanceHandle<T>>> {
        Resolver::new(self.container.registry())
            .candidates(&self.required_type, &self.qualifiers)
            .iter()
            .map(|bean| self.handle(bean, true))
            .collect()
    }

    fn resolved(&self) -> Result<Arc<BeanDeclaration>> {
        let target = format!("programmatic lookup of {}", self.required_type);
        Resolver::new(self.container.registry())
            .resolve_type(&self.required_type, &self.qualifiers, &target, true)?
            .ok_or_else(|| CdiError::Internal(format!("{target} resolved to nothing")))
    }

    pub(crate) fn handle(&self, bean: &Arc<BeanDeclaration>, track: bool) -> Result<InstanceHandle<T>> {
        let inner = self.container.inner();
        inner.ensure_running()?;
        if !bean.scope().is_dependent() {
            return Ok(InstanceHandle {
                container: self.container.clone(),
                reference: BeanRef::new(inner.contextual_instance(bean)?)?,
            });
        }

        let contextual = LifecycleController::new(inner).create(bean)?;
        let reference = match BeanRef::new(contextual.clone()) {
            Ok(reference) => reference,
            Err(e) => {
                contextual.destroy(&mut DestructionReport::new());
                return Err(e);
            }
        };
        if track {
            inner.track_dependent(contextual);
        }
        Ok(InstanceHandle {
            container: self.container.clone(),
            reference,
        })
    }
}

impl<T: ?Sized> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("required_type", &self.required_type)
            .field("qualifiers", &self.qualifiers)
            .finish()
    }
}

/// The result of a programmatic lookup.
pub struct InstanceHandle<T: ?Sized> {
    container: Container,
    reference: BeanRef<T>,
}

impl<T: ?Sized + Send + Sync + 'static> InstanceHandle<T> {
    pub fn get(&self) -> &BeanRef<T> {
        &self.reference
    }

    /// Give up the handle and keep the reference.
    ///
    /// A Dependent instance is no longer tracked afterwards: the container will
    /// not destroy it, and it is dropped with its last reference.
    pub fn into_ref(self) -> BeanRef<T> {
        let contextual = self.reference.contextual();
        if contextual.bean().scope().is_dependent() {
            self.container.inner().untrack_dependent(contextual);
        }
        self.reference
    }

    pub fn bean(&self) -> &Arc<BeanDeclaration> {
        self.reference.contextual().bean()
    }

    /// Destroy the instance behind the handle.
    ///
    /// A Dependent instance is destroyed directly. For any other scope the
    /// current instance is removed from its context.
    pub fn destroy(self) -> DestructionReport {
        let contextual = self.reference.contextual().clone();
        let inner = self.container.inner();
        if contextual.bean().scope().is_dependent() {
            inner.untrack_dependent(&contextual);
            let mut report = DestructionReport::new();
            contextual.destroy(&mut report);
            return report;
        }
        match inner.context_for(contextual.bean().scope()) {
            Ok(context) => context.destroy_bean(contextual.bean()),
            Err(e) => {
                tracing::warn!("Cannot destroy {}: {}", contextual.bean().id(), e);
                DestructionReport::new()
            }
        }
    }
}

impl<T: ?Sized> std::ops::Deref for InstanceHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.reference
    }
}

impl<T: ?Sized> fmt::Debug for InstanceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("reference", &self.reference)
            .finish()
    }
}
