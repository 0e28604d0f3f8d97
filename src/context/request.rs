use super::{ContextualInstance, InjectableContext, InstanceLifecycle, InstanceStore};
use crate::bean::{BeanDeclaration, Scope};
use crate::error::{CdiError, Result};
use crate::lifecycle::DestructionReport;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct RequestState {
    store: InstanceStore,
}

thread_local! {
    // Active request state of the current thread, per container.
    static ACTIVE: RefCell<HashMap<Uuid, Arc<RequestState>>> = RefCell::new(HashMap::new());
}

/// A suspended request, detached from its thread.
///
/// Obtained from [`RequestContext::suspend`] and handed to
/// [`RequestContext::resume`] on the thread that continues the request.
pub struct RequestContextState {
    container: Uuid,
    state: Arc<RequestState>,
}

impl RequestContextState {
    /// Number of request-scoped instances created so far.
    pub fn len(&self) -> usize {
        self.state.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.store.is_empty()
    }
}

impl fmt::Debug for RequestContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContextState")
            .field("container", &self.container)
            .field("instances", &self.len())
            .finish()
    }
}

/// Request context with thread-confined state
///
/// Each thread has its own active request, or none. Instances created while a
/// request is active live until `deactivate()` on the same thread.
///
/// # Example
///
/// ```rust,ignore
/// let request = container.request_context();
/// request.activate()?;
/// let cart = container.get::<Cart>()?;
/// // ...
/// let report = request.deactivate();
/// ```
pub struct RequestContext {
    container: Uuid,
}

impl RequestContext {
    pub fn new(container: Uuid) -> Self {
        Self { container }
    }

    fn current(&self) -> Option<Arc<RequestState>> {
        ACTIVE.with(|active| active.borrow().get(&self.container).cloned())
    }

    fn install(&self, state: Arc<RequestState>) -> Result<()> {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains_key(&self.container) {
                return Err(CdiError::ContextAlreadyActive {
                    scope: Scope::Request.to_string(),
                });
            }
            active.insert(self.container, state);
            Ok(())
        })
    }

    fn take(&self) -> Option<Arc<RequestState>> {
        ACTIVE.with(|active| active.borrow_mut().remove(&self.container))
    }

    /// Start a new request on the current thread.
    pub fn activate(&self) -> Result<()> {
        self.install(Arc::new(RequestState::default()))?;
        tracing::debug!("Request context activated");
        Ok(())
    }

    /// End the current request and destroy its instances.
    ///
    /// Never fails: destruction problems are logged and returned in the
    /// report. Deactivating an inactive context does nothing.
    pub fn deactivate(&self) -> DestructionReport {
        let Some(state) = self.take() else {
            tracing::debug!("Request context deactivated while not active");
            return DestructionReport::new();
        };
        let report = state.store.destroy_all();
        tracing::debug!(
            "Request context deactivated, {} instance(s) destroyed",
            report.destroyed().len()
        );
        report
    }

    /// Detach the current request from this thread without destroying it.
    pub fn suspend(&self) -> Option<RequestContextState> {
        let state = self.take()?;
        tracing::debug!("Request context suspended");
        Some(RequestContextState {
            container: self.container,
            state,
        })
    }

    /// Continue a suspended request on the current thread.
    pub fn resume(&self, state: RequestContextState) -> Result<()> {
        if state.container != self.container {
            return Err(CdiError::Internal(
                "request state belongs to another container".to_string(),
            ));
        }
        self.install(state.state)?;
        tracing::debug!("Request context resumed");
        Ok(())
    }
}

impl InjectableContext for RequestContext {
    fn scope(&self) -> Scope {
        Scope::Request
    }

    fn is_active(&self) -> bool {
        self.current().is_some()
    }

    fn get_or_create(
        &self,
        bean: &Arc<BeanDeclaration>,
        lifecycle: &dyn InstanceLifecycle,
    ) -> Result<Arc<ContextualInstance>> {
        let state = self
            .current()
            .ok_or_else(|| CdiError::context_not_active(Scope::Request))?;
        state.store.get_or_create(bean, lifecycle)
    }

    fn get_if_present(&self, bean: &BeanDeclaration) -> Option<Arc<ContextualInstance>> {
        self.current()?.store.get(bean.id())
    }

    fn destroy_bean(&self, bean: &BeanDeclaration) -> DestructionReport {
        match self.current() {
            Some(state) => state.store.destroy(bean.id()),
            None => DestructionReport::new(),
        }
    }

    /// Same as `deactivate`, for the current thread only.
    fn destroy_all(&self) -> DestructionReport {
        self.deactivate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_is_per_thread() {
        let context = Arc::new(RequestContext::new(Uuid::new_v4()));
        context.activate().unwrap();
        assert!(context.is_active());
        assert!(matches!(
            context.activate(),
            Err(CdiError::ContextAlreadyActive { .. })
        ));

        let other = context.clone();
        std::thread::spawn(move || assert!(!other.is_active()))
            .join()
            .unwrap();

        assert!(context.deactivate().is_clean());
        assert!(!context.is_active());
    }

    #[test]
    fn test_contexts_of_different_containers_are_independent() {
        let first = RequestContext::new(Uuid::new_v4());
        let second = RequestContext::new(Uuid::new_v4());
        first.activate().unwrap();
        assert!(!second.is_active());
        first.deactivate();
    }

    #[test]
    fn test_suspend_and_resume_elsewhere() {
        let context = Arc::new(RequestContext::new(Uuid::new_v4()));
        context.activate().unwrap();
        let state = context.suspend().unwrap();
        assert!(!context.is_active());

        let moved = context.clone();
        std::thread::spawn(move || {
            moved.resume(state).unwrap();
            assert!(moved.is_active());
            moved.deactivate();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_resume_rejects_foreign_state() {
        let first = RequestContext::new(Uuid::new_v4());
        let second = RequestContext::new(Uuid::new_v4());
        first.activate().unwrap();
        let state = first.suspend().unwrap();
        assert!(second.resume(state).is_err());
    }
}
