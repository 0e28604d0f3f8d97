use super::{ContextualInstance, InjectableContext, InstanceLifecycle, InstanceStore};
use crate::bean::{BeanDeclaration, Scope};
use crate::error::Result;
use crate::lifecycle::DestructionReport;
use std::sync::Arc;

/// Process-wide context, always active.
pub struct GlobalContext {
    scope: Scope,
    store: InstanceStore,
}

impl GlobalContext {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            store: InstanceStore::new(),
        }
    }

    pub fn singleton() -> Self {
        Self::new(Scope::Singleton)
    }

    pub fn application() -> Self {
        Self::new(Scope::Application)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl InjectableContext for GlobalContext {
    fn scope(&self) -> Scope {
        self.scope.clone()
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get_or_create(
        &self,
        bean: &Arc<BeanDeclaration>,
        lifecycle: &dyn InstanceLifecycle,
    ) -> Result<Arc<ContextualInstance>> {
        self.store.get_or_create(bean, lifecycle)
    }

    fn get_if_present(&self, bean: &BeanDeclaration) -> Option<Arc<ContextualInstance>> {
        self.store.get(bean.id())
    }

    fn destroy_bean(&self, bean: &BeanDeclaration) -> DestructionReport {
        self.store.destroy(bean.id())
    }

    fn destroy_all(&self) -> DestructionReport {
        let report = self.store.destroy_all();
        tracing::debug!(
            "Destroyed {} instance(s) of scope {}",
            report.destroyed().len(),
            self.scope
        );
        report
    }
}
