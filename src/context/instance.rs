use crate::bean::{AnyInstance, BeanDeclaration};
use crate::intercept::BoundInterception;
use crate::lifecycle::{self, DestructionReport};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// What a producer needs to be disposed correctly.
#[derive(Default)]
pub(crate) struct CreationalState {
    /// Declaring bean instance the producer ran on.
    pub(crate) declaring: Option<Arc<ContextualInstance>>,
    /// The declaring instance is Dependent and owned by the product.
    pub(crate) owns_declaring: bool,
}

/// One live instance of a bean, owned by a context or by another instance.
pub struct ContextualInstance {
    id: Uuid,
    bean: Arc<BeanDeclaration>,
    instance: AnyInstance,
    dependents: Vec<Arc<ContextualInstance>>,
    interception: Option<BoundInterception>,
    creational: CreationalState,
    destroyed: AtomicBool,
}

impl ContextualInstance {
    pub(crate) fn new(
        bean: Arc<BeanDeclaration>,
        instance: AnyInstance,
        dependents: Vec<Arc<ContextualInstance>>,
        interception: Option<BoundInterception>,
        creational: CreationalState,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bean,
            instance,
            dependents,
            interception,
            creational,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bean(&self) -> &Arc<BeanDeclaration> {
        &self.bean
    }

    pub fn instance(&self) -> &AnyInstance {
        &self.instance
    }

    /// Dependent instances created for this one, in creation order.
    pub fn dependents(&self) -> &[Arc<ContextualInstance>] {
        &self.dependents
    }

    pub fn interception(&self) -> Option<&BoundInterception> {
        self.interception.as_ref()
    }

    pub(crate) fn creational(&self) -> &CreationalState {
        &self.creational
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Returns `false` if the instance was already destroyed.
    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    /// Best-effort destruction of this instance and everything it owns.
    pub fn destroy(&self, report: &mut DestructionReport) {
        lifecycle::destroy_instance(self, report);
    }
}

impl fmt::Debug for ContextualInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualInstance")
            .field("id", &self.id)
            .field("bean", self.bean.id())
            .field("dependents", &self.dependents.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
