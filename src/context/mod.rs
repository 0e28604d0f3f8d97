//! Scope & Context Manager
//!
//! A context owns the contextual instances of one scope. The container keeps
//! one context per scope and asks it for the current instance of a bean; the
//! context either returns the existing one or lets the lifecycle controller
//! create it.
//!
//! # Built-in contexts
//!
//! - [`GlobalContext`] backs `Singleton` and `Application`. Always active.
//! - [`RequestContext`] backs `Request`. Active per thread between
//!   `activate()` and `deactivate()`.
//!
//! Custom scopes register their own [`InjectableContext`] on the container builder.

mod global;
mod instance;
mod request;
mod store;

pub use global::GlobalContext;
pub(crate) use instance::CreationalState;
pub use instance::ContextualInstance;
pub use request::{RequestContext, RequestContextState};
pub use store::InstanceStore;

use crate::bean::{BeanDeclaration, Scope};
use crate::error::Result;
use crate::lifecycle::DestructionReport;
use std::sync::Arc;

/// Creates instances on behalf of a context.
///
/// `instantiate` builds the instance with its dependencies injected. The
/// context stores it before calling `post_construct`.
pub trait InstanceLifecycle {
    fn instantiate(&self, bean: &Arc<BeanDeclaration>) -> Result<Arc<ContextualInstance>>;

    fn post_construct(&self, instance: &ContextualInstance) -> Result<()>;
}

/// The store of contextual instances for one scope.
pub trait InjectableContext: Send + Sync {
    fn scope(&self) -> Scope;

    fn is_active(&self) -> bool;

    /// The current instance of `bean`, created through `lifecycle` if absent.
    ///
    /// Fails with `ContextNotActive` when the context is not active.
    fn get_or_create(
        &self,
        bean: &Arc<BeanDeclaration>,
        lifecycle: &dyn InstanceLifecycle,
    ) -> Result<Arc<ContextualInstance>>;

    fn get_if_present(&self, bean: &BeanDeclaration) -> Option<Arc<ContextualInstance>>;

    fn destroy_bean(&self, bean: &BeanDeclaration) -> DestructionReport;

    fn destroy_all(&self) -> DestructionReport;
}
