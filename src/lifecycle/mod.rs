//! Instance Lifecycle Controller
//!
//! Creation and destruction of contextual instances.
//!
//! # Creation order
//!
//! ```text
//! 1. Declaring instance (producers only)
//!    ↓
//! 2. Injection point values: constructor → fields → initializers
//!    (Dependent: created now and owned, Singleton: from its context,
//!     normal-scoped: client proxy)
//!    ↓
//! 3. BeanFactory::construct, then BeanFactory::inject
//!    ↓
//! 4. Interceptor and decorator instances
//!    ↓
//! 5. Stored in the context
//!    ↓
//! 6. Post-construct
//! ```
//!
//! # Destruction order
//!
//! ```text
//! 1. Pre-destroy, or the disposer of a producer
//!    ↓
//! 2. Dependent instances, newest first
//!    ↓
//! 3. Owned declaring instance
//!    ↓
//! 4. Decorators and interceptors
//! ```
//!
//! Destruction is best-effort. Every failing step is logged and collected into
//! a [`DestructionReport`]; it never stops the rest of the batch.

mod controller;
mod report;
mod shutdown;

pub use controller::LifecycleController;
pub(crate) use controller::destroy_instance;
pub(crate) use report::contain_panic;
pub use report::{DestructionError, DestructionPhase, DestructionReport};
pub use shutdown::{ShutdownHandler, shutdown_signal};
