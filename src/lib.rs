//! # Meshestra CDI
//!
//! Typesafe dependency resolution and contextual lifecycle management for
//! Meshestra services.
//!
//! ## Features
//!
//! - **Typesafe resolution**: beans are matched by type and qualifiers once, at
//!   deployment, and every problem is reported together
//! - **Scopes**: Dependent, Singleton, Application, Request and custom contexts
//! - **Client proxies**: normal-scoped beans are injected as proxies that resolve
//!   the current instance per call
//! - **Interceptors and decorators**: composed into an ordered chain per bean and
//!   business method
//! - **Best-effort teardown**: destruction failures are logged and reported,
//!   never propagated
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use meshestra_cdi::prelude::*;
//!
//! #[derive(Default)]
//! pub struct Counter {
//!     hits: std::sync::atomic::AtomicUsize,
//! }
//!
//! #[derive(Injectable)]
//! #[bean(scope = "singleton", post_construct = "started")]
//! pub struct Service {
//!     counter: Arc<Counter>,
//! }
//!
//! impl Service {
//!     fn started(&self) -> anyhow::Result<()> {
//!         tracing::info!("service up");
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> meshestra_cdi::Result<()> {
//!     let container = ContainerBuilder::new()
//!         .bean(
//!             BeanBuilder::<Counter>::class("counter")
//!                 .scope(Scope::Singleton)
//!                 .constructor(|_| Ok(Counter::default()))
//!                 .build(),
//!         )
//!         .injectable::<Service>()
//!         .build()?;
//!
//!     let service = container.get::<Service>()?;
//!     // plain method calls go straight to the instance
//!     service.counter.hits.load(std::sync::atomic::Ordering::SeqCst);
//!     // interceptors and decorators only run through `invoke`
//!     let hits = service.invoke("hits", Vec::new(), |service, _ctx| {
//!         Ok(service.counter.hits.load(std::sync::atomic::Ordering::SeqCst))
//!     })?;
//!     container.shutdown_all();
//!     Ok(())
//! }
//! ```
//!
//! `BeanRef` derefs to the raw instance, so calls made through `Deref` skip
//! the interception chain. Only [`BeanRef::invoke`] runs interceptors and
//! decorators bound to the bean or method.

extern crate self as meshestra_cdi;

pub mod bean;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod intercept;
pub mod lifecycle;
pub mod resolve;

// Re-export core types
pub use bean::{BeanBuilder, BeanDeclaration, BeanType, InjectionArgs, InjectionPoint, Qualifier, Scope};
pub use config::ContainerConfig;
pub use di::{BeanRef, ClientProxy, Container, ContainerBuilder, Injectable, Instance, InstanceHandle};
pub use error::{CdiError, DeploymentError, Result};
pub use lifecycle::{DestructionReport, ShutdownHandler};

// Re-export macros
pub use meshestra_cdi_macro::Injectable as DeriveInjectable;

/// Prelude module for convenient imports
///
/// ```
/// use meshestra_cdi::prelude::*;
/// ```
pub mod prelude {
    pub use crate::DeriveInjectable as Injectable;
    pub use crate::bean::{
        BeanBuilder, BeanDeclaration, BeanFactory, BeanKind, BeanType, InjectionArgs,
        InjectionPoint, Qualifier, Scope,
    };
    pub use crate::config::ContainerConfig;
    pub use crate::context::{InjectableContext, RequestContext};
    pub use crate::di::{
        BeanRef, ClientProxy, Container, ContainerBuilder, Injectable, Instance, InstanceHandle,
    };
    pub use crate::error::{CdiError, DeploymentError, Result};
    pub use crate::intercept::{
        Decorator, DecoratorDeclaration, Interceptor, InterceptorBinding, InterceptorDeclaration,
        InvocationContext, InvocationResult, Next,
    };
    pub use crate::lifecycle::{DestructionReport, ShutdownHandler, shutdown_signal};
    pub use std::sync::Arc;
}
