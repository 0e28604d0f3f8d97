use super::container::{Container, ContainerInner};
use super::injectable::Injectable;
use crate::bean::{BeanDeclaration, BeanId, BeanRegistry, QualifierRegistry, Scope};
use crate::config::ContainerConfig;
use crate::context::{GlobalContext, InjectableContext, RequestContext};
use crate::error::{CdiError, DeploymentError};
use crate::intercept::{
    BindingRegistry, Composer, DecoratorDeclaration, InterceptorBinding, InterceptorDeclaration,
};
use crate::resolve::Resolver;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Builder for deploying a container
///
/// Collects bean, interceptor and decorator declarations, then validates and
/// resolves everything at once in [`build`](Self::build). Every problem found
/// is reported together.
///
/// # Example
/// ```rust,ignore
/// let container = ContainerBuilder::new()
///     .bean(BeanBuilder::<Counter>::class("counter").scope(Scope::Singleton).constructor(|_| Ok(Counter::default())).build())
///     .injectable::<Service>()
///     .build()?;
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    qualifiers: QualifierRegistry,
    bindings: BindingRegistry,
    beans: Vec<BeanDeclaration>,
    interceptors: Vec<InterceptorDeclaration>,
    decorators: Vec<DecoratorDeclaration>,
    contexts: Vec<Arc<dyn InjectableContext>>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare a qualifier and the members ignored when comparing it.
    pub fn qualifier<I, S>(mut self, name: impl Into<String>, non_binding: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.qualifiers.declare(name, non_binding);
        self
    }

    /// Declare an interceptor binding and its non-binding members.
    pub fn binding<I, S>(mut self, name: impl Into<String>, non_binding: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bindings.declare(name, non_binding);
        self
    }

    /// `name` also brings `implied` wherever it is present.
    pub fn binding_implies(mut self, name: impl Into<String>, implied: InterceptorBinding) -> Self {
        self.bindings.implies(name, implied);
        self
    }

    /// At most one of `names` may apply to one bean or method.
    pub fn exclusive_bindings<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bindings.exclusive(names);
        self
    }

    pub fn bean(mut self, declaration: BeanDeclaration) -> Self {
        self.beans.push(declaration);
        self
    }

    pub fn injectable<T: Injectable>(self) -> Self {
        self.bean(T::declaration().build())
    }

    pub fn interceptor(mut self, interceptor: InterceptorDeclaration) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn decorator(mut self, decorator: DecoratorDeclaration) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Register the context of a custom scope.
    pub fn context(mut self, context: Arc<dyn InjectableContext>) -> Self {
        self.contexts.push(context);
        self
    }

    /// Validate, resolve and compose everything, then start the container.
    pub fn build(self) -> Result<Container, DeploymentError> {
        tracing::info!(
            "Deploying {} bean(s), {} interceptor(s), {} decorator(s)",
            self.beans.len(),
            self.interceptors.len(),
            self.decorators.len()
        );
        let mut errors = Vec::new();

        let mut custom: BTreeMap<Scope, Arc<dyn InjectableContext>> = BTreeMap::new();
        for context in self.contexts {
            let scope = context.scope();
            if !matches!(scope, Scope::Custom(_)) {
                errors.push(CdiError::definition(format!(
                    "built-in scope {scope} cannot be given a custom context"
                )));
            } else if custom.insert(scope.clone(), context).is_some() {
                errors.push(CdiError::definition(format!(
                    "more than one context registered for scope {scope}"
                )));
            }
        }

        let mut registry = BeanRegistry::with_qualifiers(self.qualifiers);
        for declaration in self.beans {
            let problems = declaration.validate();
            if let Scope::Custom(_) = declaration.scope() {
                if !custom.contains_key(declaration.scope()) {
                    errors.push(CdiError::definition(format!(
                        "bean {} has scope {} but no context is registered for it",
                        declaration.id(),
                        declaration.scope()
                    )));
                }
            }
            if !problems.is_empty() {
                errors.extend(problems);
                continue;
            }
            if let Err(e) = registry.register(declaration) {
                errors.push(e);
            }
        }
        for bean in registry.beans() {
            if let Some(declaring) = bean.declaring_bean() {
                if registry.get(declaring).is_none() {
                    errors.push(CdiError::definition(format!(
                        "producer {} is declared on unknown bean {declaring}",
                        bean.id()
                    )));
                }
            }
        }

        registry.close(&self.config);
        for removed in registry.removed_beans() {
            tracing::debug!("Bean {} removed: {}", removed.bean.id(), removed.reason);
        }

        let (mut resolutions, resolution_errors) = Resolver::new(&registry).resolve_collecting();
        errors.extend(resolution_errors);
        if self.config.remove_unused_beans {
            let injected: HashSet<BeanId> = resolutions
                .iter()
                .filter_map(|resolution| resolution.resolved())
                .map(|bean| bean.id().clone())
                .collect();
            let removed = registry.remove_unused(&injected, &self.config);
            resolutions.forget(&removed);
        }

        let composer = Composer::new(&self.bindings, &self.interceptors, &self.decorators, &registry);
        errors.extend(composer.validate());
        let (interceptions, composition_errors) = composer.compose_all();
        errors.extend(composition_errors);

        if !errors.is_empty() {
            for error in &errors {
                tracing::error!("{}", error);
            }
            let error = DeploymentError::new(errors);
            tracing::error!("Deployment failed with {} problem(s)", error.len());
            return Err(error);
        }

        let id = Uuid::new_v4();
        let inner = ContainerInner {
            id,
            config: self.config,
            registry,
            resolutions,
            bindings: self.bindings,
            interceptors: self.interceptors,
            decorators: self.decorators,
            interceptions,
            singleton: Arc::new(GlobalContext::singleton()),
            application: Arc::new(GlobalContext::application()),
            request: Arc::new(RequestContext::new(id)),
            custom,
            dependent_lookups: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            torn_down: AtomicBool::new(false),
        };
        tracing::info!(
            "Container {} deployed: {} bean(s), {} injection point(s), {} intercepted bean(s)",
            id,
            inner.registry.len(),
            inner.resolutions.len(),
            inner.interceptions.len()
        );
        Ok(Container::from_inner(Arc::new(inner)))
    }
}
