use super::binding::InterceptorBinding;
use super::chain::{InvocationContext, InvocationResult, Next};
use crate::bean::{BeanType, Qualifier};
use crate::error::CdiError;
use std::fmt;
use std::sync::Arc;

/// The Interceptor trait
///
/// Interceptors wrap business method invocations of every bean carrying all of
/// their bindings. Call `next.proceed(ctx)` to continue the chain.
///
/// # Example
/// ```rust,ignore
/// struct Logged;
///
/// impl Interceptor for Logged {
///     fn intercept(&self, ctx: &mut InvocationContext<'_>, mut next: Next<'_, '_>) -> InvocationResult {
///         tracing::info!("-> {}", ctx.method());
///         let result = next.proceed(ctx);
///         tracing::info!("<- {}", ctx.method());
///         result
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync + 'static {
    fn intercept(&self, ctx: &mut InvocationContext<'_>, next: Next<'_, '_>) -> InvocationResult;

    /// Called when the intercepted instance is destroyed.
    fn pre_destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A decorator implements business methods of the types it decorates and
/// forwards to `delegate`, the not yet decorated instance.
pub trait Decorator: Send + Sync + 'static {
    fn decorate(&self, ctx: &mut InvocationContext<'_>, delegate: Next<'_, '_>) -> InvocationResult;

    fn pre_destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type InterceptorFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Interceptor>> + Send + Sync>;
pub type DecoratorFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Decorator>> + Send + Sync>;

/// An enabled interceptor: its bindings, its priority and how to create it.
#[derive(Clone)]
pub struct InterceptorDeclaration {
    pub(crate) id: Arc<str>,
    pub(crate) bindings: Vec<InterceptorBinding>,
    pub(crate) priority: Option<i32>,
    pub(crate) factory: InterceptorFactory,
}

impl InterceptorDeclaration {
    pub fn new<I, F>(id: impl Into<Arc<str>>, factory: F) -> Self
    where
        I: Interceptor,
        F: Fn() -> anyhow::Result<I> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            bindings: Vec::new(),
            priority: None,
            factory: Arc::new(move || {
                let interceptor: Arc<dyn Interceptor> = Arc::new(factory()?);
                Ok(interceptor)
            }),
        }
    }

    pub fn binding(mut self, binding: InterceptorBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bindings(&self) -> &[InterceptorBinding] {
        &self.bindings
    }

    pub fn get_priority(&self) -> Option<i32> {
        self.priority
    }

    pub(crate) fn validate(&self, declared: impl Fn(&str) -> bool) -> Vec<CdiError> {
        let mut errors = Vec::new();
        if self.bindings.is_empty() {
            errors.push(CdiError::definition(format!(
                "interceptor {} declares no interceptor binding",
                self.id
            )));
        }
        if self.priority.is_none() {
            errors.push(CdiError::definition(format!(
                "interceptor {} is not enabled: it declares no priority",
                self.id
            )));
        }
        for binding in &self.bindings {
            if !declared(binding.name()) {
                errors.push(CdiError::definition(format!(
                    "interceptor {} uses undeclared interceptor binding {binding}",
                    self.id
                )));
            }
        }
        errors
    }
}

impl fmt::Debug for InterceptorDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorDeclaration")
            .field("id", &self.id)
            .field("bindings", &self.bindings)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// An enabled decorator and the delegate injection point it wraps.
#[derive(Clone)]
pub struct DecoratorDeclaration {
    pub(crate) id: Arc<str>,
    pub(crate) decorated_types: Vec<BeanType>,
    pub(crate) delegate_type: BeanType,
    pub(crate) delegate_qualifiers: Vec<Qualifier>,
    pub(crate) methods: Vec<String>,
    pub(crate) priority: Option<i32>,
    pub(crate) factory: DecoratorFactory,
}

impl DecoratorDeclaration {
    /// A decorator of `delegate_type`, which is also its first decorated type.
    pub fn new<D, F>(id: impl Into<Arc<str>>, delegate_type: BeanType, factory: F) -> Self
    where
        D: Decorator,
        F: Fn() -> anyhow::Result<D> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            decorated_types: vec![delegate_type.clone()],
            delegate_type,
            delegate_qualifiers: Vec::new(),
            methods: Vec::new(),
            priority: None,
            factory: Arc::new(move || {
                let decorator: Arc<dyn Decorator> = Arc::new(factory()?);
                Ok(decorator)
            }),
        }
    }

    pub fn decorates(mut self, decorated: BeanType) -> Self {
        if !self.decorated_types.contains(&decorated) {
            self.decorated_types.push(decorated);
        }
        self
    }

    pub fn delegate_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.delegate_qualifiers.push(qualifier);
        self
    }

    /// Restrict the decorator to the named business methods.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn delegate_type(&self) -> &BeanType {
        &self.delegate_type
    }

    pub fn get_priority(&self) -> Option<i32> {
        self.priority
    }

    /// Whether the decorator participates in invocations of `method`.
    pub fn decorates_method(&self, method: Option<&str>) -> bool {
        match method {
            _ if self.methods.is_empty() => true,
            Some(method) => self.methods.iter().any(|m| m == method),
            None => false,
        }
    }

    pub(crate) fn validate(&self) -> Vec<CdiError> {
        let mut errors = Vec::new();
        if self.priority.is_none() {
            errors.push(CdiError::definition(format!(
                "decorator {} is not enabled: it declares no priority",
                self.id
            )));
        }
        if !self
            .decorated_types
            .iter()
            .any(|decorated| decorated.is_assignable_from(&self.delegate_type))
        {
            errors.push(CdiError::definition(format!(
                "decorator {}: delegate type {} is not one of its decorated types",
                self.id, self.delegate_type
            )));
        }
        errors
    }
}

impl fmt::Debug for DecoratorDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorDeclaration")
            .field("id", &self.id)
            .field("delegate_type", &self.delegate_type)
            .field("methods", &self.methods)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
