use super::composer::{BeanInterception, InvocationStep};
use super::interceptor::{Decorator, DecoratorDeclaration, Interceptor, InterceptorDeclaration};
use crate::bean::{AnyInstance, BeanDeclaration};
use crate::error::{CdiError, Result};
use crate::lifecycle::{DestructionError, DestructionPhase, DestructionReport, contain_panic};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// standard return type for interceptors, decorators and intercepted bodies
pub type InvocationResult = anyhow::Result<Box<dyn Any + Send>>;

/// The intercepted call, as seen by every step of the chain.
pub struct InvocationContext<'a> {
    bean: &'a BeanDeclaration,
    method: &'a str,
    parameters: Vec<Box<dyn Any + Send>>,
    target: &'a AnyInstance,
    data: HashMap<String, serde_json::Value>,
}

impl<'a> InvocationContext<'a> {
    pub(crate) fn new(
        bean: &'a BeanDeclaration,
        method: &'a str,
        parameters: Vec<Box<dyn Any + Send>>,
        target: &'a AnyInstance,
    ) -> Self {
        Self {
            bean,
            method,
            parameters,
            target,
            data: HashMap::new(),
        }
    }

    pub fn bean(&self) -> &BeanDeclaration {
        self.bean
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn parameters(&self) -> &[Box<dyn Any + Send>] {
        &self.parameters
    }

    pub fn parameter<P: Any>(&self, index: usize) -> Option<&P> {
        self.parameters.get(index)?.downcast_ref::<P>()
    }

    /// Replace a parameter before proceeding.
    pub fn set_parameter<P: Any + Send>(&mut self, index: usize, value: P) -> bool {
        match self.parameters.get_mut(index) {
            Some(slot) => {
                *slot = Box::new(value);
                true
            }
            None => false,
        }
    }

    /// The raw target instance, bypassing the chain.
    pub fn target<T: Any>(&self) -> Option<&T> {
        (**self.target).downcast_ref::<T>()
    }

    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
        &mut self.data
    }
}

pub(crate) enum BoundStep<'c> {
    Interceptor(&'c dyn Interceptor),
    Decorator(&'c dyn Decorator),
}

/// The intercepted body at the end of a chain.
pub type InvocationTarget<'c> = dyn FnMut(&mut InvocationContext<'_>) -> InvocationResult + 'c;

/// Represents the rest of the chain after the current step
///
/// `proceed` may be called more than once, so a retrying interceptor simply
/// proceeds again after a failure.
pub struct Next<'c, 'f> {
    steps: &'f [BoundStep<'f>],
    target: &'f mut InvocationTarget<'c>,
}

impl<'c, 'f> Next<'c, 'f> {
    pub(crate) fn new(steps: &'f [BoundStep<'f>], target: &'f mut InvocationTarget<'c>) -> Self {
        Self { steps, target }
    }

    /// Run the remaining steps and the target
    pub fn proceed(&mut self, ctx: &mut InvocationContext<'_>) -> InvocationResult {
        match self.steps.split_first() {
            None => (self.target)(ctx),
            Some((step, rest)) => {
                let next = Next {
                    steps: rest,
                    target: &mut *self.target,
                };
                match step {
                    BoundStep::Interceptor(interceptor) => interceptor.intercept(ctx, next),
                    BoundStep::Decorator(decorator) => decorator.decorate(ctx, next),
                }
            }
        }
    }
}

/// Interceptor and decorator instances created for one intercepted instance.
pub struct BoundInterception {
    plan: Arc<BeanInterception>,
    interceptors: BTreeMap<usize, (Arc<str>, Arc<dyn Interceptor>)>,
    decorators: BTreeMap<usize, (Arc<str>, Arc<dyn Decorator>)>,
}

impl BoundInterception {
    pub(crate) fn bind(
        plan: Arc<BeanInterception>,
        interceptors: &[InterceptorDeclaration],
        decorators: &[DecoratorDeclaration],
    ) -> Result<Self> {
        let mut bound = Self {
            plan,
            interceptors: BTreeMap::new(),
            decorators: BTreeMap::new(),
        };
        let steps: Vec<InvocationStep> = bound.plan.all_steps().cloned().collect();
        for step in steps {
            match step {
                InvocationStep::Interceptor { index, .. } if !bound.interceptors.contains_key(&index) => {
                    let declaration = interceptors.get(index).ok_or_else(|| {
                        CdiError::Internal(format!("unknown interceptor index {index}"))
                    })?;
                    let instance = contain_panic(|| (declaration.factory)()).map_err(|e| {
                        CdiError::creation(format!("interceptor {}", declaration.id), e)
                    })?;
                    bound.interceptors.insert(index, (declaration.id.clone(), instance));
                }
                InvocationStep::Decorator { index, .. } if !bound.decorators.contains_key(&index) => {
                    let declaration = decorators.get(index).ok_or_else(|| {
                        CdiError::Internal(format!("unknown decorator index {index}"))
                    })?;
                    let instance = contain_panic(|| (declaration.factory)()).map_err(|e| {
                        CdiError::creation(format!("decorator {}", declaration.id), e)
                    })?;
                    bound.decorators.insert(index, (declaration.id.clone(), instance));
                }
                _ => {}
            }
        }
        Ok(bound)
    }

    pub fn plan(&self) -> &BeanInterception {
        &self.plan
    }

    /// Run `method` through its chain, ending in `target`.
    pub fn invoke(
        &self,
        ctx: &mut InvocationContext<'_>,
        target: &mut InvocationTarget<'_>,
    ) -> InvocationResult {
        let chain = self.plan.chain_for(ctx.method());
        let steps: Vec<BoundStep<'_>> = chain
            .steps()
            .iter()
            .filter_map(|step| match step {
                InvocationStep::Interceptor { index, .. } => self
                    .interceptors
                    .get(index)
                    .map(|(_, instance)| BoundStep::Interceptor(instance.as_ref())),
                InvocationStep::Decorator { index, .. } => self
                    .decorators
                    .get(index)
                    .map(|(_, instance)| BoundStep::Decorator(instance.as_ref())),
                InvocationStep::Target => None,
            })
            .collect();
        Next::new(&steps, target).proceed(ctx)
    }

    /// Tear down decorators, then interceptors, newest first.
    pub(crate) fn destroy(&self, bean: &str, report: &mut DestructionReport) {
        for (id, decorator) in self.decorators.values().rev() {
            if let Err(cause) = contain_panic(|| decorator.pre_destroy()) {
                report.record_failure(DestructionError::new(
                    bean,
                    DestructionPhase::Decorator { decorator: id.to_string() },
                    cause,
                ));
            }
        }
        for (id, interceptor) in self.interceptors.values().rev() {
            if let Err(cause) = contain_panic(|| interceptor.pre_destroy()) {
                report.record_failure(DestructionError::new(
                    bean,
                    DestructionPhase::Interceptor { interceptor: id.to_string() },
                    cause,
                ));
            }
        }
    }
}
