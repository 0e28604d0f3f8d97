use super::binding::{BindingRegistry, InterceptorBinding};
use super::interceptor::{DecoratorDeclaration, InterceptorDeclaration};
use crate::bean::{BeanDeclaration, BeanId, BeanKind, BeanRegistry};
use crate::error::{CdiError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One step of a composed chain. Indices point into the container's interceptor
/// and decorator declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationStep {
    Interceptor { id: Arc<str>, index: usize },
    Decorator { id: Arc<str>, index: usize },
    Target,
}

/// Ordered steps for one business method (or the class-level default).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptionChain {
    bindings: Vec<InterceptorBinding>,
    steps: Vec<InvocationStep>,
}

impl InterceptionChain {
    pub fn bindings(&self) -> &[InterceptorBinding] {
        &self.bindings
    }

    /// Interceptors by priority, then decorators, then the target.
    pub fn steps(&self) -> &[InvocationStep] {
        &self.steps
    }

    /// Ids of the interceptors and decorators, outermost first.
    pub fn ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                InvocationStep::Interceptor { id, .. } | InvocationStep::Decorator { id, .. } => {
                    Some(id.as_ref())
                }
                InvocationStep::Target => None,
            })
            .collect()
    }

    fn is_trivial(&self) -> bool {
        self.steps.iter().all(|step| step == &InvocationStep::Target)
    }
}

/// Composed chains of one bean, fixed for the deployment.
#[derive(Debug, Clone, Default)]
pub struct BeanInterception {
    class_chain: InterceptionChain,
    method_chains: BTreeMap<String, InterceptionChain>,
}

impl BeanInterception {
    pub fn class_chain(&self) -> &InterceptionChain {
        &self.class_chain
    }

    pub fn chain_for(&self, method: &str) -> &InterceptionChain {
        self.method_chains.get(method).unwrap_or(&self.class_chain)
    }

    pub fn method_chains(&self) -> &BTreeMap<String, InterceptionChain> {
        &self.method_chains
    }

    pub(crate) fn all_steps(&self) -> impl Iterator<Item = &InvocationStep> {
        self.class_chain
            .steps
            .iter()
            .chain(self.method_chains.values().flat_map(|chain| chain.steps.iter()))
    }

    fn is_trivial(&self) -> bool {
        self.class_chain.is_trivial() && self.method_chains.values().all(InterceptionChain::is_trivial)
    }
}

/// Orders enabled interceptors and decorators into per-bean chains.
pub struct Composer<'a> {
    bindings: &'a BindingRegistry,
    interceptors: &'a [InterceptorDeclaration],
    decorators: &'a [DecoratorDeclaration],
    registry: &'a BeanRegistry,
}

impl<'a> Composer<'a> {
    pub fn new(
        bindings: &'a BindingRegistry,
        interceptors: &'a [InterceptorDeclaration],
        decorators: &'a [DecoratorDeclaration],
        registry: &'a BeanRegistry,
    ) -> Self {
        Self {
            bindings,
            interceptors,
            decorators,
            registry,
        }
    }

    /// Problems with the interceptor and decorator declarations themselves.
    pub fn validate(&self) -> Vec<CdiError> {
        let mut errors = Vec::new();
        let mut ids = BTreeSet::new();
        for interceptor in self.interceptors {
            if !ids.insert(interceptor.id()) {
                errors.push(CdiError::DuplicateBean {
                    id: interceptor.id().to_string(),
                });
            }
            errors.extend(interceptor.validate(|name| self.bindings.is_declared(name)));
        }
        for decorator in self.decorators {
            if !ids.insert(decorator.id()) {
                errors.push(CdiError::DuplicateBean {
                    id: decorator.id().to_string(),
                });
            }
            errors.extend(decorator.validate());
        }
        errors
    }

    /// Chains for `bean`, or `None` when nothing applies to it.
    pub fn compose_chain(&self, bean: &BeanDeclaration) -> Result<Option<BeanInterception>> {
        let has_bindings = !bean.class_bindings().is_empty() || !bean.method_bindings().is_empty();
        if bean.kind() != BeanKind::Class {
            if has_bindings {
                tracing::warn!(
                    "Interceptor bindings on {} bean {} are ignored",
                    bean.kind(),
                    bean.id()
                );
            }
            return Ok(None);
        }

        for binding in bean
            .class_bindings()
            .iter()
            .chain(bean.method_bindings().values().flatten())
        {
            if !self.bindings.is_declared(binding.name()) {
                return Err(CdiError::definition(format!(
                    "bean {} uses undeclared interceptor binding {binding}",
                    bean.id()
                )));
            }
        }

        let decorators = self.applicable_decorators(bean);
        let class_bindings = self.bindings.expand(bean.class_bindings());
        let class_chain = self.chain(bean, None, class_bindings, &decorators)?;

        let mut methods: BTreeSet<&str> = bean.method_bindings().keys().map(String::as_str).collect();
        for (_, decorator) in &decorators {
            methods.extend(decorator.methods.iter().map(String::as_str));
        }
        let mut method_chains = BTreeMap::new();
        for method in methods {
            let bindings = self.bindings.merge(
                bean.class_bindings(),
                bean.method_bindings().get(method).map(Vec::as_slice).unwrap_or_default(),
            );
            let chain = self.chain(bean, Some(method), bindings, &decorators)?;
            if chain != class_chain {
                method_chains.insert(method.to_string(), chain);
            }
        }

        let interception = BeanInterception {
            class_chain,
            method_chains,
        };
        Ok((!interception.is_trivial()).then_some(interception))
    }

    /// Compose every bean of the registry, collecting all definition errors.
    pub fn compose_all(&self) -> (HashMap<BeanId, Arc<BeanInterception>>, Vec<CdiError>) {
        let mut chains = HashMap::new();
        let mut errors = Vec::new();
        for bean in self.registry.beans() {
            match self.compose_chain(bean) {
                Ok(Some(interception)) => {
                    tracing::debug!(
                        "Composed interception for {}: {:?}",
                        bean.id(),
                        interception.class_chain().ids()
                    );
                    chains.insert(bean.id().clone(), Arc::new(interception));
                }
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }
        (chains, errors)
    }

    fn chain(
        &self,
        bean: &BeanDeclaration,
        method: Option<&str>,
        bindings: Vec<InterceptorBinding>,
        decorators: &[(usize, &DecoratorDeclaration)],
    ) -> Result<InterceptionChain> {
        let conflicts = self.bindings.conflicts(&bindings);
        if !conflicts.is_empty() {
            let location = match method {
                Some(method) => format!("{}::{method}", bean.id()),
                None => bean.id().to_string(),
            };
            return Err(CdiError::definition(format!(
                "conflicting interceptor bindings on {location}: {}",
                conflicts.join("; ")
            )));
        }

        let mut interceptors: Vec<(i32, usize, &InterceptorDeclaration)> = self
            .interceptors
            .iter()
            .enumerate()
            .filter(|(_, interceptor)| !interceptor.bindings().is_empty())
            .filter(|(_, interceptor)| {
                interceptor.bindings().iter().all(|required| {
                    bindings
                        .iter()
                        .any(|present| self.bindings.matches(required, present))
                })
            })
            .filter_map(|(index, interceptor)| {
                interceptor
                    .get_priority()
                    .map(|priority| (priority, index, interceptor))
            })
            .collect();
        interceptors.sort_by_key(|(priority, index, _)| (*priority, *index));

        let mut method_decorators: Vec<(i32, usize, &DecoratorDeclaration)> = decorators
            .iter()
            .filter(|(_, decorator)| decorator.decorates_method(method))
            .filter_map(|(index, decorator)| {
                decorator
                    .get_priority()
                    .map(|priority| (priority, *index, *decorator))
            })
            .collect();
        method_decorators.sort_by_key(|(priority, index, _)| (*priority, *index));

        let mut steps: Vec<InvocationStep> = interceptors
            .into_iter()
            .map(|(_, index, interceptor)| InvocationStep::Interceptor {
                id: interceptor.id.clone(),
                index,
            })
            .collect();
        steps.extend(method_decorators.into_iter().map(|(_, index, decorator)| {
            InvocationStep::Decorator {
                id: decorator.id.clone(),
                index,
            }
        }));
        steps.push(InvocationStep::Target);

        Ok(InterceptionChain { bindings, steps })
    }

    fn applicable_decorators(&self, bean: &BeanDeclaration) -> Vec<(usize, &'a DecoratorDeclaration)> {
        self.decorators
            .iter()
            .enumerate()
            .filter(|(_, decorator)| {
                bean.has_type(decorator.delegate_type())
                    && self
                        .registry
                        .qualifiers()
                        .has_all(&crate::bean::normalize_required(&decorator.delegate_qualifiers), bean.qualifiers())
            })
            .collect()
    }
}
