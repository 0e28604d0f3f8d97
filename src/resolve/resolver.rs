use super::cycle;
use crate::bean::{
    BeanDeclaration, BeanId, BeanRegistry, BeanType, InjectionPoint, Qualifier, Scope,
    normalize_required, render_qualifiers,
};
use crate::error::{CdiError, DeploymentError, Result, UnsatisfiedReason};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The outcome of resolving one injection point.
#[derive(Debug, Clone)]
pub struct InjectionPointResolution {
    bean: Arc<BeanDeclaration>,
    injection_point: InjectionPoint,
    resolved: Option<Arc<BeanDeclaration>>,
}

impl InjectionPointResolution {
    pub fn bean(&self) -> &Arc<BeanDeclaration> {
        &self.bean
    }

    pub fn injection_point(&self) -> &InjectionPoint {
        &self.injection_point
    }

    /// `None` only for an optional point with no matching bean.
    pub fn resolved(&self) -> Option<&Arc<BeanDeclaration>> {
        self.resolved.as_ref()
    }
}

/// Every injection point resolution of a deployment, fixed once computed.
#[derive(Debug, Default)]
pub struct Resolutions {
    by_bean: HashMap<BeanId, Vec<InjectionPointResolution>>,
}

#[derive(Serialize)]
struct ResolutionSummary<'a> {
    injection_point: &'a str,
    required_type: String,
    qualifiers: String,
    resolved: Option<&'a str>,
}

impl Resolutions {
    pub fn get(&self, bean: &str, injection_point: &str) -> Option<&InjectionPointResolution> {
        self.for_bean(bean)
            .iter()
            .find(|resolution| resolution.injection_point.name() == injection_point)
    }

    pub fn for_bean(&self, bean: &str) -> &[InjectionPointResolution] {
        self.by_bean.get(bean).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InjectionPointResolution> {
        self.by_bean.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_bean.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the resolutions of beans removed after resolution.
    pub(crate) fn forget(&mut self, beans: &[BeanId]) {
        for bean in beans {
            self.by_bean.remove(bean);
        }
    }

    /// The resolved graph as JSON, keyed by bean id.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let graph: BTreeMap<&str, Vec<ResolutionSummary<'_>>> = self
            .by_bean
            .iter()
            .map(|(bean, resolutions)| {
                let summaries = resolutions
                    .iter()
                    .map(|resolution| ResolutionSummary {
                        injection_point: resolution.injection_point.name(),
                        required_type: resolution.injection_point.required_type().to_string(),
                        qualifiers: render_qualifiers(
                            &resolution.injection_point.required_qualifiers(),
                        ),
                        resolved: resolution.resolved.as_ref().map(|bean| bean.id().as_ref()),
                    })
                    .collect();
                (bean.as_ref(), summaries)
            })
            .collect();
        serde_json::to_string_pretty(&graph)
    }
}

/// Typesafe resolution of injection points against a closed registry.
pub struct Resolver<'r> {
    registry: &'r BeanRegistry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r BeanRegistry) -> Self {
        Self { registry }
    }

    /// Candidates for `required` left after ambiguity rules are applied.
    pub fn candidates(&self, required: &BeanType, qualifiers: &[Qualifier]) -> Vec<Arc<BeanDeclaration>> {
        resolve_ambiguity(self.registry.find_by_type_and_qualifiers(required, qualifiers))
    }

    pub fn resolve(
        &self,
        bean: &Arc<BeanDeclaration>,
        injection_point: &InjectionPoint,
    ) -> Result<InjectionPointResolution> {
        let target = format!("{}.{}", bean.id(), injection_point.name());
        let resolved = self.resolve_type(
            injection_point.required_type(),
            injection_point.qualifiers(),
            &target,
            injection_point.is_required(),
        )?;

        if let Some(resolved) = &resolved {
            if injection_point.is_proxied() && resolved.scope() == &Scope::Dependent {
                return Err(CdiError::UnproxyableResolution {
                    message: format!(
                        "injection point {target} asks for a client proxy of {}, which is Dependent",
                        resolved.id()
                    ),
                });
            }
        }

        Ok(InjectionPointResolution {
            bean: bean.clone(),
            injection_point: injection_point.clone(),
            resolved,
        })
    }

    /// Resolve a required type for `target`; `Ok(None)` only when not `required`.
    pub fn resolve_type(
        &self,
        required: &BeanType,
        qualifiers: &[Qualifier],
        target: &str,
        required_dependency: bool,
    ) -> Result<Option<Arc<BeanDeclaration>>> {
        let found = self.registry.find_by_type_and_qualifiers(required, qualifiers);
        if found.is_empty() {
            if !required_dependency {
                return Ok(None);
            }
            return Err(CdiError::UnsatisfiedResolution {
                required_type: required.to_string(),
                qualifiers: render_qualifiers(&normalize_required(qualifiers)),
                target: target.to_string(),
                reason: self.classify_unsatisfied(required, qualifiers),
            });
        }

        let mut remaining = resolve_ambiguity(found.clone());
        if remaining.len() == 1 {
            return Ok(remaining.pop());
        }
        let candidates = if remaining.is_empty() { found } else { remaining };
        Err(CdiError::AmbiguousResolution {
            required_type: required.to_string(),
            qualifiers: render_qualifiers(&normalize_required(qualifiers)),
            target: target.to_string(),
            candidates: candidates.iter().map(|bean| bean.to_string()).collect(),
        })
    }

    fn classify_unsatisfied(&self, required: &BeanType, qualifiers: &[Qualifier]) -> UnsatisfiedReason {
        let by_type = self.registry.find_by_type(required);
        if !by_type.is_empty() {
            return UnsatisfiedReason::QualifierMismatch {
                available: by_type.iter().map(|bean| bean.to_string()).collect(),
            };
        }
        if let Some(removed) = self.registry.find_removed(required, qualifiers).first() {
            return UnsatisfiedReason::Excluded {
                bean: removed.bean.id().to_string(),
                reason: removed.reason.clone(),
            };
        }
        if let Some(restricted) = self
            .registry
            .beans()
            .iter()
            .find(|bean| bean.has_declared_type(required))
        {
            return UnsatisfiedReason::RestrictedByTyped {
                bean: restricted.id().to_string(),
            };
        }
        UnsatisfiedReason::NoTypeMatch
    }

    /// Resolve every injection point of every bean, then check for cycles.
    ///
    /// All problems are collected before failing.
    pub fn resolve_all(&self) -> std::result::Result<Resolutions, DeploymentError> {
        let (resolutions, errors) = self.resolve_collecting();
        if errors.is_empty() {
            Ok(resolutions)
        } else {
            Err(DeploymentError::new(errors))
        }
    }

    pub(crate) fn resolve_collecting(&self) -> (Resolutions, Vec<CdiError>) {
        let mut resolutions = Resolutions::default();
        let mut errors = Vec::new();
        for bean in self.registry.beans() {
            let mut resolved = Vec::with_capacity(bean.injection_points().len());
            for injection_point in bean.injection_points() {
                match self.resolve(bean, injection_point) {
                    Ok(resolution) => resolved.push(resolution),
                    Err(e) => errors.push(e),
                }
            }
            resolutions.by_bean.insert(bean.id().clone(), resolved);
        }
        errors.extend(cycle::detect_cycles(self.registry, &resolutions));
        (resolutions, errors)
    }
}

/// Narrow matching beans to at most one when the rules allow it.
///
/// 1. Default beans are dropped if any other candidate remains.
/// 2. If any alternative remains, only alternatives are kept.
/// 3. Among alternatives only those with the highest priority are kept.
///
/// Priority on a bean that is not an alternative never disambiguates. More than
/// one survivor means the lookup is ambiguous.
pub fn resolve_ambiguity(candidates: Vec<Arc<BeanDeclaration>>) -> Vec<Arc<BeanDeclaration>> {
    if candidates.len() <= 1 {
        return candidates;
    }

    let mut remaining = candidates;
    if remaining.iter().any(|bean| !bean.is_default_bean()) {
        remaining.retain(|bean| !bean.is_default_bean());
    }
    if remaining.len() <= 1 {
        return remaining;
    }

    if !remaining.iter().any(|bean| bean.is_alternative()) {
        return remaining;
    }
    remaining.retain(|bean| bean.is_alternative());

    let highest = remaining.iter().filter_map(|bean| bean.priority()).max();
    if let Some(highest) = highest {
        remaining.retain(|bean| bean.priority() == Some(highest));
    }
    remaining
}
