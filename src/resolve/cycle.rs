//! Detection of dependency cycles that no client proxy can break.

use super::Resolutions;
use crate::bean::{BeanDeclaration, BeanId, BeanRegistry, Scope};
use crate::error::CdiError;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// An edge is eager when creating the source must create the target first.
///
/// Normal-scoped targets are always reached through a client proxy, and so is a
/// singleton behind a proxied injection point.
fn is_eager(target: &BeanDeclaration, proxied: bool) -> bool {
    !target.scope().is_normal() && !(proxied && target.scope() == &Scope::Singleton)
}

fn eager_edges(registry: &BeanRegistry, resolutions: &Resolutions) -> HashMap<BeanId, Vec<BeanId>> {
    let mut edges: HashMap<BeanId, Vec<BeanId>> = HashMap::new();
    for bean in registry.beans() {
        let targets = edges.entry(bean.id().clone()).or_default();
        for resolution in resolutions.for_bean(bean.id()) {
            let Some(target) = resolution.resolved() else {
                continue;
            };
            if is_eager(target, resolution.injection_point().is_proxied()) {
                targets.push(target.id().clone());
            }
        }
        if let Some(declaring) = bean.declaring_bean().and_then(|id| registry.get(id)) {
            if !declaring.scope().is_normal() {
                targets.push(declaring.id().clone());
            }
        }
    }
    edges
}

/// Every distinct cycle of eager edges, self-injection included.
pub(crate) fn detect_cycles(registry: &BeanRegistry, resolutions: &Resolutions) -> Vec<CdiError> {
    let edges = eager_edges(registry, resolutions);
    let mut marks: HashMap<BeanId, Mark> = HashMap::new();
    let mut seen: HashSet<BTreeSet<BeanId>> = HashSet::new();
    let mut errors = Vec::new();

    for bean in registry.beans() {
        if marks.contains_key(bean.id()) {
            continue;
        }
        let mut path = Vec::new();
        visit(bean.id(), &edges, &mut marks, &mut path, &mut |cycle: &[BeanId]| {
            let members: BTreeSet<BeanId> = cycle.iter().cloned().collect();
            if seen.insert(members) {
                let rendered: Vec<&str> = cycle.iter().map(|id| id.as_ref()).collect();
                errors.push(CdiError::UnproxyableResolution {
                    message: format!(
                        "circular dependency with no normal-scoped bean to proxy: {} -> {}",
                        rendered.join(" -> "),
                        rendered[0]
                    ),
                });
            }
        });
    }
    errors
}

fn visit(
    bean: &BeanId,
    edges: &HashMap<BeanId, Vec<BeanId>>,
    marks: &mut HashMap<BeanId, Mark>,
    path: &mut Vec<BeanId>,
    report: &mut dyn FnMut(&[BeanId]),
) {
    marks.insert(bean.clone(), Mark::Visiting);
    path.push(bean.clone());
    for target in edges.get(bean).into_iter().flatten() {
        match marks.get(target) {
            Some(Mark::Visiting) => {
                if let Some(start) = path.iter().position(|id| id == target) {
                    report(&path[start..]);
                }
            }
            Some(Mark::Done) => {}
            None => visit(target, edges, marks, path, report),
        }
    }
    path.pop();
    marks.insert(bean.clone(), Mark::Done);
}
