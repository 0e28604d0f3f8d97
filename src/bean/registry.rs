use super::declaration::{BeanDeclaration, BeanId};
use super::qualifier::{self, Qualifier, QualifierRegistry};
use super::types::BeanType;
use crate::config::ContainerConfig;
use crate::error::{CdiError, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Why a registered bean was dropped before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExclusionReason {
    Vetoed,
    ExcludedByConfig { pattern: String },
    NoViableConstructor,
    DisabledAlternative,
    DeclaringBeanRemoved { declaring: String },
    /// Nothing injects the bean and removal of unused beans is enabled.
    Unused,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vetoed => f.write_str("vetoed"),
            Self::ExcludedByConfig { pattern } => {
                write!(f, "excluded by configuration pattern '{pattern}'")
            }
            Self::NoViableConstructor => f.write_str("no viable constructor"),
            Self::DisabledAlternative => {
                f.write_str("alternative without priority that is not selected")
            }
            Self::DeclaringBeanRemoved { declaring } => {
                write!(f, "declaring bean {declaring} was removed")
            }
            Self::Unused => f.write_str("unused"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemovedBean {
    pub bean: Arc<BeanDeclaration>,
    pub reason: ExclusionReason,
}

/// The complete set of bean declarations of one deployment.
///
/// Beans are registered while the registry is open. [`BeanRegistry::close`]
/// applies exclusion rules and freezes the set; lookups always return beans
/// in registration order.
#[derive(Debug, Default)]
pub struct BeanRegistry {
    beans: Vec<Arc<BeanDeclaration>>,
    index: HashMap<BeanId, usize>,
    removed: Vec<RemovedBean>,
    qualifiers: QualifierRegistry,
    closed: bool,
}

impl BeanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_qualifiers(qualifiers: QualifierRegistry) -> Self {
        Self {
            qualifiers,
            ..Self::default()
        }
    }

    pub fn register(&mut self, bean: BeanDeclaration) -> Result<()> {
        if self.closed {
            return Err(CdiError::definition(format!(
                "bean {} registered after the registry was closed",
                bean.id()
            )));
        }
        if self.index.contains_key(bean.id()) {
            return Err(CdiError::DuplicateBean {
                id: bean.id().to_string(),
            });
        }
        self.index.insert(bean.id().clone(), self.beans.len());
        self.beans.push(Arc::new(bean));
        Ok(())
    }

    /// Freeze the registry: inherit producer metadata, then drop excluded beans.
    pub fn close(&mut self, config: &ContainerConfig) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inherit_from_declaring_beans(config);

        let mut removed: HashMap<BeanId, ExclusionReason> = HashMap::new();
        for bean in &self.beans {
            if let Some(reason) = Self::exclusion(bean, config) {
                removed.insert(bean.id().clone(), reason);
            }
        }
        // producers go with their declaring bean, transitively
        loop {
            let mut changed = false;
            for bean in &self.beans {
                let (Some(declaring), false) = (bean.declaring_bean(), removed.contains_key(bean.id()))
                else {
                    continue;
                };
                if removed.contains_key(declaring) || !self.index.contains_key(declaring) {
                    let reason = ExclusionReason::DeclaringBeanRemoved {
                        declaring: declaring.to_string(),
                    };
                    removed.insert(bean.id().clone(), reason);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.beans)
            .into_iter()
            .partition(|bean| !removed.contains_key(bean.id()));
        for bean in dropped {
            if let Some(reason) = removed.remove(bean.id()) {
                tracing::debug!("Removed bean {}: {}", bean.id(), reason);
                self.removed.push(RemovedBean { bean, reason });
            }
        }
        self.beans = kept;
        self.reindex();
    }

    /// Drop beans no injection point resolved to; returns their ids.
    ///
    /// Named beans, beans matching `unremovable_types` and beans declaring a
    /// used producer stay. A bean that is not used itself and declares only
    /// unused producers goes with them.
    pub fn remove_unused(&mut self, injected: &HashSet<BeanId>, config: &ContainerConfig) -> Vec<BeanId> {
        let kept = |bean: &Arc<BeanDeclaration>| {
            injected.contains(bean.id())
                || bean.qualifiers().iter().any(Qualifier::is_named)
                || config.is_unremovable(bean)
        };
        let mut removable: Vec<BeanId> = Vec::new();
        let mut unused_producers: HashSet<BeanId> = HashSet::new();
        for bean in &self.beans {
            if kept(bean) {
                continue;
            }
            let declares_producer = self
                .beans
                .iter()
                .any(|other| other.declaring_bean() == Some(bean.id()));
            if declares_producer {
                continue;
            }
            if bean.kind().is_producer() {
                unused_producers.insert(bean.id().clone());
            }
            removable.push(bean.id().clone());
        }
        for bean in &self.beans {
            if removable.contains(bean.id()) || kept(bean) {
                continue;
            }
            let mut producers = self
                .beans
                .iter()
                .filter(|other| other.declaring_bean() == Some(bean.id()))
                .peekable();
            if producers.peek().is_some()
                && producers.all(|producer| unused_producers.contains(producer.id()))
            {
                removable.push(bean.id().clone());
            }
        }
        if removable.is_empty() {
            return removable;
        }

        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.beans)
            .into_iter()
            .partition(|bean| !removable.contains(bean.id()));
        for bean in dropped {
            tracing::debug!("Removed unused bean {}", bean.id());
            self.removed.push(RemovedBean {
                bean,
                reason: ExclusionReason::Unused,
            });
        }
        self.beans = kept;
        self.reindex();
        tracing::debug!("Removed {} unused bean(s)", removable.len());
        removable
    }

    fn reindex(&mut self) {
        self.index = self
            .beans
            .iter()
            .enumerate()
            .map(|(position, bean)| (bean.id().clone(), position))
            .collect();
    }

    fn inherit_from_declaring_beans(&mut self, config: &ContainerConfig) {
        let declaring: HashMap<BeanId, (bool, Option<i32>)> = self
            .beans
            .iter()
            .map(|bean| (bean.id().clone(), (bean.is_alternative(), bean.priority())))
            .collect();

        for bean in &mut self.beans {
            let inherited = bean
                .declaring_bean()
                .and_then(|id| declaring.get(id))
                .copied();
            let selected = config.selected_alternative_position(bean);
            if inherited.is_none() && selected.is_none() {
                continue;
            }
            let bean = Arc::make_mut(bean);
            if let Some((alternative, priority)) = inherited {
                if !bean.alternative && alternative {
                    bean.alternative = true;
                }
                if bean.priority.is_none() {
                    bean.priority = priority;
                }
            }
            if let Some(position) = selected {
                if bean.alternative && bean.priority.is_none() {
                    // earlier entries in the config win
                    bean.priority = Some(i32::MAX - position as i32);
                }
            }
        }
    }

    fn exclusion(bean: &BeanDeclaration, config: &ContainerConfig) -> Option<ExclusionReason> {
        if bean.vetoed {
            return Some(ExclusionReason::Vetoed);
        }
        if let Some(pattern) = config.exclusion_pattern(bean) {
            return Some(ExclusionReason::ExcludedByConfig {
                pattern: pattern.to_string(),
            });
        }
        if !bean.viable_constructor && !bean.kind().is_producer() {
            return Some(ExclusionReason::NoViableConstructor);
        }
        if bean.alternative && bean.priority.is_none() {
            return Some(ExclusionReason::DisabledAlternative);
        }
        None
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<BeanDeclaration>> {
        self.index.get(id).map(|position| &self.beans[*position])
    }

    pub fn beans(&self) -> &[Arc<BeanDeclaration>] {
        &self.beans
    }

    pub fn removed_beans(&self) -> &[RemovedBean] {
        &self.removed
    }

    pub fn qualifiers(&self) -> &QualifierRegistry {
        &self.qualifiers
    }

    pub fn find_by_type(&self, required: &BeanType) -> Vec<Arc<BeanDeclaration>> {
        self.beans
            .iter()
            .filter(|bean| bean.has_type(required))
            .cloned()
            .collect()
    }

    /// Beans assignable to `required` that carry every required qualifier.
    ///
    /// An empty `qualifiers` slice requires `@Default`.
    pub fn find_by_type_and_qualifiers(
        &self,
        required: &BeanType,
        qualifiers: &[Qualifier],
    ) -> Vec<Arc<BeanDeclaration>> {
        let required_qualifiers = qualifier::normalize_required(qualifiers);
        self.beans
            .iter()
            .filter(|bean| bean.has_type(required))
            .filter(|bean| self.qualifiers.has_all(&required_qualifiers, bean.qualifiers()))
            .cloned()
            .collect()
    }

    /// Removed beans that would otherwise have matched.
    pub(crate) fn find_removed(
        &self,
        required: &BeanType,
        qualifiers: &[Qualifier],
    ) -> Vec<&RemovedBean> {
        let required_qualifiers = qualifier::normalize_required(qualifiers);
        self.removed
            .iter()
            .filter(|removed| removed.bean.has_declared_type(required))
            .filter(|removed| {
                self.qualifiers
                    .has_all(&required_qualifiers, removed.bean.qualifiers())
            })
            .collect()
    }
}
