use super::factory::BeanFactory;
use super::qualifier::{self, Qualifier};
use super::scope::Scope;
use super::types::BeanType;
use crate::error::CdiError;
use crate::intercept::InterceptorBinding;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumIter};

/// Stable identifier of a bean within one deployment.
pub type BeanId = Arc<str>;

/// A constructed bean instance, type-erased.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// Turns an erased instance into a boxed `Arc<T>` for one exposed type `T`.
pub(crate) type Caster =
    Arc<dyn Fn(&AnyInstance) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BeanKind {
    Class,
    ProducerMethod,
    ProducerField,
    Synthetic,
}

impl BeanKind {
    pub fn is_producer(&self) -> bool {
        matches!(self, Self::ProducerMethod | Self::ProducerField)
    }
}

/// Where a resolved value is delivered on the owning bean.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum InjectionTarget {
    Constructor { position: usize },
    Field,
    Initializer { method: String, position: usize },
}

impl InjectionTarget {
    /// Constructor parameters are injected first, then fields, then initializers.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Constructor { .. } => 0,
            Self::Field => 1,
            Self::Initializer { .. } => 2,
        }
    }
}

/// A required (type, qualifiers) pair declared by a bean.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionPoint {
    name: String,
    target: InjectionTarget,
    required_type: BeanType,
    qualifiers: Vec<Qualifier>,
    required: bool,
    proxied: bool,
}

impl InjectionPoint {
    pub fn field(name: impl Into<String>, required_type: BeanType) -> Self {
        Self::new(name, InjectionTarget::Field, required_type)
    }

    pub fn constructor(position: usize, name: impl Into<String>, required_type: BeanType) -> Self {
        Self::new(name, InjectionTarget::Constructor { position }, required_type)
    }

    pub fn initializer(
        method: impl Into<String>,
        position: usize,
        name: impl Into<String>,
        required_type: BeanType,
    ) -> Self {
        let target = InjectionTarget::Initializer {
            method: method.into(),
            position,
        };
        Self::new(name, target, required_type)
    }

    fn new(name: impl Into<String>, target: InjectionTarget, required_type: BeanType) -> Self {
        Self {
            name: name.into(),
            target,
            required_type,
            qualifiers: Vec::new(),
            required: true,
            proxied: false,
        }
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// An optional point resolves to nothing instead of failing deployment.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Ask for a client proxy instead of a direct reference.
    pub fn proxied(mut self) -> Self {
        self.proxied = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &InjectionTarget {
        &self.target
    }

    pub fn required_type(&self) -> &BeanType {
        &self.required_type
    }

    /// Declared qualifiers, before `@Default` is implied.
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn required_qualifiers(&self) -> Vec<Qualifier> {
        qualifier::normalize_required(&self.qualifiers)
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_proxied(&self) -> bool {
        self.proxied
    }
}

/// One injectable component, immutable once the registry is closed.
#[derive(Clone)]
pub struct BeanDeclaration {
    pub(crate) id: BeanId,
    pub(crate) kind: BeanKind,
    pub(crate) implementation: &'static str,
    pub(crate) bean_types: Vec<BeanType>,
    pub(crate) declared_types: Vec<BeanType>,
    pub(crate) restricted_to: Option<Vec<BeanType>>,
    pub(crate) qualifiers: Vec<Qualifier>,
    pub(crate) scope: Scope,
    pub(crate) injection_points: Vec<InjectionPoint>,
    pub(crate) class_bindings: Vec<InterceptorBinding>,
    pub(crate) method_bindings: BTreeMap<String, Vec<InterceptorBinding>>,
    pub(crate) alternative: bool,
    pub(crate) priority: Option<i32>,
    pub(crate) default_bean: bool,
    pub(crate) vetoed: bool,
    pub(crate) viable_constructor: bool,
    pub(crate) declaring_bean: Option<BeanId>,
    pub(crate) factory: Option<Arc<dyn BeanFactory>>,
    pub(crate) casters: HashMap<TypeId, Caster>,
}

impl BeanDeclaration {
    pub fn id(&self) -> &BeanId {
        &self.id
    }

    pub fn kind(&self) -> BeanKind {
        self.kind
    }

    /// Rust type name of the constructed instance.
    pub fn implementation(&self) -> &'static str {
        self.implementation
    }

    pub fn bean_types(&self) -> &[BeanType] {
        &self.bean_types
    }

    /// Bean types before any `typed()` restriction.
    pub fn declared_types(&self) -> &[BeanType] {
        &self.declared_types
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn injection_points(&self) -> &[InjectionPoint] {
        &self.injection_points
    }

    pub fn injection_point(&self, name: &str) -> Option<&InjectionPoint> {
        self.injection_points.iter().find(|ip| ip.name == name)
    }

    pub fn class_bindings(&self) -> &[InterceptorBinding] {
        &self.class_bindings
    }

    pub fn method_bindings(&self) -> &BTreeMap<String, Vec<InterceptorBinding>> {
        &self.method_bindings
    }

    pub fn is_alternative(&self) -> bool {
        self.alternative
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub fn is_default_bean(&self) -> bool {
        self.default_bean
    }

    pub fn declaring_bean(&self) -> Option<&BeanId> {
        self.declaring_bean.as_ref()
    }

    pub fn factory(&self) -> Option<&Arc<dyn BeanFactory>> {
        self.factory.as_ref()
    }

    pub fn has_type(&self, required: &BeanType) -> bool {
        self.bean_types
            .iter()
            .any(|candidate| required.is_assignable_from(candidate))
    }

    pub(crate) fn has_declared_type(&self, required: &BeanType) -> bool {
        self.declared_types
            .iter()
            .any(|candidate| required.is_assignable_from(candidate))
    }

    /// View an instance of this bean as `Arc<T>`, if `T` is one of its exposed types.
    pub fn cast<T: ?Sized + Send + Sync + 'static>(&self, instance: &AnyInstance) -> Option<Arc<T>> {
        let caster = self.casters.get(&TypeId::of::<T>())?;
        let boxed = caster(instance)?;
        boxed.downcast::<Arc<T>>().ok().map(|arc| *arc)
    }

    /// Structural problems that make the declaration unusable.
    pub(crate) fn validate(&self) -> Vec<CdiError> {
        let mut errors = Vec::new();
        let mut problem = |message: String| {
            errors.push(CdiError::definition(format!("bean {}: {}", self.id, message)));
        };

        if self.bean_types.is_empty() {
            problem("declares no bean types".to_string());
        }
        if let Some(restricted) = &self.restricted_to {
            for ty in restricted {
                if !self.declared_types.contains(ty) {
                    problem(format!("typed() names {ty}, which is not one of its bean types"));
                }
            }
        }
        if self.factory.is_none() {
            let missing = match self.kind {
                BeanKind::Synthetic => "synthetic bean is missing its creation callback",
                BeanKind::ProducerMethod | BeanKind::ProducerField => {
                    "producer is missing its production callback"
                }
                BeanKind::Class => "class bean has no constructor callback",
            };
            problem(missing.to_string());
        }
        if self.kind.is_producer() && self.declaring_bean.is_none() {
            problem("producer has no declaring bean".to_string());
        }
        if !self.kind.is_producer() && self.declaring_bean.is_some() {
            problem("only producers may have a declaring bean".to_string());
        }

        let mut names = HashSet::new();
        for ip in &self.injection_points {
            if !names.insert(ip.name.as_str()) {
                problem(format!("injection point {} is declared twice", ip.name));
            }
        }

        let mut positions: Vec<usize> = self
            .injection_points
            .iter()
            .filter_map(|ip| match ip.target {
                InjectionTarget::Constructor { position } => Some(position),
                _ => None,
            })
            .collect();
        positions.sort_unstable();
        if positions.iter().enumerate().any(|(index, position)| index != *position) {
            problem(format!(
                "constructor parameter positions {positions:?} are not contiguous from 0"
            ));
        }
        if self.kind.is_producer()
            && self
                .injection_points
                .iter()
                .any(|ip| !matches!(ip.target, InjectionTarget::Constructor { .. }))
        {
            problem("producers only accept parameter injection points".to_string());
        }

        errors
    }
}

impl fmt::Debug for BeanDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDeclaration")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bean_types", &self.bean_types)
            .field("qualifiers", &self.qualifiers)
            .field("scope", &self.scope)
            .field("injection_points", &self.injection_points)
            .field("alternative", &self.alternative)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for BeanDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [scope={}, qualifiers={}]",
            self.kind,
            self.id,
            self.scope,
            qualifier::render(&self.qualifiers)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_only_producer_kinds_are_producers() {
        let producers: Vec<String> = BeanKind::iter()
            .filter(BeanKind::is_producer)
            .map(|kind| kind.to_string())
            .collect();
        assert_eq!(producers, vec!["PRODUCER_METHOD", "PRODUCER_FIELD"]);
    }

    #[test]
    fn test_injection_point_defaults_to_required() {
        let point = InjectionPoint::field("store", BeanType::named("Store"));
        assert!(point.is_required());
        assert!(!point.is_proxied());
        assert!(!point.optional().is_required());
    }
}
