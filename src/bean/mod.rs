//! Bean metadata: declarations, the types and qualifiers they are matched by,
//! and the registry that holds them for one deployment.

mod builder;
mod declaration;
mod factory;
mod qualifier;
mod registry;
mod scope;
mod types;

pub use builder::BeanBuilder;
pub use declaration::{
    AnyInstance, BeanDeclaration, BeanId, BeanKind, InjectionPoint, InjectionTarget,
};
pub use factory::{BeanFactory, FnFactory, InjectionArgs};
pub(crate) use factory::InjectedValue;
pub use qualifier::{
    ANY, DEFAULT, NAMED, NonBindingMembers, Qualifier, QualifierRegistry, normalize_bean_qualifiers,
    normalize_required,
};
pub use registry::{BeanRegistry, ExclusionReason, RemovedBean};
pub use scope::Scope;
pub use types::{BeanType, TypeArg};

pub(crate) use qualifier::render as render_qualifiers;
