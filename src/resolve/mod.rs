//! Resolution engine: turns every injection point into exactly one bean, or a
//! precise deployment error.

mod cycle;
mod resolver;

pub use resolver::{InjectionPointResolution, Resolutions, Resolver, resolve_ambiguity};
