mod bean_ref;
mod builder;
pub(crate) mod container;
mod injectable;
mod instance;
mod proxy;

pub use bean_ref::BeanRef;
pub use builder::ContainerBuilder;
pub use container::Container;
pub use injectable::Injectable;
pub use instance::{Instance, InstanceHandle};
pub use proxy::{ClientProxy, ErasedProxy};
