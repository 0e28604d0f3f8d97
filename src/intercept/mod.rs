mod binding;
mod chain;
mod composer;
mod interceptor;

pub use binding::{BindingRegistry, InterceptorBinding};
pub use chain::{BoundInterception, InvocationContext, InvocationResult, InvocationTarget, Next};
pub use composer::{BeanInterception, Composer, InterceptionChain, InvocationStep};
pub use interceptor::{
    Decorator, DecoratorDeclaration, DecoratorFactory, Interceptor, InterceptorDeclaration,
    InterceptorFactory,
};
