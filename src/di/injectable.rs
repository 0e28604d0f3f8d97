use crate::bean::BeanBuilder;

/// Trait for types that declare themselves as beans
///
/// This trait is typically implemented automatically via the `#[derive(Injectable)]` macro.
///
/// # Example
/// ```rust,ignore
/// use meshestra_cdi::prelude::*;
/// use std::sync::Arc;
///
/// #[derive(Injectable)]
/// #[bean(scope = "singleton")]
/// pub struct OrderService {
///     // Resolved from the container when the bean is created
///     repository: Arc<OrderRepository>,
///     #[inject(optional)]
///     audit: Option<Arc<AuditLog>>,
/// }
///
/// let container = ContainerBuilder::new()
///     .injectable::<OrderRepository>()
///     .injectable::<OrderService>()
///     .build()?;
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// The bean declaration of this type, ready for registration.
    fn declaration() -> BeanBuilder<Self>;
}
