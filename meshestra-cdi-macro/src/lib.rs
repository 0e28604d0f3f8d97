use proc_macro::TokenStream;

mod injectable;

/// Derive macro declaring a struct as a bean
///
/// Every field is an injection point unless marked `#[inject(skip)]`, in which
/// case it is initialized with `Default::default()`. Supported field types are
/// `Arc<T>`, `BeanRef<T>`, `ClientProxy<T>` and `Option` of any of them for
/// optional injection points.
///
/// # Example
/// ```ignore
/// use meshestra_cdi::prelude::*;
///
/// #[derive(Injectable)]
/// #[bean(id = "orders", scope = "application", binding = "Logged", pre_destroy = "close")]
/// pub struct OrderService {
///     repository: Arc<dyn OrderRepository>,
///     #[inject(named = "audit")]
///     audit: ClientProxy<AuditLog>,
///     #[inject(optional)]
///     metrics: Option<Arc<Metrics>>,
/// }
/// ```
///
/// Struct attributes (`#[bean(..)]`): `id`, `scope`, `qualifier`, `named`,
/// `alternative`, `priority`, `default_bean`, `binding`, `post_construct`,
/// `pre_destroy`, `expose(dyn Trait)`.
///
/// Field attributes (`#[inject(..)]`): `qualifier`, `named`, `optional`, `skip`.
#[proc_macro_derive(Injectable, attributes(bean, inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}
