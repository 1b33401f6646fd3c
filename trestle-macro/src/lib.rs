use proc_macro::TokenStream;

mod injectable;

/// Derive macro for making a struct constructible by the DI container
///
/// Every `Arc<T>` field becomes a dependency on `T`, in field order. Use
/// `#[inject(name = "...")]` to depend on a named key instead. Other fields
/// are filled with `Default::default()`.
///
/// # Example
/// ```ignore
/// use trestle::Injectable;
///
/// #[derive(Injectable)]
/// pub struct UserService {
///     repository: Arc<dyn UserRepository>,
///     #[inject(name = "audit.sink")]
///     audit: Arc<dyn AuditSink>,
///     hits: AtomicUsize,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}
