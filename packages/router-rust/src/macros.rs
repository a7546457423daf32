/// Implements a routed interface for `InvocationProxy<dyn Trait>`.
///
/// Each listed method forwards to [`InvocationProxy::invoke`](crate::InvocationProxy::invoke)
/// under its own name, so every call goes through selection, the decorator
/// pipeline, and the fallback policy. The interface must be an
/// `#[async_trait]` trait with `Send + Sync` as supertraits, its methods must
/// return `Result<T, E>` with `E: From<RoutingError>`, and arguments must be
/// `Clone + Send + Sync + 'static` because each attempt receives its own copy.
///
/// ```ignore
/// #[async_trait]
/// pub trait Greeter: Send + Sync {
///     async fn greet(&self, name: String) -> Result<String, GreetError>;
/// }
///
/// switchyard_router::route_methods! {
///     impl Greeter {
///         async fn greet(&self, name: String) -> Result<String, GreetError>;
///     }
/// }
///
/// let greeter: Arc<dyn Greeter> = Arc::new(proxy);
/// ```
#[macro_export]
macro_rules! route_methods {
    (
        impl $iface:ident {
            $(
                $(#[$meta:meta])*
                async fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty;
            )*
        }
    ) => {
        #[$crate::__private::async_trait]
        impl $iface for $crate::InvocationProxy<dyn $iface> {
            $(
                $(#[$meta])*
                async fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                    self.invoke(
                        ::std::stringify!($method),
                        move |service: ::std::sync::Arc<dyn $iface>| {
                            $(let $arg = ::std::clone::Clone::clone(&$arg);)*
                            async move { service.$method($($arg),*).await }
                        },
                    )
                    .await
                }
            )*
        }
    };
}
