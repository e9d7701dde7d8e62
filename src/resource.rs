//! Traits implemented by pooled resources and the factories that dial them

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Boxed error produced by resources and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A pooled resource, typically a multiplexed network client connection.
///
/// The pool never inspects a resource; it only shares it between borrowers
/// and closes it when the handle is replaced or the pool shuts down.
pub trait Resource: Send + Sync + 'static {
    /// Release the underlying connection.
    fn close(&self) -> Result<(), BoxError>;
}

/// Creates new resources for a pool.
///
/// Any `Fn(CancellationToken) -> impl Future<Output = Result<R, BoxError>>`
/// closure is a factory, so most callers never implement this by hand.
///
/// # Examples
///
/// ```
/// use roundpool::{BoxError, Resource, ResourceFactory};
/// use tokio_util::sync::CancellationToken;
///
/// struct Conn;
/// impl Resource for Conn {
///     fn close(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// fn assert_factory<F: ResourceFactory<Resource = Conn>>(_: F) {}
///
/// assert_factory(|_cancel: CancellationToken| async { Ok::<_, BoxError>(Conn) });
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The resource type produced.
    type Resource: Resource;

    /// Dial a new resource. Implementations should give up once `cancel` fires.
    async fn create(&self, cancel: &CancellationToken) -> Result<Self::Resource, BoxError>;
}

#[async_trait]
impl<F, Fut, R> ResourceFactory for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: Resource,
{
    type Resource = R;

    async fn create(&self, cancel: &CancellationToken) -> Result<R, BoxError> {
        (self)(cancel.clone()).await
    }
}
