//! Route handler contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{ApiResponse, RequestContext, RequestHandlerError};

/// Business logic behind a route.
///
/// Plain closures `Fn(&mut RequestContext) -> Result<ApiResponse, RequestHandlerError>`
/// implement this trait; implement it by hand when the handler needs to await.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext) -> Result<ApiResponse, RequestHandlerError>;
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(&mut RequestContext) -> Result<ApiResponse, RequestHandlerError> + Send + Sync,
{
    async fn call(&self, ctx: &mut RequestContext) -> Result<ApiResponse, RequestHandlerError> {
        self(ctx)
    }
}

pub type BoxedHandler = Arc<dyn Handler>;
