use crate::context::HttpContext;
use crate::controller::Args;
use async_trait::async_trait;

pub mod builtins;

pub type PipeResult<T> = Result<T, PipeError>;

#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transformation failed: {0}")]
    Transformation(String),

    #[error("Internal pipe error: {0}")]
    Internal(String),
}

/// The Pipe trait for transformation and validation
///
/// Pipes run after the action's arguments are extracted and before the
/// action is invoked. Returning an error rejects the request with 400.
#[async_trait]
pub trait Pipe: Send + Sync + 'static {
    async fn transform(&self, ctx: &HttpContext, args: Args) -> PipeResult<Args>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Run `pipes` in order, feeding each one's output to the next.
pub(crate) async fn run_all(
    pipes: &[std::sync::Arc<dyn Pipe>],
    ctx: &HttpContext,
    mut args: Args,
) -> PipeResult<Args> {
    for pipe in pipes {
        args = pipe.transform(ctx, args).await?;
    }
    Ok(args)
}
