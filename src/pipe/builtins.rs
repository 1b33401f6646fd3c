use crate::context::HttpContext;
use crate::controller::Args;
use crate::pipe::{Pipe, PipeError, PipeResult};
use async_trait::async_trait;

/// A pipe that rejects requests missing any bound path or query value
#[derive(Default)]
pub struct RequireParamsPipe;

#[async_trait]
impl Pipe for RequireParamsPipe {
    async fn transform(&self, _ctx: &HttpContext, args: Args) -> PipeResult<Args> {
        let missing: Vec<&str> = (0..args.len())
            .filter(|&i| args.get(i).is_some_and(|v| v.is_null()))
            .filter_map(|i| args.key(i))
            .filter(|key| !key.is_empty())
            .collect();
        if !missing.is_empty() {
            return Err(PipeError::Validation(format!(
                "missing required parameters: {}",
                missing.join(", ")
            )));
        }
        Ok(args)
    }
}
