//! The seam between compiled handler chains and an HTTP server.

mod router;

pub use router::AxumTransport;

use crate::compiler::HandlerChain;
use crate::error::Result;
use crate::metadata::Method;

/// Per-verb route registration on an HTTP server.
pub trait Transport {
    /// Bind `chain` to `method` and `path`. Paths use `:name` parameters.
    fn register(&mut self, method: Method, path: &str, chain: HandlerChain) -> Result<()>;
}
