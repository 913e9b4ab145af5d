mod scope;
mod types;

pub use scope::{ContextError, ContextGuard, RequestContext};
pub use types::SecurityContext;
