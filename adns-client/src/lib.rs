mod answer;
mod cache;
mod config;
mod core;
pub mod dns;
mod query;
mod resolver;
mod timeout;
mod transport;

pub use crate::answer::Answer;
pub use crate::config::ResolverConfig;
pub use crate::core::{ErrorKind, ResolveError};
pub use crate::query::{QueryFlags, QueryHandle};
pub use crate::resolver::Resolver;
pub use crate::timeout::{Timed, Timeout};
