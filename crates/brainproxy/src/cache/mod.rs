//! Server-side context cache: eligibility, process state and the builder.

mod builder;
mod policy;
mod state;

pub use builder::{CacheBuildError, CollectedContext, build_cache, collect_project};
pub use policy::{decide, model_family};
pub use state::{ActiveCache, CacheMode, CacheState};
