//! # reposync-forge
//!
//! Remote API access for mirror reconciliation.
//!
//! - [`source`]: [`SourceLister`] and the GitHub implementation
//! - [`destination`]: [`MirrorDestination`] and the Gitea implementation
//! - [`rate_limit`]: the token bucket gating source calls
//! - [`http`]: transport seam shared by both clients

pub mod destination;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod source;

pub use destination::{GiteaDestination, MirrorDestination, SourceCredentials};
pub use error::ForgeError;
pub use rate_limit::RateLimiter;
pub use source::{GithubSource, SourceLister};
