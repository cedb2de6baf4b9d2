//! # forgekit
//!
//! GitHub and GitLab providers for the `declarative` engine.
//!
//! | Provider           | Resource types                                        |
//! |--------------------|-------------------------------------------------------|
//! | [`GitHubProvider`] | `github_repository`, `github_branch_protection`,      |
//! |                    | `github_issue_label`, `github_actions_secret`         |
//! | [`GitLabProvider`] | `gitlab_project`, `gitlab_group` (lookup only)        |
//!
//! Both talk blocking REST over a shared [`client::RestClient`] and map HTTP
//! failures onto [`declarative::ApiError`]: 404 is not-found, 408/429/5xx,
//! network failures, timeouts and exhausted rate limits are transient, any
//! other 4xx is permanent.
//!
//! ## Example
//!
//! ```no_run
//! use declarative::ProviderSet;
//! use forgekit::{GitHubProvider, GitLabProvider};
//!
//! let providers = ProviderSet::new()
//!     .with(GitHubProvider::new("ghp_token", "softwaredevelop"))
//!     .with(GitLabProvider::new("glpat_token"));
//! ```

pub mod client;
pub mod convert;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod seal;

pub use client::{Auth, DEFAULT_TIMEOUT, RestClient};
pub use error::{Error, ErrorCategory, Result};
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
