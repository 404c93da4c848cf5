//! # lg-client
//!
//! [`HttpBackend`] implements both [`EpisodeBackend`] and [`AnalysisBackend`]
//! over the dashboard's JSON API, using a blocking `reqwest` client with a
//! bearer token and a per-request timeout taken from [`BackendConfig`].
//!
//! [`EpisodeBackend`]: lg_episode::EpisodeBackend
//! [`AnalysisBackend`]: lg_workflow::AnalysisBackend
//! [`BackendConfig`]: lg_workflow::BackendConfig

pub mod error;
pub mod http;

pub use error::ClientError;
pub use http::HttpBackend;
