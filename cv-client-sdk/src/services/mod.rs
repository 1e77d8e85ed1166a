//! Service-specific client implementations
//!
//! This module contains the CV backend client and the endpoint discovery it
//! can use.

pub mod common;
pub mod cv_backend;
pub mod discovery;

pub use common::UserAgent;
pub use cv_backend::BackendClient;
pub use discovery::{EndpointResolver, Resolution, ResolvedEndpoint};
