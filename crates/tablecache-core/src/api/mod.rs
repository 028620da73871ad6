//! Remote endpoint client for the restaurant reviews REST service.
//!
//! This module provides the `RemoteEndpoint` trait consumed by the cache and
//! sync layers, and `HttpRemote`, its `reqwest` implementation.
//!
//! Every call is classified as success (status 200-299) or a `RemoteError`.

pub mod client;
pub mod error;

pub use client::{with_timeout, HttpRemote, RemoteEndpoint, Resource};
pub use error::RemoteError;
