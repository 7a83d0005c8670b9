//! HTTP API: routing, authentication middleware, request sanitization and
//! error mapping for the Natours tour catalogue.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
pub mod sanitize;
