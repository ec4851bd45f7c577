//! Boundary adapters
//!
//! Outbound: HTTP caller and documentation fetcher. Inbound: the
//! GraphQL surface and health endpoint.

pub mod docs_fetcher;
pub mod graphql;
pub mod health_handler;
pub mod http_caller;
