//! Integration tests
//!
//! HTTP-facing tests use wiremock servers on the loopback interface and call
//! the engine directly, since the job service refuses loopback seeds. Service
//! tests use an in-memory site instead.

mod engine_tests;
mod fetcher_tests;
mod service_tests;
mod support;
