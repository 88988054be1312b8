//! Shared mocks, fixtures and setup for the integration tests.

pub mod mocks;
pub mod setup;
