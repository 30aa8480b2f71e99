//! Infrastructure layer - Stores, services and runtime plumbing

pub mod key;
pub mod logging;
pub mod observability;
