//! AWS-oriented adapters and handlers for CloudFormation custom resources.
//!
//! This crate owns runtime integration details (the lifecycle coordinator,
//! resource providers, callback delivery, poll scheduling and AWS service
//! adapters). Contracts and lifecycle decisions live in `cfn_lifecycle_core`.

pub mod adapters;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod runtime;
