//! Shared CloudFormation custom-resource lifecycle primitives.
//!
//! This crate owns the request/response contracts and the deterministic
//! decisions of the lifecycle (status buckets, naming, result shaping). It
//! intentionally excludes AWS SDK and Lambda runtime concerns.

pub mod arn;
pub mod deadline;
pub mod error;
pub mod event;
pub mod poll;
pub mod response;
pub mod result;
pub mod stack;
