//! Course authoring data layer.
//!
//! Courses, units, sections and tutoring assistants stored in a single
//! DynamoDB table (with the `GSI1` secondary index), section PDFs in S3, a
//! process-local read cache in front of every read, and a session facade that
//! hands the UI a hydrated course graph.

pub mod cache;
pub mod config;
pub mod dynamodb;
pub mod error;
pub mod keys;
pub mod logging;
pub mod model;
pub mod objects;
pub mod repository;
pub mod session;
pub mod utils;

#[cfg(test)]
mod tests;

pub use cache::{CacheKey, ReadCache};
pub use config::Settings;
pub use error::{RepositoryError, Result};
pub use repository::CourseRepository;
pub use session::CourseSession;
