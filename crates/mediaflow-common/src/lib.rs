//! Mediaflow-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across mediaflow:
//!
//! - **Typed IDs**: Type-safe UUID wrappers for assets, jobs, locators, etc.
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use mediaflow_common::{AssetId, Error, Result};
//!
//! // Create typed IDs
//! let asset_id = AssetId::new();
//!
//! // Use common error types
//! fn example() -> Result<()> {
//!     Err(Error::not_found("asset"))
//! }
//! ```

pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::*;
