//! # hookhub-core
//!
//! Core crate for HookHub. Contains the configuration schemas loaded by
//! the host and CLI, and the unified error system.
//!
//! This crate has **no** internal dependencies on other HookHub crates.

pub mod config;
pub mod error;

pub use error::{AppError, AppResult};
