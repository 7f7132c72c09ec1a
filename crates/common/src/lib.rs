//! Common utilities and shared types for quillstream.
//!
//! This crate provides foundational components used across all quillstream
//! crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: Token and identifier generation via [`IdGenerator`]
//! - **Actor identity**: Registered/anonymous actor handling via [`ActorId`]
//!
//! # Example
//!
//! ```no_run
//! use quillstream_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let token = id_gen.generate_token();
//!     println!("Generated token: {}", token);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod identity;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use identity::{ActorId, hash_address};
