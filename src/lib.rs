//! OCR Gateway Library
//!
//! Routes OCR batches to a bounded pool of on-demand worker processes.
//! The server binary is in main.rs.
//!
//! # Modules
//!
//! - `capability`: Ordered rules deciding which (modality, language, version) exist
//! - `pool`: Bounded worker cache over a process orchestrator
//! - `dispatch`: Per-request validation, workspace, inference and result ordering
//! - `routes`: HTTP surface

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod routes;
pub mod state;
