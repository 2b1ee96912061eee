//! formgraph - runtime-defined form schemas with generic submission storage
//!
//! Forms are versioned lists of typed fields. Submissions are stored as
//! key/value rows validated against their form, nested under parent
//! submissions, and cross-linked by typed edges scoped to a root submission.
//! Access to every form is resolved from global role, ownership and grants.

pub mod access;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod models;
pub mod relations;
pub mod submissions;
pub mod suggest;

pub use config::Config;
pub use db::FormDb;
pub use error::{Error, Result};
