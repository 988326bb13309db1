//! Core data models for the proof reconciler.
//!
//! Storage-side entities (`Bucket`, `Object`) map to SQLite tables via
//! `sqlx::FromRow`; `StoredFile` is the backend-neutral view the resolver and
//! migrator work with. Everything serializes as JSON via `serde`.

pub mod bucket;
pub mod migration;
pub mod object;
pub mod registration;
pub mod stored_file;
