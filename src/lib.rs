//! Flattening and validation of uploaded geospatial files.
//!
//! Uploads (plain files or zip archives, possibly nested) are unpacked into a
//! single flat [`staging::StagingDirectory`], given collision-free names,
//! filtered by extension, checked for multi-part completeness and finally
//! passed through an [`inspect::Inspector`]. See [`pipeline::Pipeline`].

pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod inspect;
pub mod naming;
pub mod outcome;
pub mod output;
pub mod pipeline;
pub mod staging;
