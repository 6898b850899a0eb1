//! Shared error taxonomy for the murk workspace.
pub mod errors;
