//! Filesystem collaborators
//!
//! This module handles:
//! - Listing one folder level into catalog entries (folder.rs)
//! - Reading media durations from container headers (media.rs)
//! - Loading per-item presentation details in the background (details.rs)

pub mod details;
pub mod folder;
pub mod media;
