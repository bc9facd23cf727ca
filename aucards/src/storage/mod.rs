//! Storage module
//!
//! Provides local file storage for card images.

pub mod image_store;

pub use image_store::ImageStore;
