//! Ergonomic wrappers over `sift-core` that accept `image::GrayImage` inputs.
//!
//! This crate is organized into two focused modules:
//! - [`image`] – detection helpers on `image::GrayImage`.
//! - [`app`] – application-level glue (config files, JSON/PNG output) shared
//!   by the CLI example.

pub mod app;
pub mod image;

// Re-export the core surface for convenience. Consumers that need the
// lower-level primitives (pyramids, raw extrema, descriptor kernels) are
// encouraged to depend on `sift-core` directly.
pub use sift_core::{Descriptors, ImageF32, KeyPoint, SiftError, SiftParams, DESCRIPTOR_SIZE};

// High-level helpers on `image::GrayImage`.
pub use crate::image::{compute_image, detect_and_compute_image, detect_image, gray_to_f32};
