//! Detection helpers in terms of `image::GrayImage`.
//!
//! These wrappers convert 8-bit input to the `[0, 1]` float buffers the
//! core pipeline operates on and forward to `sift-core`.

use image::GrayImage;
use sift_core::{Descriptors, ImageF32, KeyPoint, SiftError, SiftParams};

/// Convert an 8-bit grayscale image into the normalized float buffer used
/// by the core detector.
pub fn gray_to_f32(img: &GrayImage) -> ImageF32 {
    ImageF32 {
        w: img.width() as usize,
        h: img.height() as usize,
        data: img.as_raw().iter().map(|&p| p as f32 / 255.0).collect(),
    }
}

/// Detect oriented keypoints in a `GrayImage`.
///
/// The mask, when given, must match the image size; it is validated but not
/// applied on this path (see `sift_core::detect`).
#[inline]
pub fn detect_image(
    img: &GrayImage,
    mask: Option<&GrayImage>,
    params: &SiftParams,
) -> Result<Vec<KeyPoint>, SiftError> {
    let buf = gray_to_f32(img);
    sift_core::detect(&buf, mask.map(|m| m.as_raw().as_slice()), params)
}

/// Compute descriptors for caller-provided keypoints over a `GrayImage`.
#[inline]
pub fn compute_image(
    img: &GrayImage,
    mask: Option<&GrayImage>,
    keypoints: Vec<KeyPoint>,
    params: &SiftParams,
) -> Result<(Vec<KeyPoint>, Descriptors), SiftError> {
    let buf = gray_to_f32(img);
    sift_core::compute(&buf, mask.map(|m| m.as_raw().as_slice()), keypoints, params)
}

/// Detect keypoints and compute their descriptors from a `GrayImage`.
#[inline]
pub fn detect_and_compute_image(
    img: &GrayImage,
    mask: Option<&GrayImage>,
    params: &SiftParams,
) -> Result<(Vec<KeyPoint>, Descriptors), SiftError> {
    let buf = gray_to_f32(img);
    sift_core::detect_and_compute(&buf, mask.map(|m| m.as_raw().as_slice()), params)
}
