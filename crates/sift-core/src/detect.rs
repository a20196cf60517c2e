//! Detector facade: full pipeline from an image buffer to keypoints and
//! descriptors.
//!
//! All working memory (Gaussian and DoG pyramids) is owned by a single
//! call and released when it returns. Mask filtering is applied only on
//! the descriptor-computation paths; [`detect`] accepts a mask solely to
//! validate it and returns the unfiltered keypoint set. This asymmetry is
//! intentional and kept for compatibility with the established SIFT
//! calling convention.

use crate::descriptor::{compute_descriptor, Descriptors, DESCRIPTOR_SIZE};
use crate::extrema::detect_extrema;
use crate::keypoint::{filter_by_mask, retain_strongest, unpack_octave, KeyPoint};
use crate::orientation::assign_orientations;
use crate::pyramid::{build_dog_pyramid, build_gaussian_pyramid, GaussianPyramid};
use crate::{ImageF32, SiftError, SiftParams};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::{debug_span, instrument};

/// Detect oriented keypoints in a `[0, 1]`-normalized grayscale image.
///
/// The mask, when given, is validated against the image size but not
/// applied here; see the module docs for the asymmetry. Returns an empty
/// vector (not an error) when nothing qualifies.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, mask, params), fields(w = img.w, h = img.h))
)]
pub fn detect(
    img: &ImageF32,
    mask: Option<&[u8]>,
    params: &SiftParams,
) -> Result<Vec<KeyPoint>, SiftError> {
    validate(img, mask)?;

    #[cfg(feature = "tracing")]
    let span = debug_span!("pyramid").entered();
    let gss = build_gaussian_pyramid(img, params);
    #[cfg(feature = "tracing")]
    drop(span);

    Ok(detect_keypoints(&gss, params))
}

/// Compute descriptors for caller-provided keypoints.
///
/// Keypoints falling on a zero mask sample are dropped first; keypoints
/// whose packed octave/layer does not resolve into the pyramid built for
/// this image are dropped as well. The returned keypoint list and
/// descriptor rows are index-aligned.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip(img, mask, keypoints, params),
        fields(w = img.w, h = img.h, keypoints = keypoints.len())
    )
)]
pub fn compute(
    img: &ImageF32,
    mask: Option<&[u8]>,
    keypoints: Vec<KeyPoint>,
    params: &SiftParams,
) -> Result<(Vec<KeyPoint>, Descriptors), SiftError> {
    validate(img, mask)?;

    #[cfg(feature = "tracing")]
    let span = debug_span!("pyramid").entered();
    let gss = build_gaussian_pyramid(img, params);
    #[cfg(feature = "tracing")]
    drop(span);

    let mut kps = keypoints;
    if let Some(mask) = mask {
        filter_by_mask(&mut kps, mask, img.w, img.h);
    }
    kps.retain(|kp| {
        let (o, s) = unpack_octave(kp.octave);
        o < gss.octaves.len() && (1..=gss.n_octave_layers).contains(&s)
    });

    let desc = descriptors_for(&gss, &kps);
    Ok((kps, desc))
}

/// Detect keypoints and compute their descriptors in one pass over a
/// single pyramid.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, mask, params), fields(w = img.w, h = img.h))
)]
pub fn detect_and_compute(
    img: &ImageF32,
    mask: Option<&[u8]>,
    params: &SiftParams,
) -> Result<(Vec<KeyPoint>, Descriptors), SiftError> {
    validate(img, mask)?;

    #[cfg(feature = "tracing")]
    let span = debug_span!("pyramid").entered();
    let gss = build_gaussian_pyramid(img, params);
    #[cfg(feature = "tracing")]
    drop(span);

    let mut kps = detect_keypoints(&gss, params);
    if let Some(mask) = mask {
        filter_by_mask(&mut kps, mask, img.w, img.h);
    }

    let desc = descriptors_for(&gss, &kps);
    Ok((kps, desc))
}

fn validate(img: &ImageF32, mask: Option<&[u8]>) -> Result<(), SiftError> {
    if img.w == 0 || img.h == 0 {
        return Err(SiftError::EmptyImage { w: img.w, h: img.h });
    }
    if img.data.len() != img.w * img.h {
        return Err(SiftError::DimensionMismatch {
            w: img.w,
            h: img.h,
            len: img.data.len(),
        });
    }
    if let Some(mask) = mask {
        if mask.len() != img.w * img.h {
            return Err(SiftError::MaskSizeMismatch {
                w: img.w,
                h: img.h,
                len: mask.len(),
            });
        }
    }
    Ok(())
}

/// Extrema scan plus orientation assignment over a prebuilt scale space.
fn detect_keypoints(gss: &GaussianPyramid, params: &SiftParams) -> Vec<KeyPoint> {
    #[cfg(feature = "tracing")]
    let span = debug_span!("extrema").entered();
    let dog = build_dog_pyramid(gss);
    let candidates = detect_extrema(&dog, params);
    #[cfg(feature = "tracing")]
    drop(span);

    #[cfg(feature = "tracing")]
    let span = debug_span!("orientation", candidates = candidates.len()).entered();

    #[cfg(feature = "rayon")]
    let mut kps: Vec<KeyPoint> = candidates
        .par_iter()
        .flat_map_iter(|c| assign_orientations(gss, c))
        .collect();

    #[cfg(not(feature = "rayon"))]
    let mut kps: Vec<KeyPoint> = candidates
        .iter()
        .flat_map(|c| assign_orientations(gss, c))
        .collect();

    #[cfg(feature = "tracing")]
    drop(span);

    retain_strongest(&mut kps, params.n_features);
    kps
}

/// One descriptor row per keypoint, index-aligned with the input slice.
fn descriptors_for(gss: &GaussianPyramid, keypoints: &[KeyPoint]) -> Descriptors {
    let mut desc = Descriptors::zeroed(keypoints.len());

    #[cfg(feature = "tracing")]
    let span = debug_span!("descriptors", keypoints = keypoints.len()).entered();

    #[cfg(feature = "rayon")]
    desc.data
        .par_chunks_mut(DESCRIPTOR_SIZE)
        .zip(keypoints.par_iter())
        .for_each(|(row, kp)| descriptor_row(gss, kp, row));

    #[cfg(not(feature = "rayon"))]
    for (row, kp) in desc.data.chunks_mut(DESCRIPTOR_SIZE).zip(keypoints) {
        descriptor_row(gss, kp, row);
    }

    #[cfg(feature = "tracing")]
    drop(span);

    desc
}

fn descriptor_row(gss: &GaussianPyramid, kp: &KeyPoint, row: &mut [f32]) {
    let (o, s) = unpack_octave(kp.octave);
    let octave = &gss.octaves[o];
    let layer = &octave.layers[s];

    // Map the keypoint back into octave pixels.
    let inv_delta = 1.0 / octave.delta;
    compute_descriptor(
        layer,
        kp.x * inv_delta,
        kp.y * inv_delta,
        kp.size * 0.5 * inv_delta,
        kp.angle,
        row,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Gaussian blobs over a mild horizontal ramp. The ramp has no second
    /// derivative, so it leaves the DoG stack (and thus detection) alone.
    fn blob_scene(w: usize, h: usize, blobs: &[(f32, f32, f32, f32)]) -> ImageF32 {
        ImageF32::from_fn(w, h, |x, y| {
            let mut v = 0.002 * x as f32;
            for &(cx, cy, sigma, amp) in blobs {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                v += amp * (-d2 / (2.0 * sigma * sigma)).exp();
            }
            v
        })
        .expect("non-degenerate")
    }

    fn strongest(kps: &[KeyPoint]) -> &KeyPoint {
        kps.iter()
            .max_by(|a, b| a.response.total_cmp(&b.response))
            .expect("non-empty")
    }

    #[test]
    fn degenerate_inputs_fail_fast() {
        let empty = ImageF32 {
            w: 0,
            h: 0,
            data: Vec::new(),
        };
        let params = SiftParams::default();
        assert_eq!(
            detect(&empty, None, &params),
            Err(SiftError::EmptyImage { w: 0, h: 0 })
        );

        let img = blob_scene(32, 32, &[]);
        let short_mask = vec![255u8; 10];
        assert_eq!(
            detect(&img, Some(short_mask.as_slice()), &params),
            Err(SiftError::MaskSizeMismatch {
                w: 32,
                h: 32,
                len: 10
            })
        );
    }

    #[test]
    fn flat_image_yields_no_keypoints() {
        let img = ImageF32::from_fn(64, 64, |_, _| 0.3).expect("non-degenerate");
        let params = SiftParams::default();
        assert!(detect(&img, None, &params).expect("valid input").is_empty());

        let loose = params.with_contrast_threshold(0.0);
        assert!(detect(&img, None, &loose).expect("valid input").is_empty());
    }

    #[test]
    fn single_blob_is_found_at_its_center_and_scale() {
        let img = blob_scene(64, 64, &[(32.0, 32.0, 4.0, 0.8)]);
        let kps = detect(&img, None, &SiftParams::default()).expect("valid input");
        assert!(!kps.is_empty());

        let best = strongest(&kps);
        assert!(
            (best.x - 32.0).abs() < 2.5 && (best.y - 32.0).abs() < 2.5,
            "keypoint at ({}, {})",
            best.x,
            best.y
        );
        // size is a diameter: twice the detected sigma, which tracks the
        // blob sigma of 4 within the scale sampling granularity.
        let detected_sigma = best.size * 0.5;
        assert!(
            detected_sigma > 2.0 && detected_sigma < 8.0,
            "detected sigma {detected_sigma}"
        );
    }

    #[test]
    fn mask_is_validated_but_not_applied_by_detect() {
        let img = blob_scene(64, 64, &[(32.0, 32.0, 4.0, 0.8)]);
        let zeros = vec![0u8; 64 * 64];
        let params = SiftParams::default();

        let unmasked = detect(&img, None, &params).expect("valid input");
        let masked = detect(&img, Some(zeros.as_slice()), &params).expect("valid input");
        assert_eq!(unmasked.len(), masked.len());
        assert!(!masked.is_empty());
    }

    #[test]
    fn zero_mask_empties_the_descriptor_path() {
        let img = blob_scene(64, 64, &[(32.0, 32.0, 4.0, 0.8)]);
        let zeros = vec![0u8; 64 * 64];
        let params = SiftParams::default();

        let (kps, desc) =
            detect_and_compute(&img, Some(zeros.as_slice()), &params).expect("valid input");
        assert!(kps.is_empty());
        assert_eq!(desc.len(), 0);
        assert!(desc.is_empty());
    }

    #[test]
    fn descriptor_rows_match_surviving_keypoints() {
        let img = blob_scene(64, 64, &[(32.0, 32.0, 4.0, 0.8)]);
        let params = SiftParams::default();

        let (kps, desc) = detect_and_compute(&img, None, &params).expect("valid input");
        assert!(!kps.is_empty());
        assert_eq!(desc.len(), kps.len());

        for i in 0..desc.len() {
            let norm = desc.row(i).iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3, "row {i} norm {norm}");
        }
    }

    #[test]
    fn n_features_keeps_the_strongest() {
        let img = blob_scene(
            64,
            64,
            &[(20.0, 20.0, 4.0, 0.8), (44.0, 44.0, 4.0, 0.35)],
        );
        let params = SiftParams::default();

        let all = detect(&img, None, &params).expect("valid input");
        assert!(all.len() >= 2);

        let top = detect(&img, None, &params.clone().with_n_features(1)).expect("valid input");
        assert_eq!(top.len(), 1);
        assert!(
            (top[0].x - 20.0).abs() < 3.0 && (top[0].y - 20.0).abs() < 3.0,
            "strongest at ({}, {})",
            top[0].x,
            top[0].y
        );
    }

    #[test]
    fn compute_round_trips_detected_keypoints() {
        let img = blob_scene(64, 64, &[(32.0, 32.0, 4.0, 0.8)]);
        let params = SiftParams::default();

        let kps = detect(&img, None, &params).expect("valid input");
        let n = kps.len();
        assert!(n > 0);

        let (kept, desc) = compute(&img, None, kps, &params).expect("valid input");
        assert_eq!(kept.len(), n);
        assert_eq!(desc.len(), n);
    }
}
