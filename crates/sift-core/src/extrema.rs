//! Scale-space extrema detection with sub-pixel refinement.
//!
//! Candidates are strict extrema over their 26 neighbors in the DoG stack
//! (8 in-layer, 9 above, 9 below). Each candidate is refined by fitting a
//! quadratic through finite-difference gradient and Hessian; candidates
//! that fail to converge, drift out of bounds, stay below the contrast
//! threshold, or sit on an edge-like structure are discarded individually
//! without affecting the rest of the scan.

use crate::pyramid::DogPyramid;
use crate::{ImageF32, SiftParams};

/// Pixels closer than this to a layer border are never candidates.
pub const IMAGE_BORDER: usize = 5;

/// Sub-pixel refinement attempts before a candidate is dropped.
const MAX_INTERPOLATION_STEPS: usize = 5;

/// A refined scale-space extremum, prior to orientation assignment.
#[derive(Clone, Copy, Debug)]
pub struct ScaleSpaceExtremum {
    /// Pyramid octave the extremum lives in.
    pub octave: usize,
    /// DoG layer index within the octave, in `[1, n_octave_layers]`.
    pub layer: usize,
    /// Integer position in octave pixels.
    pub x: usize,
    pub y: usize,
    /// Sub-pixel offsets along x, y, and scale, each in `(-0.5, 0.5)`.
    pub offset: [f32; 3],
    /// Absolute interpolated DoG contrast.
    pub response: f32,
}

/// Scan every interior DoG layer for refined extrema.
pub fn detect_extrema(dog: &DogPyramid, params: &SiftParams) -> Vec<ScaleSpaceExtremum> {
    let n = dog.n_octave_layers;
    // Cheap pre-filter on the raw sample before the neighborhood test.
    let prefilter = 0.5 * params.contrast_threshold / n as f32;
    let mut out = Vec::new();

    for (o, octave) in dog.octaves.iter().enumerate() {
        let (w, h) = (octave.layers[0].w, octave.layers[0].h);
        if w <= 2 * IMAGE_BORDER || h <= 2 * IMAGE_BORDER {
            continue;
        }

        for s in 1..=n {
            let prev = &octave.layers[s - 1];
            let curr = &octave.layers[s];
            let next = &octave.layers[s + 1];

            for y in IMAGE_BORDER..h - IMAGE_BORDER {
                for x in IMAGE_BORDER..w - IMAGE_BORDER {
                    let v = curr.at(x, y);
                    if v.abs() < prefilter {
                        continue;
                    }
                    if !is_local_extremum(prev, curr, next, x, y) {
                        continue;
                    }
                    if let Some(e) = refine_candidate(&octave.layers, s, x, y, n, params) {
                        out.push(ScaleSpaceExtremum { octave: o, ..e });
                    }
                }
            }
        }
    }

    out
}

/// Strict extremum test against all 26 scale-space neighbors.
fn is_local_extremum(prev: &ImageF32, curr: &ImageF32, next: &ImageF32, x: usize, y: usize) -> bool {
    let v = curr.at(x, y);
    let layers = [prev, curr, next];

    for (li, layer) in layers.iter().enumerate() {
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                if li == 1 && dx == 0 && dy == 0 {
                    continue;
                }
                let nv = layer.at((x as i32 + dx) as usize, (y as i32 + dy) as usize);
                if v > 0.0 {
                    if nv >= v {
                        return false;
                    }
                } else if nv <= v {
                    return false;
                }
            }
        }
    }
    true
}

/// Iterative quadratic refinement of a discrete candidate.
///
/// If the interpolated offset leaves the `(-0.5, 0.5)` interval along any
/// axis, the candidate is moved to the neighboring sample and refitted.
/// Returns `None` when the iteration budget runs out, the candidate leaves
/// the valid interior, the interpolated contrast stays too low, or the 2x2
/// spatial Hessian marks the point as edge-like.
fn refine_candidate(
    layers: &[ImageF32],
    mut layer: usize,
    mut x: usize,
    mut y: usize,
    n_octave_layers: usize,
    params: &SiftParams,
) -> Option<ScaleSpaceExtremum> {
    let (w, h) = (layers[0].w, layers[0].h);

    for _ in 0..MAX_INTERPOLATION_STEPS {
        let prev = &layers[layer - 1];
        let curr = &layers[layer];
        let next = &layers[layer + 1];

        // 3D gradient by central differences.
        let gx = 0.5 * (curr.at(x + 1, y) - curr.at(x - 1, y));
        let gy = 0.5 * (curr.at(x, y + 1) - curr.at(x, y - 1));
        let gs = 0.5 * (next.at(x, y) - prev.at(x, y));

        // 3D Hessian.
        let v2 = 2.0 * curr.at(x, y);
        let dxx = curr.at(x + 1, y) + curr.at(x - 1, y) - v2;
        let dyy = curr.at(x, y + 1) + curr.at(x, y - 1) - v2;
        let dss = next.at(x, y) + prev.at(x, y) - v2;
        let dxy = 0.25
            * (curr.at(x + 1, y + 1) - curr.at(x - 1, y + 1) - curr.at(x + 1, y - 1)
                + curr.at(x - 1, y - 1));
        let dxs = 0.25
            * (next.at(x + 1, y) - next.at(x - 1, y) - prev.at(x + 1, y) + prev.at(x - 1, y));
        let dys = 0.25
            * (next.at(x, y + 1) - next.at(x, y - 1) - prev.at(x, y + 1) + prev.at(x, y - 1));

        let [ox, oy, os] =
            solve_quadratic_offset([dxx, dxy, dxs, dyy, dys, dss], [gx, gy, gs])?;

        // Wildly diverging fits come from near-singular Hessians.
        if ox.abs() > 8.0 || oy.abs() > 8.0 || os.abs() > 8.0 {
            return None;
        }

        if ox.abs() < 0.5 && oy.abs() < 0.5 && os.abs() < 0.5 {
            // Interpolated contrast at the refined position.
            let contrast = curr.at(x, y) + 0.5 * (gx * ox + gy * oy + gs * os);
            if contrast.abs() * (n_octave_layers as f32) < params.contrast_threshold {
                return None;
            }

            // Edge rejection on the 2x2 spatial Hessian: a non-positive
            // determinant is a saddle, a large trace^2/det ratio an edge.
            let tr = dxx + dyy;
            let det = dxx * dyy - dxy * dxy;
            let r = params.edge_threshold;
            if det <= 0.0 || tr * tr * r >= (r + 1.0) * (r + 1.0) * det {
                return None;
            }

            return Some(ScaleSpaceExtremum {
                octave: 0,
                layer,
                x,
                y,
                offset: [ox, oy, os],
                response: contrast.abs(),
            });
        }

        // The quadratic put the extremum beyond the neighboring sample;
        // shift the candidate and refit.
        x = (x as isize + ox.round() as isize) as usize;
        y = (y as isize + oy.round() as isize) as usize;
        layer = (layer as isize + os.round() as isize) as usize;

        if layer < 1
            || layer > n_octave_layers
            || x < IMAGE_BORDER
            || x >= w - IMAGE_BORDER
            || y < IMAGE_BORDER
            || y >= h - IMAGE_BORDER
        {
            return None;
        }
    }

    None
}

/// Solve `H * offset = -g` for a symmetric 3x3 Hessian given as
/// `[h11, h12, h13, h22, h23, h33]` by explicit inversion.
fn solve_quadratic_offset(hess: [f32; 6], grad: [f32; 3]) -> Option<[f32; 3]> {
    let [h11, h12, h13, h22, h23, h33] = hess;
    let [g1, g2, g3] = grad;

    let det = h11 * h22 * h33 - h11 * h23 * h23 - h12 * h12 * h33 + 2.0 * h12 * h13 * h23
        - h13 * h13 * h22;
    if det.abs() < 1e-12 {
        return None;
    }

    let hinv11 = (h22 * h33 - h23 * h23) / det;
    let hinv12 = (h13 * h23 - h12 * h33) / det;
    let hinv13 = (h12 * h23 - h13 * h22) / det;
    let hinv22 = (h11 * h33 - h13 * h13) / det;
    let hinv23 = (h12 * h13 - h11 * h23) / det;
    let hinv33 = (h11 * h22 - h12 * h12) / det;

    Some([
        -(hinv11 * g1 + hinv12 * g2 + hinv13 * g3),
        -(hinv12 * g1 + hinv22 * g2 + hinv23 * g3),
        -(hinv13 * g1 + hinv23 * g2 + hinv33 * g3),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::{DogOctave, DogPyramid};

    /// One-octave DoG stack sampled from `f(x, y, s)`.
    fn synthetic_dog(w: usize, h: usize, f: impl Fn(f32, f32, f32) -> f32) -> DogPyramid {
        let layers = (0..3)
            .map(|s| {
                ImageF32::from_fn(w, h, |x, y| f(x as f32, y as f32, s as f32))
                    .expect("non-degenerate")
            })
            .collect();
        DogPyramid {
            n_octave_layers: 1,
            octaves: vec![DogOctave { delta: 1.0, layers }],
        }
    }

    #[test]
    fn flat_stack_has_no_extrema() {
        let dog = synthetic_dog(32, 32, |_, _, _| 0.0);
        let params = SiftParams::default();
        assert!(detect_extrema(&dog, &params).is_empty());

        let params = params.with_contrast_threshold(0.0);
        assert!(detect_extrema(&dog, &params).is_empty());
    }

    #[test]
    fn quadratic_peak_is_recovered_subpixel() {
        // Concave quadratic with its maximum at (8.3, 7.6, 1.2); finite
        // differences are exact for quadratics, so refinement must land on
        // the analytic peak in one step.
        let dog = synthetic_dog(16, 16, |x, y, s| {
            1.0 - 0.02 * (x - 8.3).powi(2) - 0.02 * (y - 7.6).powi(2) - 0.05 * (s - 1.2).powi(2)
        });
        let params = SiftParams::default();
        let found = detect_extrema(&dog, &params);

        assert_eq!(found.len(), 1);
        let e = found[0];
        assert_eq!((e.x, e.y, e.layer), (8, 8, 1));
        assert!((e.offset[0] - 0.3).abs() < 1e-3);
        assert!((e.offset[1] + 0.4).abs() < 1e-3);
        assert!((e.offset[2] - 0.2).abs() < 1e-3);
        assert!((e.response - 1.0).abs() < 1e-3);
    }

    #[test]
    fn minima_are_detected_too() {
        let dog = synthetic_dog(16, 16, |x, y, s| {
            -1.0 + 0.02 * (x - 8.0).powi(2) + 0.02 * (y - 8.0).powi(2) + 0.05 * (s - 1.0).powi(2)
        });
        let found = detect_extrema(&dog, &SiftParams::default());
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].x, found[0].y), (8, 8));
    }

    #[test]
    fn elongated_ridge_is_rejected_as_edge() {
        // Strongly anisotropic curvature: a strict extremum, but far above
        // the default principal-curvature ratio.
        let dog = synthetic_dog(16, 16, |x, y, s| {
            1.0 - 0.02 * (x - 8.0).powi(2)
                - 0.00005 * (y - 8.0).powi(2)
                - 0.05 * (s - 1.0).powi(2)
        });
        assert!(detect_extrema(&dog, &SiftParams::default()).is_empty());
    }
}
