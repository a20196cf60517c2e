//! Gaussian scale-space and difference-of-Gaussian pyramids.
//!
//! The scale space follows the standard SIFT layout: each octave holds
//! `n_octave_layers + 3` layers whose blur grows geometrically with ratio
//! `2^(1 / n_octave_layers)`, each blur applied incrementally to the
//! previous layer. The next octave is seeded by 2x decimation of the layer
//! with twice the base blur, so blur bookkeeping stays identical across
//! octaves in their own pixel grids.

use crate::{ImageF32, SiftParams};

/// Assumed blur of the input image, in input pixels.
const SIGMA_INPUT: f32 = 0.5;

/// Stop creating octaves once a dimension would fall below this.
const MIN_OCTAVE_SIZE: usize = 8;

/// One resolution level of the scale space.
pub struct GaussianOctave {
    /// Subsampling factor of this octave relative to the input image
    /// (0.5 for the upsampled base octave, then doubling).
    pub delta: f32,
    /// `n_octave_layers + 3` layers of increasing blur, equal dimensions.
    pub layers: Vec<ImageF32>,
}

/// The full Gaussian scale space, octave 0 first.
pub struct GaussianPyramid {
    pub n_octave_layers: usize,
    /// Blur of layer 0 of every octave, in that octave's pixels.
    pub sigma: f32,
    pub octaves: Vec<GaussianOctave>,
}

/// One octave of DoG layers (`n_octave_layers + 2` of them).
pub struct DogOctave {
    pub delta: f32,
    pub layers: Vec<ImageF32>,
}

/// Difference-of-Gaussian pyramid derived from a [`GaussianPyramid`].
pub struct DogPyramid {
    pub n_octave_layers: usize,
    pub octaves: Vec<DogOctave>,
}

impl GaussianPyramid {
    /// Blur of layer `s` of any octave, in that octave's own pixels.
    #[inline]
    pub fn layer_sigma(&self, s: f32) -> f32 {
        self.sigma * 2f32.powf(s / self.n_octave_layers as f32)
    }
}

/// Number of octaves for a seed image of the given dimensions.
///
/// Chosen so the coarsest octave keeps roughly `MIN_OCTAVE_SIZE` pixels on
/// its short side.
fn num_octaves(w: usize, h: usize) -> usize {
    let min_dim = w.min(h) as f32;
    ((min_dim.log2().round() as i32) - 2).max(1) as usize
}

/// Build the Gaussian scale space for a `[0, 1]`-normalized image.
///
/// The input is upsampled 2x (bilinear) first unless `params.upsample` is
/// off, then pre-blurred so layer 0 carries exactly `params.sigma` of blur
/// accounting for the assumed input blur.
pub fn build_gaussian_pyramid(img: &ImageF32, params: &SiftParams) -> GaussianPyramid {
    let n = params.n_octave_layers.max(1);
    let layers_per_octave = n + 3;

    let (base, delta0, assumed_blur) = if params.upsample {
        (upsample_2x(img), 0.5, 2.0 * SIGMA_INPUT)
    } else {
        (img.clone(), 1.0, SIGMA_INPUT)
    };

    let init_sigma = (params.sigma * params.sigma - assumed_blur * assumed_blur)
        .max(0.01)
        .sqrt();
    let mut seed = gaussian_blur(&base, init_sigma);

    let k = 2f32.powf(1.0 / n as f32);
    // Incremental blur taking layer s-1 to layer s, identical per octave.
    let increments: Vec<f32> = (1..layers_per_octave)
        .map(|s| {
            let sig_prev = params.sigma * k.powi(s as i32 - 1);
            let sig_total = sig_prev * k;
            (sig_total * sig_total - sig_prev * sig_prev).sqrt()
        })
        .collect();

    let mut octaves = Vec::new();
    let total = num_octaves(seed.w, seed.h);

    for o in 0..total {
        let mut layers = Vec::with_capacity(layers_per_octave);
        layers.push(seed);
        for inc in &increments {
            let prev = layers.last().expect("octave seeded with layer 0");
            layers.push(gaussian_blur(prev, *inc));
        }

        octaves.push(GaussianOctave {
            delta: delta0 * 2f32.powi(o as i32),
            layers,
        });

        if o + 1 == total {
            break;
        }

        // Layer n carries blur 2*sigma; decimated it seeds the next octave
        // with blur sigma in its own (halved) grid.
        let next_seed = &octaves.last().expect("just pushed").layers[n];
        if next_seed.w / 2 < MIN_OCTAVE_SIZE || next_seed.h / 2 < MIN_OCTAVE_SIZE {
            break;
        }
        seed = downsample_2x(next_seed);
    }

    GaussianPyramid {
        n_octave_layers: n,
        sigma: params.sigma,
        octaves,
    }
}

/// Derive the DoG pyramid by subtracting adjacent Gaussian layers.
pub fn build_dog_pyramid(gss: &GaussianPyramid) -> DogPyramid {
    let octaves = gss
        .octaves
        .iter()
        .map(|octave| {
            let layers = octave
                .layers
                .windows(2)
                .map(|pair| {
                    let (a, b) = (&pair[0], &pair[1]);
                    let data = b
                        .data
                        .iter()
                        .zip(&a.data)
                        .map(|(next, prev)| next - prev)
                        .collect();
                    ImageF32 {
                        w: a.w,
                        h: a.h,
                        data,
                    }
                })
                .collect();
            DogOctave {
                delta: octave.delta,
                layers,
            }
        })
        .collect();

    DogPyramid {
        n_octave_layers: gss.n_octave_layers,
        octaves,
    }
}

/// Reflect an out-of-range index back into `[0, n)` without repeating the
/// border sample.
#[inline]
fn mirror(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * n - 2 - i;
        }
    }
    i as usize
}

/// Separable Gaussian blur with mirrored borders.
///
/// Kernel radius is `ceil(4 * sigma)`, wide enough that truncation error is
/// below f32 noise for the sigmas used in the pyramid.
pub fn gaussian_blur(img: &ImageF32, sigma: f32) -> ImageF32 {
    if sigma < 0.01 {
        return img.clone();
    }

    let radius = (4.0 * sigma).ceil().max(1.0) as usize;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    let denom = -0.5 / (sigma * sigma);
    for d in -(radius as isize)..=(radius as isize) {
        kernel.push(((d * d) as f32 * denom).exp());
    }
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }

    let (w, h) = (img.w, img.h);

    // Horizontal pass.
    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        let row = &img.data[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0;
            for (ki, k) in kernel.iter().enumerate() {
                let sx = mirror(x as isize + ki as isize - radius as isize, w);
                acc += k * row[sx];
            }
            tmp[y * w + x] = acc;
        }
    }

    // Vertical pass.
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (ki, k) in kernel.iter().enumerate() {
                let sy = mirror(y as isize + ki as isize - radius as isize, h);
                acc += k * tmp[sy * w + x];
            }
            out[y * w + x] = acc;
        }
    }

    ImageF32 { w, h, data: out }
}

/// Bilinear 2x upsampling.
pub fn upsample_2x(img: &ImageF32) -> ImageF32 {
    let (w, h) = (img.w, img.h);
    let (nw, nh) = (w * 2, h * 2);
    let mut data = Vec::with_capacity(nw * nh);

    for y in 0..nh {
        let sy = 0.5 * y as f32;
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let fy = sy - y0 as f32;
        for x in 0..nw {
            let sx = 0.5 * x as f32;
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);
            let fx = sx - x0 as f32;

            let top = img.at(x0, y0) * (1.0 - fx) + img.at(x1, y0) * fx;
            let bottom = img.at(x0, y1) * (1.0 - fx) + img.at(x1, y1) * fx;
            data.push(top * (1.0 - fy) + bottom * fy);
        }
    }

    ImageF32 {
        w: nw,
        h: nh,
        data,
    }
}

/// 2x decimation (every other sample). The source is already blurred to
/// twice the base sigma, so no extra filtering is needed.
pub fn downsample_2x(img: &ImageF32) -> ImageF32 {
    let (nw, nh) = ((img.w / 2).max(1), (img.h / 2).max(1));
    let mut data = Vec::with_capacity(nw * nh);
    for y in 0..nh {
        for x in 0..nw {
            data.push(img.at(x * 2, y * 2));
        }
    }
    ImageF32 {
        w: nw,
        h: nh,
        data,
    }
}
