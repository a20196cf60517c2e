//! Shared application-level helpers for the CLI example.
//!
//! These functions wire up I/O (load image, JSON/PNG output) around the
//! detection API so examples and scripts can share the same behavior.

use crate::image::detect_and_compute_image;
use anyhow::{Context, Result};
use image::{GrayImage, ImageReader, Luma};
use serde::{Deserialize, Serialize};
use sift_core::{KeyPoint, SiftParams};
use std::{fs::File, io::Write, path::Path, path::PathBuf};

/// JSON-loadable detection configuration. Every parameter is optional and
/// falls back to the `SiftParams` default.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    pub image: PathBuf,
    pub mask: Option<PathBuf>,
    pub output_json: Option<PathBuf>,
    pub output_png: Option<PathBuf>,
    pub n_features: Option<usize>,
    pub n_octave_layers: Option<usize>,
    pub contrast_threshold: Option<f32>,
    pub edge_threshold: Option<f32>,
    pub sigma: Option<f32>,
    pub upsample: Option<bool>,
}

/// One keypoint record in the JSON dump.
#[derive(Serialize)]
pub struct KeyPointOut {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub angle: f32,
    pub response: f32,
    pub octave: i32,
    pub class_id: i32,
}

/// Result summary written as JSON next to the input image.
#[derive(Serialize)]
pub struct DetectionDump {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub descriptor_rows: usize,
    pub keypoints: Vec<KeyPointOut>,
}

/// Build a parameter set from the optional overrides in `cfg`.
pub fn params_from_config(cfg: &DetectionConfig) -> Result<SiftParams> {
    let mut params = SiftParams::default();
    if let Some(n) = cfg.n_features {
        params.n_features = n;
    }
    if let Some(n) = cfg.n_octave_layers {
        if n == 0 {
            anyhow::bail!("n_octave_layers must be >= 1");
        }
        params.n_octave_layers = n;
    }
    if let Some(t) = cfg.contrast_threshold {
        if t < 0.0 {
            anyhow::bail!("contrast_threshold must be >= 0");
        }
        params.contrast_threshold = t;
    }
    if let Some(t) = cfg.edge_threshold {
        if t <= 0.0 {
            anyhow::bail!("edge_threshold must be > 0");
        }
        params.edge_threshold = t;
    }
    if let Some(s) = cfg.sigma {
        if s <= 0.0 {
            anyhow::bail!("sigma must be > 0");
        }
        params.sigma = s;
    }
    if let Some(u) = cfg.upsample {
        params.upsample = u;
    }
    Ok(params)
}

/// Load the image (and optional mask), run `detect_and_compute`, and write
/// the JSON dump plus a PNG visualization. Returns the dump so callers can
/// print a summary.
pub fn run_detection(cfg: DetectionConfig) -> Result<DetectionDump> {
    let params = params_from_config(&cfg)?;

    let img = ImageReader::open(&cfg.image)
        .with_context(|| format!("opening image {}", cfg.image.display()))?
        .decode()?
        .to_luma8();

    let mask = match &cfg.mask {
        Some(path) => Some(
            ImageReader::open(path)
                .with_context(|| format!("opening mask {}", path.display()))?
                .decode()?
                .to_luma8(),
        ),
        None => None,
    };

    let (keypoints, descriptors) = detect_and_compute_image(&img, mask.as_ref(), &params)?;

    let dump = DetectionDump {
        image: cfg.image.to_string_lossy().into_owned(),
        width: img.width(),
        height: img.height(),
        descriptor_rows: descriptors.len(),
        keypoints: keypoints
            .iter()
            .map(|kp| KeyPointOut {
                x: kp.x,
                y: kp.y,
                size: kp.size,
                angle: kp.angle,
                response: kp.response,
                octave: kp.octave,
                class_id: kp.class_id,
            })
            .collect(),
    };

    let json_out = cfg
        .output_json
        .unwrap_or_else(|| cfg.image.with_extension("keypoints.json"));
    write_json(&json_out, &dump)?;

    let png_out = cfg
        .output_png
        .unwrap_or_else(|| cfg.image.with_extension("keypoints.png"));
    let mut vis = img.clone();
    draw_keypoints(&mut vis, &keypoints);
    vis.save(&png_out)?;

    Ok(dump)
}

/// Parse a JSON detection config.
pub fn load_config(path: &Path) -> Result<DetectionConfig> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    let cfg: DetectionConfig = serde_json::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

/// Mark each keypoint with a small 3x3 white square.
fn draw_keypoints(vis: &mut GrayImage, keypoints: &[KeyPoint]) {
    for kp in keypoints {
        let x = kp.x.round() as i32;
        let y = kp.y.round() as i32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let xx = x + dx;
                let yy = y + dy;
                if xx >= 0 && yy >= 0 && xx < vis.width() as i32 && yy < vis.height() as i32 {
                    vis.put_pixel(xx as u32, yy as u32, Luma([255u8]));
                }
            }
        }
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut json_file = File::create(path)?;
    serde_json::to_writer_pretty(&mut json_file, value)?;
    json_file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(json: &str) -> DetectionConfig {
        serde_json::from_str(json).expect("valid config json")
    }

    #[test]
    fn config_overrides_apply_onto_defaults() {
        let cfg = minimal_config(
            r#"{"image": "in.png", "n_features": 500, "contrast_threshold": 0.03, "upsample": false}"#,
        );
        let params = params_from_config(&cfg).expect("valid overrides");
        assert_eq!(params.n_features, 500);
        assert_eq!(params.contrast_threshold, 0.03);
        assert!(!params.upsample);
        // untouched fields keep their defaults
        assert_eq!(params.n_octave_layers, 3);
        assert_eq!(params.sigma, 1.6);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let cfg = minimal_config(r#"{"image": "in.png", "n_octave_layers": 0}"#);
        assert!(params_from_config(&cfg).is_err());

        let cfg = minimal_config(r#"{"image": "in.png", "sigma": -1.0}"#);
        assert!(params_from_config(&cfg).is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = minimal_config(r#"{"image": "in.png", "edge_threshold": 12.5}"#);
        let text = serde_json::to_string(&cfg).expect("serializable");
        let back: DetectionConfig = serde_json::from_str(&text).expect("round trip");
        assert_eq!(back.image, PathBuf::from("in.png"));
        assert_eq!(back.edge_threshold, Some(12.5));
        assert_eq!(back.n_features, None);
    }
}
