//! Regenerates the golden descriptor dump consumed by the `sift-core`
//! regression tests. Run from the repository root:
//!
//! ```text
//! cargo run -p gen-golden
//! ```
//!
//! The rendered scene must stay in sync with the one in
//! `crates/sift-core/tests/descriptor_golden.rs`.

use sift_core::{detect_and_compute, ImageF32, SiftParams};
use std::{fs::File, io::Write, path::Path};

fn golden_scene() -> ImageF32 {
    ImageF32::from_fn(96, 96, |x, y| {
        let blob = |cx: f32, cy: f32, s: f32, a: f32| {
            let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            a * (-d2 / (2.0 * s * s)).exp()
        };
        0.002 * x as f32
            + blob(28.0, 30.0, 4.0, 0.8)
            + blob(66.0, 34.0, 3.0, 0.5)
            + blob(40.0, 68.0, 5.0, 0.35)
    })
    .expect("non-degenerate")
}

fn write_golden(path_out: &Path, rows: usize, cols: usize, data: &[f32]) -> std::io::Result<()> {
    let mut f = File::create(path_out)?;
    f.write_all(&(rows as u32).to_le_bytes())?;
    f.write_all(&(cols as u32).to_le_bytes())?;
    for v in data {
        f.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let out_dir = Path::new("crates/sift-core/testdata/golden");
    std::fs::create_dir_all(out_dir)?;

    let img = golden_scene();
    let (kps, desc) = detect_and_compute(&img, None, &SiftParams::default())?;

    let out = out_dir.join("descriptors.bin");
    write_golden(&out, desc.len(), sift_core::DESCRIPTOR_SIZE, &desc.data)?;
    println!("golden: {} keypoints -> {:?}", kps.len(), out);

    Ok(())
}
