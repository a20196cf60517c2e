use anyhow::Context;
use sift::app::{run_detection, DetectionConfig};
use std::path::PathBuf;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let input: PathBuf = args
        .next()
        .expect("usage: dump_keypoints <image> [--mask PATH] [--features N] [--contrast T] [--no-upsample]")
        .into();

    let mut cfg = DetectionConfig {
        image: input,
        mask: None,
        output_json: None,
        output_png: None,
        n_features: None,
        n_octave_layers: None,
        contrast_threshold: None,
        edge_threshold: None,
        sigma: None,
        upsample: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mask" => {
                let v = args.next().context("expected a path after --mask")?;
                cfg.mask = Some(v.into());
            }
            "--features" => {
                let v = args.next().context("expected an integer after --features")?;
                cfg.n_features = Some(v.parse().context("could not parse feature limit")?);
            }
            "--contrast" => {
                let v = args.next().context("expected a float after --contrast")?;
                cfg.contrast_threshold =
                    Some(v.parse().context("could not parse contrast threshold")?);
            }
            "--no-upsample" => {
                cfg.upsample = Some(false);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let started = Instant::now();
    let dump = run_detection(cfg)?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    println!("image {}x{} pixels", dump.width, dump.height);
    println!("sift: {elapsed_ms:5.2} ms");
    println!(
        "Detected {} keypoints ({} descriptor rows)",
        dump.keypoints.len(),
        dump.descriptor_rows
    );
    let json_out = PathBuf::from(&dump.image).with_extension("keypoints.json");
    println!("Saved JSON dump to {}", json_out.display());

    Ok(())
}
