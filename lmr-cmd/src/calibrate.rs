use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lmr::{
    calibration::{calibrate as run, CalibrationOpts},
    sync::{DetectorVariant, SyncCatalog},
};
use tracing::info;

use crate::Format;

pub fn calibrate(
    output: &Path,
    variants: &[DetectorVariant],
    duration_ms: u64,
    format: &Format,
) -> Result<()> {
    let variants = if variants.is_empty() {
        DetectorVariant::ALL.to_vec()
    } else {
        variants.to_vec()
    };
    let opts = CalibrationOpts::builder()
        .duration(Duration::from_millis(duration_ms))
        .variants(variants)
        .build();

    let report = run(Arc::new(SyncCatalog::standard()), &opts).context("calibrating")?;
    report
        .record()
        .save(output)
        .with_context(|| format!("writing calibration record {output:?}"))?;
    info!("wrote {output:?}");

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => {
            for score in &report.scores {
                let mark = if score.variant == report.winner { "*" } else { " " };
                println!(
                    "{mark} {:<8} {:>14.0} bits/s  passes={}",
                    score.variant.as_str(),
                    score.bits_per_sec,
                    score.passes
                );
            }
        }
    }
    Ok(())
}
