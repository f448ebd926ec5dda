//! Choosing the fastest [SyncDetector](crate::sync::SyncDetector) variant for this host.
//!
//! Every variant is first checked to produce the same candidates as the others on a
//! synthetic stream, then timed on that stream for a fixed duration. The fastest variant
//! is written to a [CalibrationRecord] that the engine reads once at construction.
use std::collections::BTreeMap;
use std::fs::File;
use std::hint::black_box;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    sync::{scan, DetectorVariant, SyncCandidate, SyncCatalog},
    Error, Result,
};

/// Record key of the sync detector selection.
pub const SYNC_DETECTOR: &str = "sync_detector";

#[derive(TypedBuilder, Debug, Clone)]
pub struct CalibrationOpts {
    /// Untimed passes over the stream before timing each variant.
    #[builder(default = 2)]
    warmup_passes: usize,
    /// Minimum time spent timing each variant.
    #[builder(default = Duration::from_millis(250))]
    duration: Duration,
    /// Length of the synthetic stream.
    #[builder(default = 8192)]
    stream_bits: usize,
    /// Bits between injected sync patterns.
    #[builder(default = 240)]
    sync_spacing: usize,
    #[builder(default = 0x5eed)]
    seed: u64,
    #[builder(default = DetectorVariant::ALL.to_vec())]
    variants: Vec<DetectorVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantScore {
    pub variant: DetectorVariant,
    pub bits_per_sec: f64,
    pub passes: u64,
    /// Candidates found per pass.
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub scores: Vec<VariantScore>,
    pub winner: DetectorVariant,
}

impl CalibrationReport {
    pub fn record(&self) -> CalibrationRecord {
        CalibrationRecord::default().with_detector(self.winner)
    }
}

/// Persisted selections, implementation name to variant name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub selections: BTreeMap<String, String>,
}

impl CalibrationRecord {
    /// # Errors
    /// [Error::Io] if the file cannot be read, [Error::Json] if it is not a record.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// # Errors
    /// [Error::Io] if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// The selected detector variant, if recorded and known.
    pub fn detector(&self) -> Option<DetectorVariant> {
        let name = self.selections.get(SYNC_DETECTOR)?;
        match name.parse() {
            Ok(variant) => Some(variant),
            Err(_) => {
                warn!(variant = %name, "calibration record names an unknown detector variant");
                None
            }
        }
    }

    pub fn with_detector(mut self, variant: DetectorVariant) -> Self {
        self.selections
            .insert(SYNC_DETECTOR.to_string(), variant.as_str().to_string());
        self
    }
}

/// Random bits with a catalog pattern, carrying between 0 and its threshold bit errors,
/// injected every `spacing` bits.
pub fn synthetic_stream(catalog: &SyncCatalog, bits: usize, spacing: usize, seed: u64) -> Vec<bool> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut zult: Vec<bool> = (0..bits).map(|_| rng.gen()).collect();
    let patterns: Vec<_> = catalog.iter().map(|(_, p)| p).collect();
    if patterns.is_empty() || spacing == 0 {
        return zult;
    }

    for (n, start) in (0..bits).step_by(spacing).enumerate() {
        let pattern = patterns[n % patterns.len()];
        let len = pattern.len as usize;
        if start + len > bits {
            break;
        }
        let mut sync = pattern.bits();
        for _ in 0..rng.gen_range(0..=pattern.threshold) {
            let idx = rng.gen_range(0..len);
            sync[idx] = !sync[idx];
        }
        zult[start..start + len].copy_from_slice(&sync);
    }
    zult
}

/// Verify all `variants` find identical candidates in `stream`.
///
/// # Errors
/// [Error::Calibration] naming the first variant that disagrees with the first one.
pub fn check_equivalence(
    catalog: &Arc<SyncCatalog>,
    stream: &[bool],
    variants: &[DetectorVariant],
) -> Result<()> {
    let results: Vec<(DetectorVariant, Vec<SyncCandidate>)> = variants
        .par_iter()
        .map(|variant| {
            let mut detector = variant.build(catalog.clone());
            (*variant, scan(detector.as_mut(), stream.iter().copied()))
        })
        .collect();

    let Some((base, expected)) = results.first() else {
        return Ok(());
    };
    for (variant, found) in &results[1..] {
        if found != expected {
            return Err(Error::Calibration(format!(
                "{variant} found {} candidates, {base} found {}",
                found.len(),
                expected.len()
            )));
        }
    }
    debug!(
        variants = results.len(),
        candidates = expected.len(),
        "detector variants agree"
    );
    Ok(())
}

fn measure(
    variant: DetectorVariant,
    catalog: &Arc<SyncCatalog>,
    stream: &[bool],
    opts: &CalibrationOpts,
) -> VariantScore {
    let mut detector = variant.build(catalog.clone());
    let mut candidates = 0;
    for _ in 0..opts.warmup_passes {
        candidates = scan(detector.as_mut(), stream.iter().copied()).len();
    }

    let start = Instant::now();
    let mut passes = 0u64;
    while passes == 0 || start.elapsed() < opts.duration {
        for &bit in stream {
            black_box(detector.observe(black_box(bit)));
        }
        passes += 1;
    }
    let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);

    VariantScore {
        variant,
        bits_per_sec: (passes * stream.len() as u64) as f64 / elapsed,
        passes,
        candidates,
    }
}

/// Time every variant in `opts` and pick the fastest.
///
/// Variants are timed one after another so they do not compete for the CPU.
///
/// # Errors
/// [Error::Calibration] if no variants are given or the variants disagree.
pub fn calibrate(catalog: Arc<SyncCatalog>, opts: &CalibrationOpts) -> Result<CalibrationReport> {
    if opts.variants.is_empty() {
        return Err(Error::Calibration("no detector variants to compare".into()));
    }
    let stream = synthetic_stream(&catalog, opts.stream_bits, opts.sync_spacing, opts.seed);
    check_equivalence(&catalog, &stream, &opts.variants)?;

    let mut scores = Vec::with_capacity(opts.variants.len());
    for variant in &opts.variants {
        let score = measure(*variant, &catalog, &stream, opts);
        info!(
            variant = %score.variant,
            bits_per_sec = score.bits_per_sec,
            passes = score.passes,
            "calibrated"
        );
        scores.push(score);
    }

    let winner = scores
        .iter()
        .max_by(|a, b| a.bits_per_sec.total_cmp(&b.bits_per_sec))
        .map(|s| s.variant)
        .ok_or_else(|| Error::Calibration("no scores".into()))?;
    info!(%winner, "selected detector variant");
    Ok(CalibrationReport { scores, winner })
}

/// Run [calibrate] on a background thread.
///
/// # Errors
/// [Error::Io] if the thread cannot be spawned.
pub fn calibrate_in_background(
    catalog: Arc<SyncCatalog>,
    opts: CalibrationOpts,
) -> Result<JoinHandle<Result<CalibrationReport>>> {
    Ok(thread::Builder::new()
        .name("calibration".into())
        .spawn(move || calibrate(catalog, &opts))?)
}
