//! Engine configuration and construction.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    assembly::Leniency,
    calibration::CalibrationRecord,
    catalog::Catalog,
    channel::{ChannelDecoder, ChannelHandle, MessageListener},
    sync::DetectorVariant,
    Result,
};

/// Variant used when neither the config nor a calibration record selects one.
pub const DEFAULT_DETECTOR: DetectorVariant = DetectorVariant::Word64;

/// JSON engine configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Detector variant, overriding any calibration record.
    pub detector: Option<DetectorVariant>,
    /// Calibration record written by the calibration harness.
    pub calibration_file: Option<PathBuf>,
    /// Sync pattern name to maximum accepted bit errors.
    pub sync_thresholds: BTreeMap<String, u32>,
    /// Message class name to minimum populated slots before decoding.
    pub quorum: BTreeMap<String, usize>,
    pub leniency: Leniency,
}

impl EngineConfig {
    /// # Errors
    /// [Error::Io](crate::Error::Io) or [Error::Json](crate::Error::Json) if the file
    /// cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Apply thresholds and quorums to `catalog`.
    ///
    /// # Errors
    /// If a named pattern or class does not exist or a value is out of range.
    pub fn apply(&self, catalog: &mut Catalog) -> Result<()> {
        for (name, threshold) in &self.sync_thresholds {
            catalog.patterns_mut().set_threshold(name, *threshold)?;
        }
        for (name, quorum) in &self.quorum {
            catalog.set_quorum(name, *quorum)?;
        }
        Ok(())
    }

    /// The configured detector, else the calibrated one, else [DEFAULT_DETECTOR].
    ///
    /// A missing calibration file is not an error; the engine may run before the first
    /// calibration.
    ///
    /// # Errors
    /// If the calibration file exists but cannot be read.
    pub fn resolve_detector(&self) -> Result<DetectorVariant> {
        if let Some(variant) = self.detector {
            return Ok(variant);
        }
        let Some(path) = &self.calibration_file else {
            return Ok(DEFAULT_DETECTOR);
        };
        if !path.exists() {
            warn!(path = %path.display(), "calibration record not found, using {DEFAULT_DETECTOR}");
            return Ok(DEFAULT_DETECTOR);
        }
        let variant = CalibrationRecord::load(path)?
            .detector()
            .unwrap_or(DEFAULT_DETECTOR);
        Ok(variant)
    }
}

/// Shared catalog plus the detector variant fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct Engine {
    catalog: Arc<Catalog>,
    variant: DetectorVariant,
    leniency: Leniency,
}

impl Engine {
    /// Engine over the standard catalog.
    ///
    /// # Errors
    /// If the config names unknown patterns or classes, or the calibration record cannot
    /// be read.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_catalog(Catalog::standard()?, &config)
    }

    /// # Errors
    /// See [Engine::new].
    pub fn with_catalog(mut catalog: Catalog, config: &EngineConfig) -> Result<Self> {
        config.apply(&mut catalog)?;
        let variant = config.resolve_detector()?;
        info!(%variant, "sync detector");
        Ok(Self {
            catalog: Arc::new(catalog),
            variant,
            leniency: config.leniency,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn variant(&self) -> DetectorVariant {
        self.variant
    }

    /// A decoder for one channel or timeslot delivering messages to `listener`.
    pub fn channel<L: MessageListener>(&self, timeslot: u8, listener: L) -> ChannelDecoder<L> {
        ChannelDecoder::new(
            self.catalog.clone(),
            self.variant,
            timeslot,
            self.leniency,
            listener,
        )
    }

    /// Like [Engine::channel], running on its own thread.
    ///
    /// # Errors
    /// If the worker thread cannot be spawned.
    pub fn spawn_channel<L>(&self, timeslot: u8, listener: L) -> Result<ChannelHandle>
    where
        L: MessageListener + Send + 'static,
    {
        ChannelHandle::spawn(self.channel(timeslot, listener))
    }
}
