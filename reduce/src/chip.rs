//! Per-chip identity, metadata, and processing context.
//!
//! Chip metadata is resolved once, up front, from the header key/value
//! pairs the caller extracted; there is no lazy attribute lookup during the
//! pass loop. The context object carries the chip identity into every log
//! line, replacing any global logging or path state.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ReductionConfig;

/// Identity of one chip within an exposure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChipId {
    /// Exposure base name the chip belongs to.
    pub exposure: String,
    /// CCD number within the mosaic.
    pub ccd: u32,
}

impl ChipId {
    /// Build an id from an exposure base name and ccd number.
    pub fn new(exposure: impl Into<String>, ccd: u32) -> Self {
        Self {
            exposure: exposure.into(),
            ccd,
        }
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.exposure, self.ccd)
    }
}

/// Whether every metadata field came from the supplied header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaStatus {
    /// All fields were present in the header.
    Resolved,
    /// At least one field fell back to its default.
    Unresolved,
}

/// Detector characteristics of one chip, resolved once at setup time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipMeta {
    /// Detector gain in electrons per count.
    pub gain: f64,
    /// Read noise in electrons.
    pub read_noise: f64,
    /// Saturation level in counts.
    pub saturation: f64,
    /// Exposure time in seconds.
    pub exptime: f64,
    /// Pixel scale in arcseconds per pixel.
    pub pixel_scale: f64,
    /// Whether any field fell back to a default.
    pub status: MetaStatus,
}

impl ChipMeta {
    /// Resolve metadata from header key/value pairs.
    ///
    /// Recognized keys (first match wins): `GAIN`; `RDNOISE`, `READNOIS`,
    /// `ENOISE`; `SATURATE`; `EXPTIME`; `PIXSCALE`. Missing keys fall back
    /// to survey defaults and downgrade the record to
    /// [`MetaStatus::Unresolved`].
    pub fn from_header(header: &HashMap<String, f64>) -> Self {
        let mut resolved = true;
        let mut lookup = |names: &[&str], default: f64| {
            for name in names {
                if let Some(&value) = header.get(*name) {
                    return value;
                }
            }
            resolved = false;
            default
        };

        let gain = lookup(&["GAIN"], 1.0);
        let read_noise = lookup(&["RDNOISE", "READNOIS", "ENOISE"], 5.0);
        let saturation = lookup(&["SATURATE"], 60000.0);
        let exptime = lookup(&["EXPTIME"], 1.0);
        let pixel_scale = lookup(&["PIXSCALE"], 0.27);

        Self {
            gain,
            read_noise,
            saturation,
            exptime,
            pixel_scale,
            status: if resolved {
                MetaStatus::Resolved
            } else {
                MetaStatus::Unresolved
            },
        }
    }
}

impl Default for ChipMeta {
    fn default() -> Self {
        Self::from_header(&HashMap::new())
    }
}

/// Everything a chip's pipeline run needs besides pixels and engines.
#[derive(Debug, Clone)]
pub struct ChipContext {
    /// Chip identity, prefixed onto every log line.
    pub id: ChipId,
    /// Resolved detector characteristics.
    pub meta: ChipMeta,
    /// Pipeline configuration for this chip.
    pub config: ReductionConfig,
}

impl ChipContext {
    /// Build a context for one chip.
    pub fn new(id: ChipId, meta: ChipMeta, config: ReductionConfig) -> Self {
        Self { id, meta, config }
    }
}
