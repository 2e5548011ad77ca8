//! Tunables shared by the import and update drivers.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use osmforge_core::RELATION_ID_OFFSET;
use osmforge_geom::DEFAULT_RING_SNAP_TOLERANCE;

use crate::PipelineError;

/// Pipeline configuration, usually loaded from a JSON document.
///
/// Every field has a default, so an empty document (`{}`) is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Working directory for the element cache and feature database.
    /// `None` leaves the choice to the caller.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Gap tolerance for snapping nearly-touching ring endpoints.
    pub ring_snap_tolerance: f64,
    /// Offset applied to relation ids in the single-id-space encoding.
    pub relation_id_offset: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            ring_snap_tolerance: DEFAULT_RING_SNAP_TOLERANCE,
            relation_id_offset: RELATION_ID_OFFSET,
        }
    }
}

impl PipelineConfig {
    /// Decode a configuration document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn empty_document_yields_defaults() {
        let config = PipelineConfig::from_json("{}").expect("decode");
        assert_eq!(config, PipelineConfig::default());
        assert!(config.ring_snap_tolerance > 0.0);
    }

    #[rstest]
    fn fields_override_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"ring_snap_tolerance": 0.01, "cache_dir": "/var/lib/osm"}"#,
        )
        .expect("decode");
        assert_eq!(config.ring_snap_tolerance, 0.01);
        assert_eq!(config.cache_dir.as_deref().map(|p| p.as_str()), Some("/var/lib/osm"));
    }
}
