//! Build sources from configuration

use std::sync::Arc;

use contracts::{RtlsConfig, SystemType, TrackingSource};
use tracing::{info, warn};

use crate::error::{IngestionError, Result};
use crate::null_source::NullSource;
use crate::registry::SourceRegistry;

/// Create the source for `system`.
///
/// Only the synthetic source ships with this build; hardware systems
/// return `SourceUnavailable`.
pub fn create_source(system: SystemType, config: &RtlsConfig) -> Result<Arc<dyn TrackingSource>> {
    match system {
        SystemType::Null => Ok(Arc::new(NullSource::new(config.null_source.clone()))),
        SystemType::OpenVr | SystemType::Motive => Err(IngestionError::unavailable(
            system,
            "driver not included in this build",
        )),
        SystemType::Invalid => Err(IngestionError::unavailable(system, "invalid system type")),
    }
}

/// Registry with one source per enabled system.
///
/// Unavailable systems are logged and left out; the rest of the pipeline
/// keeps working with what is there.
pub fn build_registry(config: &RtlsConfig) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for system in &config.systems {
        let source = match create_source(*system, config) {
            Ok(source) => source,
            Err(e) => {
                warn!(system = %system, error = %e, "skipping tracking source");
                continue;
            }
        };
        if let Err(e) = registry.register(source) {
            warn!(system = %system, error = %e, "skipping tracking source");
        }
    }
    info!(sources = registry.source_count(), "source registry built");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_source_available() {
        let config = RtlsConfig::default();
        let source = create_source(SystemType::Null, &config).unwrap();
        assert_eq!(source.system_type(), SystemType::Null);
        assert!(!source.is_connected());
    }

    #[test]
    fn test_hardware_sources_fail_cleanly() {
        let config = RtlsConfig::default();
        for system in [SystemType::OpenVr, SystemType::Motive, SystemType::Invalid] {
            let err = create_source(system, &config).err().unwrap();
            assert!(matches!(err, IngestionError::SourceUnavailable { .. }));
        }
    }

    #[test]
    fn test_registry_skips_unavailable() {
        let config = RtlsConfig {
            systems: vec![SystemType::Null, SystemType::Motive],
            ..Default::default()
        };
        let registry = build_registry(&config);
        assert_eq!(registry.source_count(), 1);
        assert_eq!(registry.systems().collect::<Vec<_>>(), vec![SystemType::Null]);
    }
}
