//! Builders to construct machines from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheBackendConfig, MachineConfig, PubSubBackendConfig};
use crate::core::{Machine, MachineError, MachineOptions};
use crate::infra::{Cache, InMemoryCache, InMemoryPubSub, PubSub};

/// Build a root machine from configuration using provided backend factories.
///
/// # Errors
///
/// Returns [`MachineError::InvalidConfig`] if validation fails, or whatever
/// a factory or [`Machine::new`] reports.
pub fn build_machine<FC, FP>(
    cfg: &MachineConfig,
    mut cache_factory: FC,
    mut pubsub_factory: FP,
) -> Result<Machine, MachineError>
where
    FC: FnMut(&MachineConfig) -> Result<Arc<dyn Cache>, MachineError>,
    FP: FnMut(&MachineConfig) -> Result<Arc<dyn PubSub>, MachineError>,
{
    cfg.validate().map_err(MachineError::InvalidConfig)?;

    let cache = cache_factory(cfg)?;
    let pubsub = pubsub_factory(cfg)?;
    let opts = MachineOptions::from_config(cfg)
        .with_cache(cache)
        .with_pubsub(pubsub);
    Machine::new(opts)
}

/// Build a root machine whose backends are chosen by the configuration's
/// selectors.
///
/// # Errors
///
/// See [`build_machine`].
pub fn build_in_memory_machine(cfg: &MachineConfig) -> Result<Machine, MachineError> {
    build_machine(
        cfg,
        |cfg| match cfg.cache {
            CacheBackendConfig::InMemory => Ok(Arc::new(InMemoryCache::new()) as Arc<dyn Cache>),
        },
        |cfg| match cfg.pubsub {
            PubSubBackendConfig::InMemory => Ok(Arc::new(InMemoryPubSub::with_publish_timeout(
                Duration::from_millis(cfg.publish_timeout_ms),
            )) as Arc<dyn PubSub>),
        },
    )
}
