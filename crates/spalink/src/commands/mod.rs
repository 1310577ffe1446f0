pub mod config_cmd;
pub mod run;
pub mod status;
pub mod sweep_cmd;

use std::sync::Arc;

use spalink_api::SpaClient;
use spalink_config::Config;
use spalink_core::{Bridge, CloudGateway, CoreError};

use crate::error::CliError;
use crate::store::YamlCapabilityStore;

/// Wire a bridge from the file config: cloud client, gateway adapter,
/// capability store. The store is returned too so callers can read
/// results or hand it to the bus side.
pub(crate) fn build_bridge(
    config: &Config,
) -> Result<(Bridge, Arc<YamlCapabilityStore>), CliError> {
    let credentials = config.credentials()?;
    let url = config.cloud_url()?;
    let client = Arc::new(
        SpaClient::new(url, credentials, &config.transport()).map_err(CoreError::from)?,
    );
    let gateway = Arc::new(CloudGateway::new(client));
    let store = Arc::new(YamlCapabilityStore::new(config.results_path()));
    let engine_store: Arc<dyn spalink_core::SweepStore> = store.clone();
    let bridge = Bridge::new(config.bridge_config(), gateway, Some(engine_store));
    Ok((bridge, store))
}
