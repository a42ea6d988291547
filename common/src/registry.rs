// Cron registry reader
//
// Definitions live under `<prefix>:cron:jobs:<name>`, one cron line per key.
// They are created and edited elsewhere; this side only lists and parses them.

use crate::keys::KeySpace;
use crate::models::CronDefinition;
use crate::store::CoordinationStore;
use crate::telemetry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct CronRegistry {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
}

impl CronRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Every parseable definition, keyed by name
    ///
    /// Never fails: an unreachable registry yields an empty map, and entries
    /// that vanish or fail to parse are skipped individually.
    #[instrument(skip(self), fields(prefix = %self.keys.prefix()))]
    pub async fn list_active(&self) -> BTreeMap<String, CronDefinition> {
        let mut crons = BTreeMap::new();

        let cron_keys = match self.store.scan_prefix(&self.keys.jobs_prefix()).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Cron registry unreachable, no crons will fire this pass");
                return crons;
            }
        };

        for cron_key in cron_keys {
            let name = self.keys.job_name_from_key(&cron_key);

            let line = match self.store.get(&cron_key).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(cron_name = %name, "Cron entry removed while listing");
                    continue;
                }
                Err(e) => {
                    warn!(cron_name = %name, error = %e, "Failed to read cron entry, skipping");
                    continue;
                }
            };

            match CronDefinition::parse(name, &line) {
                Ok(definition) => {
                    crons.insert(name.to_string(), definition);
                }
                Err(e) => {
                    warn!(cron_name = %name, error = %e, "Skipping malformed cron entry");
                    telemetry::record_invalid_cron(name);
                }
            }
        }

        debug!(cron_count = crons.len(), "Loaded active crons");
        crons
    }
}
