//! Duration lookup for items whose listing carried none

use crate::core::destination::{Destination, DurationResolver};
use crate::core::track::parse_iso_duration;
use crate::error::TubeError;
use crate::platform::api;
use crate::platform::client::Transport;
use crate::utils::config::ConfigStore;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Ids per lookup request
const BATCH_SIZE: usize = 50;

/// [`DurationResolver`] that asks the videos endpoint and fills the catalog
/// and the destination
pub struct ApiDurationResolver {
    transport: Arc<dyn Transport>,
    store: Arc<ConfigStore>,
    api_key: String,
}

impl ApiDurationResolver {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<ConfigStore>, api_key: &str) -> Self {
        Self {
            transport,
            store,
            api_key: api_key.to_string(),
        }
    }
}

fn parse_durations(body: &[u8]) -> Vec<(String, u64)> {
    let Ok(document) = serde_json::from_slice::<Value>(body) else {
        return Vec::new();
    };
    let Some(items) = document.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?;
            let token = item.pointer("/contentDetails/duration")?.as_str()?;
            Some((id.to_string(), parse_iso_duration(token)?))
        })
        .collect()
}

#[async_trait]
impl DurationResolver for ApiDurationResolver {
    async fn resolve(
        &self,
        destination: &dyn Destination,
        track_ids: &[String],
    ) -> Result<(), TubeError> {
        let missing: Vec<&str> = track_ids
            .iter()
            .map(String::as_str)
            .filter(|id| {
                self.store
                    .track_info(id)
                    .map(|info| info.duration.is_none())
                    .unwrap_or(false)
            })
            .collect();

        debug!(
            "Resolving {} durations for {}",
            missing.len(),
            destination.id()
        );

        for batch in missing.chunks(BATCH_SIZE) {
            let url = api::with_api_key(&api::video_durations_url(&batch.join(",")), &self.api_key);
            let body = self.transport.get(&url, &[]).await?;
            for (track_id, seconds) in parse_durations(&body) {
                self.store.set_track_duration(&track_id, seconds);
                destination.set_item_duration(&track_id, seconds);
            }
        }
        Ok(())
    }
}
