//! Durable store writer background task

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::bus::StoreWriter;

/// Background task that flushes published values to the durable store.
///
/// Writes queued while a save is in flight are coalesced into the next save,
/// so only the latest value of each key is written.
pub async fn store_writer_task(writer: StoreWriter) {
    info!("Starting store writer task");

    let StoreWriter {
        store,
        mut requests,
        mut entries,
    } = writer;

    while let Some((key, value)) = requests.recv().await {
        entries.insert(key.as_str().to_string(), (*value).clone());
        let mut coalesced = 1;
        while let Ok((key, value)) = requests.try_recv() {
            entries.insert(key.as_str().to_string(), (*value).clone());
            coalesced += 1;
        }

        let snapshot = entries.clone();
        let store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => debug!("Persisted {} pending writes", coalesced),
            Ok(Err(e)) => error!("Failed to persist state: {}", e),
            Err(e) => error!("Store writer save panicked: {}", e),
        }
    }

    info!("State bus closed, store writer stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryStore, StateBus, StateKey};
    use serde_json::json;

    #[tokio::test]
    async fn flushes_persisted_keys_only() {
        let store = Arc::new(MemoryStore::default());
        let (bus, writer) = StateBus::with_store(store.clone(), 8);
        bus.publish(StateKey::TextCase, "upper");
        bus.publish(StateKey::ShowClock, &json!({"visible": true}));
        bus.publish(StateKey::TextCase, "lower");
        drop(bus);

        store_writer_task(writer).await;

        let saved = store.entries();
        assert_eq!(saved.get("textCase"), Some(&json!("lower")));
        assert!(!saved.contains_key("showClock"));
    }
}
