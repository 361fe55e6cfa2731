//! Commands posted to the worker by the hosting application.

use offcache_core::{ControlMessage, ControlReply, Error};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::lifecycle::Worker;

fn send_reply(reply: Option<oneshot::Sender<ControlReply>>, message: ControlReply) {
    match reply {
        Some(tx) => {
            if tx.send(message).is_err() {
                tracing::debug!("reply channel closed before reply was sent");
            }
        }
        None => tracing::debug!("no reply channel for control message"),
    }
}

impl Worker {
    /// Handle one control message.
    ///
    /// Unknown or malformed messages are ignored. Replies go to `reply` when
    /// one was provided; a receiver that has gone away is not an error.
    pub async fn handle_message(
        &self,
        data: &Value,
        reply: Option<oneshot::Sender<ControlReply>>,
    ) -> Result<Option<ControlMessage>, Error> {
        let Some(message) = ControlMessage::decode(data) else {
            tracing::debug!("ignoring unrecognized control message");
            return Ok(None);
        };
        tracing::debug!(message = ?message, "control message");

        match message {
            ControlMessage::SkipWaiting => self.skip_waiting().await?,
            ControlMessage::GetVersion => {
                send_reply(reply, ControlReply::Version { version: self.version().to_string() });
            }
            ControlMessage::ClearCache => {
                let existed = self.db.delete_generation(self.version()).await?;
                tracing::info!(generation = self.version(), existed, "cleared current cache generation");
                send_reply(reply, ControlReply::Cleared { success: true });
            }
        }
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use offcache_core::{CacheDb, Request};
    use serde_json::json;

    use super::*;
    use crate::lifecycle::WorkerState;
    use crate::testing::{FakeNetwork, RecordingHost, html, settings, url};

    async fn worker() -> (CacheDb, Arc<FakeNetwork>, Worker) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(FakeNetwork::new());
        network.route(&url("/"), html("root"));
        network.route(&url("/index.html"), html("index"));
        let worker = Worker::new(settings(), db.clone(), network.clone(), Arc::new(RecordingHost::new()));
        (db, network, worker)
    }

    #[tokio::test]
    async fn test_get_version_replies() {
        let (_db, _network, worker) = worker().await;
        let (tx, rx) = oneshot::channel();

        worker.handle_message(&json!({"type": "GET_VERSION"}), Some(tx)).await.unwrap();

        assert_eq!(rx.await.unwrap(), ControlReply::Version { version: "app-v2".into() });
    }

    #[tokio::test]
    async fn test_get_version_without_reply_channel() {
        let (_db, _network, worker) = worker().await;
        let handled = worker.handle_message(&json!({"type": "GET_VERSION"}), None).await.unwrap();
        assert_eq!(handled, Some(ControlMessage::GetVersion));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_fine() {
        let (_db, _network, worker) = worker().await;
        let (tx, rx) = oneshot::channel();
        drop(rx);

        assert!(worker.handle_message(&json!({"type": "GET_VERSION"}), Some(tx)).await.is_ok());
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_waiting_worker() {
        let (_db, _network, worker) = worker().await;
        worker.install().await.unwrap();

        worker.handle_message(&json!({"type": "SKIP_WAITING"}), None).await.unwrap();

        assert_eq!(worker.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_clear_cache_then_lookup_misses() {
        let (db, network, worker) = worker().await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        network.unroute(&url("/index.html"));
        let (tx, rx) = oneshot::channel();

        worker.handle_message(&json!({"type": "CLEAR_CACHE"}), Some(tx)).await.unwrap();

        assert_eq!(rx.await.unwrap(), ControlReply::Cleared { success: true });
        assert!(!db.has_generation("app-v2").await.unwrap());
        let outcome = worker.handle_fetch(&Request::get(url("/index.html"))).await;
        assert_ne!(outcome.source(), "cache");
    }

    #[tokio::test]
    async fn test_clear_cache_when_already_gone() {
        let (_db, _network, worker) = worker().await;
        let (tx, rx) = oneshot::channel();

        worker.handle_message(&json!({"type": "CLEAR_CACHE"}), Some(tx)).await.unwrap();

        assert_eq!(rx.await.unwrap(), ControlReply::Cleared { success: true });
    }

    #[tokio::test]
    async fn test_unknown_messages_ignored() {
        let (_db, _network, worker) = worker().await;
        for data in [json!({"type": "PING"}), json!({"kind": "GET_VERSION"}), json!("hello"), Value::Null] {
            let (tx, mut rx) = oneshot::channel();
            assert_eq!(worker.handle_message(&data, Some(tx)).await.unwrap(), None);
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(worker.state(), WorkerState::Installing);
    }
}
