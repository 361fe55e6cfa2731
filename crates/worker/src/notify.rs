//! Push, notification-click and background-sync hooks.

use offcache_client::same_origin;
use offcache_core::{Error, PushPayload};

use crate::host::{Notification, NotificationAction};
use crate::lifecycle::Worker;

pub const DEFAULT_BODY: &str = "You have new updates";
pub const DEFAULT_TAG: &str = "offcache-notification";
pub const OPEN_ACTION: &str = "open";

impl Worker {
    /// Build a notification from a push body and show it.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> Result<Notification, Error> {
        let payload = PushPayload::parse(data);
        let notification = Notification {
            title: payload.title.unwrap_or_else(|| self.settings.app_name.clone()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            actions: vec![NotificationAction { action: OPEN_ACTION.into(), title: "Open App".into() }],
        };
        self.host.show_notification(&notification).await?;
        tracing::debug!(tag = %notification.tag, "showed push notification");
        Ok(notification)
    }

    /// Focus an open instance of the app, or open a new one.
    ///
    /// Only the `open` action and plain clicks (no action) do anything.
    pub async fn handle_notification_click(&self, action: Option<&str>) -> Result<(), Error> {
        if !matches!(action, None | Some(OPEN_ACTION)) {
            tracing::debug!(action = ?action, "ignoring notification action");
            return Ok(());
        }

        let existing = self.host.clients().await?.into_iter().find(|client| {
            url::Url::parse(&client.url).is_ok_and(|u| same_origin(&u, &self.settings.origin))
        });

        match existing {
            Some(client) => self.host.focus(&client.id).await,
            None => {
                let root = self.settings.origin.join("/").map_err(|e| Error::InvalidUrl(e.to_string()))?;
                self.host.open_window(root.as_str()).await
            }
        }
    }

    pub fn handle_sync(&self, tag: &str) {
        tracing::info!(tag, "background sync");
    }
}
