//! The embedding environment as seen from the worker.
//!
//! Everything that acts on application instances (claiming them, focusing
//! or opening windows, showing notifications) goes through `Host`.

use async_trait::async_trait;
use offcache_core::Error;
use serde::{Deserialize, Serialize};

/// An open application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub focused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub actions: Vec<NotificationAction>,
}

#[async_trait]
pub trait Host: Send + Sync {
    /// Take control of every open instance without a reload.
    async fn claim(&self) -> Result<(), Error>;

    /// Instances currently open, controlled or not.
    async fn clients(&self) -> Result<Vec<ClientInfo>, Error>;

    async fn focus(&self, client_id: &str) -> Result<(), Error>;

    async fn open_window(&self, url: &str) -> Result<(), Error>;

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error>;
}
