//! Fakes shared by the worker's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use offcache_client::Network;
use offcache_core::config::AppConfig;
use offcache_core::{Error, Request, Response, ResponseKind};
use url::Url;

use crate::host::{ClientInfo, Host, Notification};
use crate::settings::WorkerSettings;

pub const ORIGIN: &str = "https://app.test";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn settings() -> WorkerSettings {
    let config = AppConfig {
        app_origin: ORIGIN.into(),
        cache_prefix: "app".into(),
        cache_version: "v2".into(),
        app_name: "Test App".into(),
        manifest: vec!["/".into(), "/index.html".into()],
        ..Default::default()
    };
    WorkerSettings::from_config(&config).unwrap()
}

pub fn html(body: &str) -> Response {
    Response::new(200, "OK", body.to_string()).with_header("Content-Type", "text/html")
}

/// Network whose answers are scripted per URL; unscripted URLs fail.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<Request>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `response`, stamping the final URL and a kind
    /// derived from the test origin.
    pub fn route(&self, url: &Url, response: Response) {
        let kind = if response.kind == ResponseKind::Basic && url.origin() != Url::parse(ORIGIN).unwrap().origin() {
            ResponseKind::Cors
        } else {
            response.kind
        };
        let response = response.with_url(url.clone()).with_kind(kind);
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn unroute(&self, url: &Url) {
        self.routes.lock().unwrap().remove(url.as_str());
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.clone());
        self.routes
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| Error::Network(format!("{} unreachable", request.url)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Claim,
    Focus(String),
    OpenWindow(String),
    Notify(Notification),
}

/// Host that records every command and serves a fixed client list.
#[derive(Default)]
pub struct RecordingHost {
    pub clients: Mutex<Vec<ClientInfo>>,
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clients(clients: Vec<ClientInfo>) -> Self {
        Self { clients: Mutex::new(clients), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn claim(&self) -> Result<(), Error> {
        self.calls.lock().unwrap().push(HostCall::Claim);
        Ok(())
    }

    async fn clients(&self) -> Result<Vec<ClientInfo>, Error> {
        Ok(self.clients.lock().unwrap().clone())
    }

    async fn focus(&self, client_id: &str) -> Result<(), Error> {
        self.calls.lock().unwrap().push(HostCall::Focus(client_id.to_string()));
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<(), Error> {
        self.calls.lock().unwrap().push(HostCall::OpenWindow(url.to_string()));
        Ok(())
    }

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error> {
        self.calls.lock().unwrap().push(HostCall::Notify(notification.clone()));
        Ok(())
    }
}
