use crate::server::{
    auth::Authenticator,
    config::ServerConfig,
    export::{Exporter, TableExporter},
    notify::{LogNotifier, Notifier},
};
use std::sync::Arc;
use tokenq::SqliteStore;

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub auth: Arc<Authenticator>,
    pub notifier: Arc<dyn Notifier>,
    pub exporter: Arc<dyn Exporter>,
}

impl AppState {
    /// State with the default log notifier and table exporter.
    pub fn new(store: SqliteStore, config: &ServerConfig) -> Self {
        let auth = Authenticator::new(
            &config.admin_username,
            &config.admin_password,
            &config.jwt_secret,
            config.jwt_ttl,
        );
        Self {
            store,
            auth: Arc::new(auth),
            notifier: Arc::new(LogNotifier),
            exporter: Arc::new(TableExporter),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}
