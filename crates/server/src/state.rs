//! Shared application state.

use std::sync::Arc;

use pagemirror_client::{ContentApi, RemoteClient, Transport};
use pagemirror_core::{AppConfig, Db, Error};

use crate::interceptor::InterceptorChain;
use crate::proxy::ProxyEngine;
use crate::sync::SyncEngine;

/// Collaborators handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Db,
    pub client: RemoteClient,
    pub sync: SyncEngine,
    pub interceptors: InterceptorChain,
}

impl AppState {
    /// Wire the remote client, sync engine and proxy over one transport.
    pub fn new(config: AppConfig, db: Db, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        let client = RemoteClient::new(transport, db.clone(), &config);
        let api = ContentApi::new(client.clone(), &config);
        let sync = SyncEngine::new(api, db.clone(), &config);

        let proxy = ProxyEngine::new(db.clone(), client.clone(), &config)?;
        let interceptors = InterceptorChain::new().with(Arc::new(proxy));

        Ok(Self { config: Arc::new(config), db, client, sync, interceptors })
    }
}
