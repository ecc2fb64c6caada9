use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::config::Config;
use crate::services::{DeliveryEngine, SessionTracker};
use crate::websocket::ConnectionRegistry;

/// Shared per-worker application state. Everything in here is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub sessions: SessionTracker,
    pub engine: DeliveryEngine,
    pub config: Arc<Config>,
}
