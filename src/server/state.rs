use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::admission::AdmissionPolicy;
use crate::config::Settings;
use crate::connection_manager::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<RoomRegistry>,
    pub admission: Arc<AdmissionPolicy>,
    /// Fired once when the process starts shutting down
    pub shutdown_tx: broadcast::Sender<()>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self::with_shutdown(settings, shutdown_tx)
    }

    pub fn with_shutdown(settings: Settings, shutdown_tx: broadcast::Sender<()>) -> Self {
        let registry = Arc::new(RoomRegistry::with_config(
            settings.broadcast.to_broadcast_config(),
        ));
        let admission = Arc::new(AdmissionPolicy::from_config(&settings.admission));

        Self {
            settings: Arc::new(settings),
            registry,
            admission,
            shutdown_tx,
            start_time: Instant::now(),
        }
    }
}
