//! Wiring of the core service over a concrete store.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use orgchart_core::clock::SystemClock;
use orgchart_core::permission::access::{AccessMirror, AccessSync, RetryPolicy};
use orgchart_core::service::PlanService;
use orgchart_core::settings::Settings;
use orgchart_core::store::{PropertyStore, TabularStore};

/// A running service plus its access-mirror worker.
pub struct App {
    pub service: PlanService,
    access: AccessSync,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl App {
    /// Build the service over `store`, which also acts as the access mirror.
    pub fn start<S>(store: Arc<S>, settings: &Settings) -> Self
    where
        S: TabularStore + PropertyStore + AccessMirror + 'static,
    {
        let cancel = CancellationToken::new();
        let mirror: Arc<dyn AccessMirror> = store.clone();
        let (access, worker) = AccessSync::spawn(mirror, RetryPolicy::default(), cancel.clone());
        let service =
            PlanService::from_store(store, access.clone(), Arc::new(SystemClock), settings);
        Self {
            service,
            access,
            cancel,
            worker,
        }
    }

    /// Drain queued access changes, then stop the worker.
    pub async fn shutdown(self) {
        self.access.flush().await;
        self.cancel.cancel();
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "access sync worker panicked");
        }
    }
}
