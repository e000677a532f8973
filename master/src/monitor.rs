use std::time::SystemTime;

use crate::state::AppState;
use crate::{MONITOR_SWEEP_INTERVAL, WORKER_DEAD_TIMEOUT};

/// Marca workers muertos y reencola sus tareas, cada `MONITOR_SWEEP_INTERVAL`.
pub async fn monitor_workers(state: AppState) {
    loop {
        tokio::time::sleep(MONITOR_SWEEP_INTERVAL).await;
        state.sweep_dead_workers(SystemTime::now(), WORKER_DEAD_TIMEOUT);
    }
}
