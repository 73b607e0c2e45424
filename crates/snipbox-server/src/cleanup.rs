use std::time::Duration;

use tracing::{info, warn};

use snipbox_api::AppState;

/// Background task that prunes expired sessions and reset tokens.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db_state = state.clone();
        match tokio::task::spawn_blocking(move || db_state.db.purge_expired()).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired sessions and reset tokens", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task panicked: {}", e),
        }
    }
}
