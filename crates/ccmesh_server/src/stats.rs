//! Purely observational snapshot reporter, coalesced to at most once every
//! 300ms regardless of how often state changes (§4.4 "Stats reporter").

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::state::Matchmaker;

const MIN_INTERVAL: Duration = Duration::from_millis(300);

pub async fn run(mm: Arc<Matchmaker>) {
    loop {
        let notified = mm.subscribe_stats();
        notified.await;
        report(&mm).await;
        tokio::time::sleep(MIN_INTERVAL).await;
    }
}

async fn report(mm: &Matchmaker) {
    let inner = mm.lock().await;
    if inner.job_queue_by_key.is_empty() {
        info!("outstanding jobs: none");
        return;
    }
    for (key, queue) in &inner.job_queue_by_key {
        info!(key = %key, queued = queue.len(), "outstanding jobs");
    }
}
