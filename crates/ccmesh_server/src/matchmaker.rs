//! The matchmaker loop: FIFO job selection across keys, weighted-random
//! worker pick within a key, one assignment per pass (§4.4).

use std::sync::Arc;

use ccmesh_protocol::WorkerAssignment;
use rand::distributions::{Distribution, WeightedIndex};
use rand::thread_rng;
use tracing::{error, info, warn};

use crate::state::Matchmaker;

/// Runs until the process exits. A panic anywhere in here is allowed to
/// unwind past this task per the fatal-crash policy (§4.4): the matchmaker
/// is the single point of correctness, and `main`'s panic hook
/// (`install_fatal_panic_hook`) exits the process on any panic in this or
/// any other task rather than let the server limp on with inconsistent
/// state.
pub async fn run(mm: Arc<Matchmaker>) {
    loop {
        let notified = mm.subscribe();
        let matched = try_match_one(&mm).await;
        if !matched {
            notified.await;
        }
    }
}

/// Attempts one assignment. Returns whether a job was matched (in which
/// case the caller should immediately try again rather than wait).
async fn try_match_one(mm: &Matchmaker) -> bool {
    let mut inner = mm.lock().await;

    let mut candidates: Vec<u64> = inner
        .job_queue_by_key
        .values()
        .filter_map(|q| q.front().copied())
        .collect();
    candidates.sort_unstable();

    for job_id in candidates {
        let Some(job) = inner.jobs.get(&job_id) else {
            continue;
        };
        let key = job.key.clone();
        let hostname = job.hostname.clone();

        let Some(worker_ids) = inner.available_workers_by_key.get(&key) else {
            continue;
        };
        if worker_ids.is_empty() {
            continue;
        }

        let weights: Vec<f64> = worker_ids
            .iter()
            .map(|id| inner.workers.get(id).map(|w| w.avail_slots).unwrap_or(0.0))
            .collect();
        let Some(worker_id) = pick_weighted(worker_ids, &weights) else {
            continue;
        };

        inner.deactivate_job(job_id);
        inner.set_worker_slots(worker_id, 0.0);

        let worker = inner.workers.get(&worker_id).expect("worker just selected");
        let assignment = WorkerAssignment {
            hostname: worker.desc.hostname.clone(),
            addrs: worker.desc.addrs.clone(),
        };
        let job_conn = inner.jobs.get(&job_id).map(|j| j.conn.clone());
        drop(inner);

        if let Some(job_conn) = job_conn {
            match job_conn.send(&assignment.encode()).await {
                Ok(()) => {
                    info!(job_id, worker_id, %hostname, "assigned worker");
                }
                Err(e) => {
                    warn!(job_id, error = %e, "assignment send failed, nuking job");
                    job_conn.nuke().await;
                }
            }
        }
        return true;
    }

    false
}

/// Cumulative-weight random choice. Workers with weight 0 are never picked.
/// Returns `None` only if every candidate weight is non-positive.
fn pick_weighted(ids: &[u64], weights: &[f64]) -> Option<u64> {
    if weights.iter().all(|&w| w <= 0.0) {
        return None;
    }
    let safe_weights: Vec<f64> = weights.iter().map(|&w| w.max(0.0)).collect();
    let dist = match WeightedIndex::new(&safe_weights) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "weighted index construction failed");
            return None;
        }
    };
    let idx = dist.sample(&mut thread_rng());
    Some(ids[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_weighted_skips_zero_weights() {
        let ids = [1, 2, 3];
        let weights = [0.0, 0.0, 5.0];
        for _ in 0..20 {
            assert_eq!(pick_weighted(&ids, &weights), Some(3));
        }
    }

    #[test]
    fn pick_weighted_none_when_all_zero() {
        let ids = [1, 2];
        let weights = [0.0, 0.0];
        assert_eq!(pick_weighted(&ids, &weights), None);
    }
}
