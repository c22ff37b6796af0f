//! Matchmaker state: job queue, available-worker set, and connection
//! bookkeeping, all behind one lock plus one `Notify` standing in for the
//! design's single condition variable (§4.4, §5).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ccmesh_net::PacketConn;
use ccmesh_protocol::{Key, WorkerDescriptor};
use tokio::sync::{Mutex, MutexGuard, Notify};

pub struct JobRecord {
    pub conn: Arc<PacketConn>,
    pub hostname: String,
    pub key: Key,
    pub active: bool,
}

pub struct WorkerRecord {
    pub conn: Arc<PacketConn>,
    pub desc: WorkerDescriptor,
    pub avail_slots: f64,
    pub active: bool,
}

#[derive(Default)]
pub struct Inner {
    pub jobs: HashMap<u64, JobRecord>,
    pub job_queue_by_key: HashMap<Key, VecDeque<u64>>,
    pub workers: HashMap<u64, WorkerRecord>,
    pub available_workers_by_key: HashMap<Key, Vec<u64>>,
    pub connected_workers_by_key: HashMap<Key, HashSet<u64>>,
    pub karma_by_hostname: HashMap<String, f64>,
}

impl Inner {
    /// Marks a job active and inserts it into its key's queue in ascending
    /// job-id order, so a job reactivated out of turn still lands at its
    /// rank by id rather than jumping to the back (mirrors
    /// `original_source/job_server.py`'s `Job.set_active(True)`, which does
    /// `job_queue.append(self); job_queue.sort()`).
    pub fn activate_job(&mut self, job_id: u64) {
        if let Some(job) = self.jobs.get_mut(&job_id) {
            if !job.active {
                job.active = true;
                let queue = self.job_queue_by_key.entry(job.key.clone()).or_default();
                queue.push_back(job_id);
                queue.make_contiguous().sort_unstable();
            }
        }
    }

    /// Marks a job inactive and removes it from its key's queue.
    pub fn deactivate_job(&mut self, job_id: u64) {
        if let Some(job) = self.jobs.get_mut(&job_id) {
            if job.active {
                job.active = false;
                if let Some(q) = self.job_queue_by_key.get_mut(&job.key) {
                    q.retain(|&id| id != job_id);
                }
            }
        }
    }

    /// Fully removes a job (disconnect or completion) and returns it.
    pub fn remove_job(&mut self, job_id: u64) -> Option<JobRecord> {
        self.deactivate_job(job_id);
        self.jobs.remove(&job_id)
    }

    pub fn set_worker_slots(&mut self, worker_id: u64, avail_slots: f64) {
        let Some(worker) = self.workers.get_mut(&worker_id) else {
            return;
        };
        worker.avail_slots = avail_slots;
        let should_be_active = avail_slots > 0.0;
        if should_be_active && !worker.active {
            worker.active = true;
            for key in &worker.desc.keys {
                self.available_workers_by_key
                    .entry(key.clone())
                    .or_default()
                    .push(worker_id);
            }
        } else if !should_be_active && worker.active {
            worker.active = false;
            for key in &worker.desc.keys {
                if let Some(v) = self.available_workers_by_key.get_mut(key) {
                    v.retain(|&id| id != worker_id);
                }
            }
        }
    }

    fn deactivate_worker(&mut self, worker_id: u64) {
        if let Some(worker) = self.workers.get_mut(&worker_id) {
            if worker.active {
                worker.active = false;
                for key in &worker.desc.keys {
                    if let Some(v) = self.available_workers_by_key.get_mut(key) {
                        v.retain(|&id| id != worker_id);
                    }
                }
            }
        }
    }

    /// Fully removes a worker, returning the conns of any jobs that must now
    /// be nuked because the last worker for one of their keys just left.
    pub fn remove_worker(&mut self, worker_id: u64) -> Vec<Arc<PacketConn>> {
        self.deactivate_worker(worker_id);
        let Some(worker) = self.workers.remove(&worker_id) else {
            return Vec::new();
        };

        let mut orphaned = Vec::new();
        for key in &worker.desc.keys {
            if let Some(set) = self.connected_workers_by_key.get_mut(key) {
                set.remove(&worker_id);
                if set.is_empty() {
                    self.connected_workers_by_key.remove(key);
                    if let Some(queue) = self.job_queue_by_key.remove(key) {
                        for job_id in queue {
                            if let Some(job) = self.jobs.remove(&job_id) {
                                orphaned.push(job.conn);
                            }
                        }
                    }
                }
            }
        }
        orphaned
    }

    pub fn adjust_karma(&mut self, hostname: &str, delta: f64) {
        *self.karma_by_hostname.entry(hostname.to_string()).or_insert(0.0) += delta;
    }
}

/// Shared matchmaker state plus the wakeup signal the matchmaker loop waits
/// on. Every mutation that can unblock the matchmaker must call `notify()`.
pub struct Matchmaker {
    inner: Mutex<Inner>,
    notify: Notify,
    stats_notify: Notify,
    next_job_id: AtomicU64,
    next_worker_id: AtomicU64,
}

impl Matchmaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            stats_notify: Notify::new(),
            next_job_id: AtomicU64::new(0),
            next_worker_id: AtomicU64::new(0),
        })
    }

    pub fn next_job_id(&self) -> u64 {
        self.next_job_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_worker_id(&self) -> u64 {
        self.next_worker_id.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().await
    }

    /// Wakes the matchmaker loop and anyone else waiting on state changes.
    pub fn notify_changed(&self) {
        self.notify.notify_one();
        self.stats_notify.notify_one();
    }

    /// Registers interest in the next state change, to be awaited after the
    /// caller has released the lock and rechecked the condition is still
    /// unmet. Creating this before releasing the lock is what makes the
    /// wait race-free against a concurrent `notify_changed`.
    pub fn subscribe(&self) -> impl std::future::Future<Output = ()> + '_ {
        self.notify.notified()
    }

    pub fn subscribe_stats(&self) -> impl std::future::Future<Output = ()> + '_ {
        self.stats_notify.notified()
    }
}
