//! Slot accounting and CPU-load sampling behind the reported-availability
//! formula from §4.5: `min(max_slots - active_slots, cpu_idle)`, rounded up
//! to `max_slots` when within 1 of it so a nearly-idle host isn't starved.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tokio::sync::{Mutex, Notify};

const CPU_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

pub struct Capacity {
    max_slots: u32,
    active_slots: AtomicU32,
    cpu_idle: Mutex<f64>,
    notify: Notify,
}

impl Capacity {
    pub fn new(max_slots: u32) -> Arc<Self> {
        Arc::new(Self {
            max_slots,
            active_slots: AtomicU32::new(0),
            cpu_idle: Mutex::new(max_slots as f64),
            notify: Notify::new(),
        })
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    /// Tries to claim a slot for an incoming job. Returns `false` (and
    /// claims nothing) if the worker is already at capacity.
    pub fn try_acquire(&self) -> bool {
        loop {
            let current = self.active_slots.load(Ordering::SeqCst);
            if current >= self.max_slots {
                return false;
            }
            if self
                .active_slots
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.notify.notify_one();
                return true;
            }
        }
    }

    pub fn release(&self) {
        self.active_slots.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub async fn reported_availability(&self) -> f64 {
        let active = self.active_slots.load(Ordering::SeqCst) as f64;
        let cpu_idle = *self.cpu_idle.lock().await;
        let raw = (self.max_slots as f64 - active).min(cpu_idle).max(0.0);
        if self.max_slots as f64 - raw < 1.0 {
            self.max_slots as f64
        } else {
            raw
        }
    }

    pub fn notify_changed(&self) {
        self.notify.notify_one();
    }

    pub fn subscribe(&self) -> impl std::future::Future<Output = ()> + '_ {
        self.notify.notified()
    }

    /// Runs forever, refreshing the per-CPU idle estimate on a slow poll.
    pub async fn sample_cpu_forever(self: Arc<Self>) {
        let mut sys = System::new_all();
        loop {
            sys.refresh_cpu_usage();
            let num_cpus = sys.cpus().len().max(1) as f64;
            let used: f64 = sys.cpus().iter().map(|c| c.cpu_usage() as f64).sum::<f64>() / 100.0;
            let idle = (num_cpus - used).max(0.0);
            *self.cpu_idle.lock().await = idle;
            self.notify.notify_one();
            tokio::time::sleep(CPU_SAMPLE_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_blocks_at_capacity() {
        let cap = Capacity::new(2);
        assert!(cap.try_acquire());
        assert!(cap.try_acquire());
        assert!(!cap.try_acquire());
        cap.release();
        assert!(cap.try_acquire());
    }

    #[tokio::test]
    async fn availability_rounds_up_near_max() {
        let cap = Capacity::new(4);
        *cap.cpu_idle.lock().await = 3.8;
        assert_eq!(cap.reported_availability().await, 4.0);
    }
}
