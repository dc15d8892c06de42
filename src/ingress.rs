//! Staged fan-in/fan-out between the decoder and the shard inboxes.
//!
//! One decoder thread calls [`IngressCoordinator::submit_from_decoder`].
//! K producer threads each own one mailbox ring and forward to a
//! disjoint set of shard inboxes: `shard = symbol_id % N` picks the
//! shard, `producer = shard % K` picks the mailbox. The mapping is a
//! partition, never a hash collision, so no shard inbox ever sees two
//! writers and every ring stays SPSC.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::info;

use crate::engine::MatchingEngine;
use crate::order::Order;
use crate::ring::{Ring, RingError};

#[derive(Debug)]
pub struct IngressCoordinator {
    engine: Arc<MatchingEngine>,
    mailboxes: Vec<Arc<Ring<Order>>>,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    submitted: AtomicU64,
}

impl IngressCoordinator {
    /// Build K producer mailboxes. `num_producers` of zero is bumped
    /// to one; a non-power-of-two mailbox capacity fails fast.
    pub fn new(
        engine: Arc<MatchingEngine>,
        num_producers: usize,
        mailbox_capacity: usize,
    ) -> Result<Self, RingError> {
        let num_producers = num_producers.max(1);
        let mut mailboxes = Vec::with_capacity(num_producers);
        for _ in 0..num_producers {
            mailboxes.push(Arc::new(Ring::with_capacity(mailbox_capacity)?));
        }
        Ok(Self {
            engine,
            mailboxes,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            submitted: AtomicU64::new(0),
        })
    }

    /// Start the producer threads. Idempotent.
    pub fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let mut workers = match self.workers.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        for mailbox in &self.mailboxes {
            let mailbox = Arc::clone(mailbox);
            let engine = Arc::clone(&self.engine);
            let running = Arc::clone(&self.running);
            workers.push(std::thread::spawn(move || {
                producer_loop(&mailbox, &engine, &running);
            }));
        }
        info!(producers = self.mailboxes.len(), "ingress started");
    }

    /// Stop the producers. Each drains its mailbox before exiting.
    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let handles: Vec<_> = match self.workers.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            let _ = handle.join();
        }
        info!("ingress stopped");
    }

    /// Blocking submit from the decoder thread: spins until the target
    /// mailbox accepts. Single caller thread by contract; the decoder
    /// is expected to throttle upstream.
    pub fn submit_from_decoder(&self, order: Order) {
        let shard = self.engine.shard_of(order.symbol_id);
        let producer = shard % self.mailboxes.len();
        let mailbox = &self.mailboxes[producer];
        let mut item = order;
        loop {
            match mailbox.try_enqueue(item) {
                Ok(()) => {
                    self.submitted.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(back) => {
                    item = back;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Orders accepted from the decoder so far.
    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn num_producers(&self) -> usize {
        self.mailboxes.len()
    }

    /// Orders sitting in mailboxes, not yet forwarded to a shard.
    pub fn pending(&self) -> usize {
        self.mailboxes.iter().map(|m| m.len()).sum()
    }

    /// The producer that forwards for `shard` (informational).
    pub fn producer_of_shard(&self, shard: usize) -> usize {
        shard % self.mailboxes.len()
    }
}

impl Drop for IngressCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn producer_loop(mailbox: &Ring<Order>, engine: &MatchingEngine, running: &AtomicBool) {
    loop {
        match mailbox.try_dequeue() {
            Some(order) => {
                let shard = engine.shard_of(order.symbol_id);
                // Spin until the shard inbox accepts; give up only if
                // the engine itself has shut down under us
                loop {
                    if engine.enqueue_to_shard(shard, order) {
                        break;
                    }
                    if !engine.is_running() {
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
            None => {
                // Drain-then-exit: the mailbox is empty at this miss
                if !running.load(Ordering::Acquire) {
                    break;
                }
                std::hint::spin_loop();
            }
        }
    }
}
