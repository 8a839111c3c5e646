//! User-space drainers.
//!
//! One drainer worker per steered queue. Each iteration waits for ring
//! activity with a bounded timeout (so stop stays responsive), peeks a batch
//! of descriptors, builds the enriched record for each frame, invokes the
//! analysis callback, and returns the batch to the fill ring. Frame return is
//! unconditional: a panicking callback or an exhausted delivery budget never
//! leaks a frame.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, warn};

use crate::capture::CaptureTee;
use crate::flowtable::FlowTable;
use crate::maps::{ConfigSlot, PolicySlot};
use crate::memory::{DrainerRing, SteerRx};
use crate::policy::{DirectionPolicy, TagPolicy};
use crate::stats::{Stat, StatsTable};
use crate::subscription::AnalysisCallback;

/// Per-second delivery budget shared by all drainers.
///
/// The limit itself lives in the live config, so it can change while traffic
/// flows; the gate only tracks the current wall-clock window and how much of
/// it is spent. Window bookkeeping is racy by design: a reset can be claimed
/// by any drainer, and the budget is approximate across the boundary.
pub(crate) struct RateGate {
    started: Instant,
    window: AtomicU64,
    used: AtomicU64,
}

impl RateGate {
    pub(crate) fn new() -> Self {
        RateGate {
            started: Instant::now(),
            window: AtomicU64::new(0),
            used: AtomicU64::new(0),
        }
    }

    /// Claims one delivery slot; false when this second's budget is spent.
    /// A `limit` of 0 means unlimited.
    pub(crate) fn claim(&self, limit: u64) -> bool {
        if limit == 0 {
            return true;
        }
        let now = self.started.elapsed().as_secs();
        if self.window.load(Ordering::Relaxed) != now
            && self.window.swap(now, Ordering::Relaxed) != now
        {
            self.used.store(0, Ordering::Relaxed);
        }
        self.used.fetch_add(1, Ordering::Relaxed) < limit
    }
}

/// Everything a drainer needs besides its receive handle.
pub(crate) struct DrainerCtx {
    pub queue_id: u32,
    pub stats: Arc<StatsTable>,
    pub config: Arc<ConfigSlot>,
    pub tag_policy: Arc<PolicySlot<dyn TagPolicy>>,
    pub dir_policy: Arc<PolicySlot<dyn DirectionPolicy>>,
    pub flow_table: Option<FlowTable>,
    pub capture: Option<Arc<CaptureTee>>,
    pub rate: Arc<RateGate>,
    pub callback: Arc<dyn AnalysisCallback>,
    pub stop: Arc<AtomicBool>,
}

impl DrainerCtx {
    /// Builds the record for one frame and delivers it.
    fn process(&mut self, frame: &[u8]) {
        let mut record = match crate::subscription::FeatureRecord::extract(frame) {
            Ok(record) => record,
            Err(e) => {
                // The classifier only steers frames it could parse, so this
                // indicates pool corruption or a torn descriptor.
                debug!("drainer {}: unparseable steered frame: {}", self.queue_id, e);
                return;
            }
        };

        let key = record.flow_key();
        record.traffic_class = self.tag_policy.load().tag(&key);
        record.direction = self.dir_policy.load().direction(&key);
        if let Some(table) = self.flow_table.as_mut() {
            record.inter_arrival_time = table.observe(record.flow_hash, record.timestamp);
        }

        let limit = self.config.load().max_user_rate;
        if !self.rate.claim(limit) {
            return;
        }
        if let Some(tee) = &self.capture {
            tee.offer(frame, &record);
        }

        let callback = &self.callback;
        match catch_unwind(AssertUnwindSafe(|| callback.on_record(&record))) {
            Ok(0) => {}
            Ok(_) => self.stats.add(Stat::AnomalySignals, 1),
            Err(_) => {
                warn!("drainer {}: analysis callback panicked", self.queue_id);
                self.stats.add(Stat::AnomalySignals, 1);
            }
        }
    }
}

/// Runs a drainer until stop is requested. Blocks the calling thread.
pub(crate) fn run(rx: SteerRx, mut ctx: DrainerCtx, batch_size: usize, wait: Duration) {
    debug!("drainer {} up", ctx.queue_id);
    match rx {
        SteerRx::ZeroCopy(ring) => run_zero_copy(ring, &mut ctx, batch_size, wait),
        SteerRx::Copied(chan) => run_copied(chan, &mut ctx, batch_size, wait),
    }
    debug!("drainer {} down", ctx.queue_id);
}

fn run_zero_copy(mut ring: DrainerRing, ctx: &mut DrainerCtx, batch_size: usize, wait: Duration) {
    let mut descs = Vec::with_capacity(batch_size);
    while !ctx.stop.load(Ordering::Acquire) {
        let n = ring.peek(batch_size, &mut descs);
        if n == 0 {
            // Bounded wait; the classifier unparks us on publish, and
            // spurious wakeups only cost a peek.
            thread::park_timeout(wait);
            continue;
        }
        for desc in &descs {
            ctx.process(ring.frame(*desc));
        }
        // The whole batch goes home before the next peek, even if a callback
        // panicked above.
        ring.release(&descs);
    }
}

fn run_copied(chan: Receiver<Vec<u8>>, ctx: &mut DrainerCtx, batch_size: usize, wait: Duration) {
    while !ctx.stop.load(Ordering::Acquire) {
        let first = match chan.recv_timeout(wait) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        ctx.process(&first);
        for _ in 1..batch_size {
            match chan.try_recv() {
                Ok(frame) => ctx.process(&frame),
                Err(_) => break,
            }
        }
    }
}
