//! Engine lifecycle and the embedding surface.
//!
//! [`Engine::new`] allocates every queue's transport and installs the live
//! configuration; [`Engine::start`] binds the NIC and spawns one classifier
//! thread and one drainer thread per queue; [`Engine::stop`] is cooperative
//! and blocks until all workers have exited. Dropping the engine stops it and
//! releases all resources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use log::{debug, info, warn};

use crate::capture::{CaptureSink, CaptureTee};
use crate::classifier::Classifier;
use crate::config::{Config, EngineConfig};
use crate::drainer::{self, DrainerCtx, RateGate};
use crate::errors::{Error, Result};
use crate::flowtable::FlowTable;
use crate::maps::{ConfigSlot, PolicySlot, SteerTable};
use crate::memory::{steer_pair, SteerRx};
use crate::policy::{DefaultTagPolicy, DirectionPolicy, PortDirectionPolicy, TagPolicy};
use crate::port::Port;
use crate::stats::{StatsSnapshot, StatsTable};
use crate::subscription::AnalysisCallback;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Running,
    Stopped,
}

/// The packet preprocessing engine.
pub struct Engine {
    config: EngineConfig,
    live: Arc<ConfigSlot>,
    stats: Arc<StatsTable>,
    tag_policy: Arc<PolicySlot<dyn TagPolicy>>,
    dir_policy: Arc<PolicySlot<dyn DirectionPolicy>>,
    steer: SteerTable,
    drainer_rx: Vec<(u32, SteerRx)>,
    callback: Arc<dyn AnalysisCallback>,
    capture: Option<Arc<CaptureTee>>,
    flow_tracking: Option<(usize, Duration)>,
    stop: Arc<AtomicBool>,
    state: State,
    classifier_workers: Vec<JoinHandle<()>>,
    drainer_workers: Vec<JoinHandle<()>>,
    drainer_threads: Vec<Thread>,
}

impl Engine {
    /// Initializes an engine: validates the configuration, allocates one
    /// transport pair per queue, and installs the live config snapshot.
    pub fn new<C>(config: EngineConfig, callback: C) -> Result<Engine>
    where
        C: AnalysisCallback + 'static,
    {
        config.validate()?;

        let steer = SteerTable::new();
        let mut drainer_rx = Vec::with_capacity(config.queue_ids.len());
        for &queue_id in &config.queue_ids {
            let (tx, rx) = steer_pair(
                config.zero_copy,
                config.ring_capacity,
                config.frame_size,
                config.pool_frames,
            )?;
            steer.set(queue_id, tx);
            drainer_rx.push((queue_id, rx));
        }

        let flow_tracking = if config.flow_table_entries > 0 {
            Some((
                config.flow_table_entries,
                Duration::from_millis(config.flow_timeout_ms),
            ))
        } else {
            None
        };

        Ok(Engine {
            live: Arc::new(ConfigSlot::new(config.live()?)),
            stats: Arc::new(StatsTable::new()),
            tag_policy: Arc::new(PolicySlot::new(Box::new(DefaultTagPolicy))),
            dir_policy: Arc::new(PolicySlot::new(Box::new(PortDirectionPolicy))),
            steer,
            drainer_rx,
            callback: Arc::new(callback),
            capture: None,
            flow_tracking,
            stop: Arc::new(AtomicBool::new(false)),
            state: State::Ready,
            classifier_workers: Vec::new(),
            drainer_workers: Vec::new(),
            drainer_threads: Vec::new(),
            config,
        })
    }

    /// Binds the NIC and spawns the per-queue workers.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            State::Ready => {}
            State::Running => return Err(Error::AlreadyRunning),
            State::Stopped => return Err(Error::NotInitialized),
        }

        // A failed interface resolution leaves the engine Ready for retry;
        // once workers consume the transports, a failure is terminal.
        let port = Port::open(&self.config.interface)?;
        if let Err(e) = self.spawn_workers(&port) {
            self.abort_workers();
            self.state = State::Stopped;
            return Err(e);
        }

        info!(
            "engine running on {} ({} queue(s), {})",
            port.name(),
            self.config.queue_ids.len(),
            if self.config.zero_copy {
                "zero-copy"
            } else {
                "copied"
            }
        );
        self.state = State::Running;
        Ok(())
    }

    fn spawn_workers(&mut self, port: &Port) -> Result<()> {
        let queues = self.config.queue_ids.len();
        let wait = Duration::from_millis(self.config.drainer_wait_ms);
        let batch_size = self.config.batch_size;

        // Drainers first, so every classifier can be handed its consumer's
        // thread for wakeups before the first packet arrives.
        for (queue_id, rx) in std::mem::take(&mut self.drainer_rx) {
            let ctx = DrainerCtx {
                queue_id,
                stats: Arc::clone(&self.stats),
                config: Arc::clone(&self.live),
                tag_policy: Arc::clone(&self.tag_policy),
                dir_policy: Arc::clone(&self.dir_policy),
                flow_table: self
                    .flow_tracking
                    .map(|(entries, timeout)| FlowTable::new(entries, timeout.as_millis() as u64)),
                capture: self.capture.clone(),
                rate: Arc::new(RateGate::new()),
                callback: Arc::clone(&self.callback),
                stop: Arc::clone(&self.stop),
            };
            let worker = thread::Builder::new()
                .name(format!("fs-drain-{}", queue_id))
                .spawn(move || drainer::run(rx, ctx, batch_size, wait))
                .map_err(|e| {
                    Error::ResourceExhausted(format!("drainer thread {}: {}", queue_id, e))
                })?;
            let handle = worker.thread().clone();
            self.steer.with(queue_id, |tx| tx.set_consumer(handle.clone()));
            self.drainer_threads.push(handle);
            self.drainer_workers.push(worker);
        }

        let steer_queue_id = self.live.load().steer_queue_id;
        for queue_id in self.config.queue_ids.clone() {
            let tx = self.steer.take(queue_id, steer_queue_id);
            let mut classifier = Classifier::new(
                queue_id,
                Arc::clone(&self.live),
                Arc::clone(&self.stats),
                tx,
            );
            let mut channel =
                port.rx_channel(queues, Duration::from_millis(200), self.config.promiscuous)?;
            let stop = Arc::clone(&self.stop);
            let worker = thread::Builder::new()
                .name(format!("fs-rx-{}", queue_id))
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        match channel.next() {
                            Ok(frame) => {
                                classifier.classify(frame);
                            }
                            // Timeouts re-check the stop flag; anything else
                            // is transient on a live NIC.
                            Err(e) => {
                                debug!("rx {}: {}", queue_id, e);
                            }
                        }
                    }
                })
                .map_err(|e| {
                    Error::ResourceExhausted(format!("rx thread {}: {}", queue_id, e))
                })?;
            self.classifier_workers.push(worker);
        }
        Ok(())
    }

    /// Requests stop and blocks until every worker has exited. A no-op on an
    /// engine that is not running.
    pub fn stop(&mut self) {
        if self.state != State::Running {
            return;
        }
        self.abort_workers();
        self.state = State::Stopped;
        info!("engine stopped: {}", self.stats.snapshot());
    }

    fn abort_workers(&mut self) {
        self.stop.store(true, Ordering::Release);
        for thread in &self.drainer_threads {
            thread.unpark();
        }
        for worker in self.classifier_workers.drain(..) {
            if worker.join().is_err() {
                warn!("classifier worker panicked");
            }
        }
        for worker in self.drainer_workers.drain(..) {
            if worker.join().is_err() {
                warn!("drainer worker panicked");
            }
        }
        self.drainer_threads.clear();
    }

    /// A point-in-time statistics snapshot. Never fails.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Installs a new live configuration. `sampling_stride`,
    /// `max_user_rate`, and `protocol_mask` take effect on the next packet;
    /// `steer_queue_id` was consumed at [`start`](Engine::start) and does not
    /// re-target running classifiers.
    pub fn update_config(&self, config: Config) -> Result<()> {
        config.validate()?;
        self.live.store(config);
        Ok(())
    }

    /// Replaces the traffic-class policy. Takes effect on the next record.
    pub fn set_classifier(&self, policy: Box<dyn TagPolicy>) {
        self.tag_policy.store(policy);
    }

    /// Replaces the direction policy. Takes effect on the next record.
    pub fn set_direction_policy(&self, policy: Box<dyn DirectionPolicy>) {
        self.dir_policy.store(policy);
    }

    /// Tees up to `max_frames` delivered frames (with their records) into
    /// `sink`. Must be called before [`start`](Engine::start).
    pub fn enable_capture(&mut self, sink: Box<dyn CaptureSink>, max_frames: u64) -> Result<()> {
        if self.state != State::Ready {
            return Err(Error::AlreadyRunning);
        }
        self.capture = Some(Arc::new(CaptureTee::new(sink, max_frames)));
        Ok(())
    }

    /// Activates per-drainer flow tracking for inter-arrival times. Must be
    /// called before [`start`](Engine::start).
    pub fn enable_flow_tracking(&mut self, max_entries: usize, timeout: Duration) -> Result<()> {
        if self.state != State::Ready {
            return Err(Error::AlreadyRunning);
        }
        if max_entries == 0 {
            return Err(Error::InvalidArgument(
                "flow table needs at least one entry".to_string(),
            ));
        }
        self.flow_tracking = Some((max_entries, timeout));
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
