//! Reference utility embedding the flowsieve engine.
//!
//! Attaches to a NIC, steers sampled traffic through the engine, and runs
//! one of three bundled analysis callbacks over the delivered feature
//! records. Exit codes: 0 success, 1 configuration error, 2 attach/bind
//! failure, 3 permission denied, 4 runtime failure during processing.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{ArgEnum, Parser};
use log::{error, info, warn};

use flowsieve_core::capture::PcapSink;
use flowsieve_core::config::{load_config, EngineConfig};
use flowsieve_core::policy::TrafficClass;
use flowsieve_core::protocols::packet::tcp::SYN;
use flowsieve_core::subscription::FeatureRecord;
use flowsieve_core::{Engine, Error, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
enum Mode {
    /// Tally records per traffic class.
    Classify,
    /// Flag high-entropy and otherwise unusual records.
    Anomaly,
    /// Flag probe-shaped traffic.
    Security,
}

#[derive(Parser, Debug)]
#[clap(name = "flowsieve", about = "Packet preprocessing engine reference utility")]
struct Args {
    /// NIC to attach to.
    interface: String,
    /// Analysis mode.
    #[clap(arg_enum)]
    mode: Mode,
    /// Number of RX queues to bind.
    #[clap(long, default_value_t = 1)]
    queues: u32,
    /// Steer 1-in-N matching packets.
    #[clap(long = "sample-stride", default_value_t = 1)]
    sample_stride: u32,
    /// Stop after SEC seconds (default: run until INT/TERM).
    #[clap(long, value_name = "SEC")]
    duration: Option<u64>,
    /// Drainer batch size.
    #[clap(long, default_value_t = 64)]
    batch: usize,
    /// Cap callback invocations per second.
    #[clap(long, value_name = "PPS")]
    rate: Option<u64>,
    /// Use the copy-based delivery path.
    #[clap(long = "no-zero-copy")]
    no_zero_copy: bool,
    #[clap(long)]
    verbose: bool,
    /// Optional TOML engine configuration; flags override it.
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    config: Option<PathBuf>,
    /// Tee delivered frames into a PCAP file.
    #[clap(long, parse(from_os_str), value_name = "FILE")]
    capture: Option<PathBuf>,
    /// Frame cap for --capture.
    #[clap(long = "capture-frames", default_value_t = 1000)]
    capture_frames: u64,
    /// Dump final statistics as JSON.
    #[clap(long)]
    json: bool,
}

#[derive(Default)]
struct ModeCounters {
    normal: AtomicU64,
    suspicious: AtomicU64,
    priority: AtomicU64,
    flagged: AtomicU64,
}

impl ModeCounters {
    fn count_class(&self, record: &FeatureRecord) {
        let counter = match record.traffic_class {
            TrafficClass::Normal => &self.normal,
            TrafficClass::Suspicious => &self.suspicious,
            TrafficClass::Priority => &self.priority,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, mode: Mode) {
        match mode {
            Mode::Classify => println!(
                "classes: normal {}, suspicious {}, priority {}",
                self.normal.load(Ordering::Relaxed),
                self.suspicious.load(Ordering::Relaxed),
                self.priority.load(Ordering::Relaxed),
            ),
            Mode::Anomaly => println!(
                "anomalous records: {}",
                self.flagged.load(Ordering::Relaxed)
            ),
            Mode::Security => println!(
                "security alerts: {}",
                self.flagged.load(Ordering::Relaxed)
            ),
        }
    }
}

/// High payload entropy (ciphertext or packed data on an unexpected flow) or
/// a suspicious class tag.
fn is_anomalous(record: &FeatureRecord) -> bool {
    (record.packet_entropy > 216 && record.payload_len > 0)
        || record.traffic_class == TrafficClass::Suspicious
}

/// Probe-shaped traffic: bare SYNs outside normal flows, or portless
/// protocols the classifier already tagged suspicious.
fn is_hostile(record: &FeatureRecord) -> bool {
    (record.tcp_flags == SYN && record.traffic_class == TrafficClass::Suspicious)
        || (record.protocol != 6 && record.protocol != 17
            && record.traffic_class == TrafficClass::Suspicious)
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    match catch_unwind(AssertUnwindSafe(|| run(&args))) {
        Ok(Ok(stats)) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats).unwrap());
            } else {
                println!("{}", stats);
            }
        }
        Ok(Err(e)) => {
            error!("{}", e);
            process::exit(exit_code(&e));
        }
        Err(_) => {
            error!("runtime failure during processing");
            process::exit(4);
        }
    }
}

fn exit_code(e: &Error) -> i32 {
    match e {
        Error::InvalidArgument(_) | Error::NotInitialized | Error::AlreadyRunning => 1,
        Error::InterfaceNotFound(_) | Error::AttachFailed(_) | Error::ResourceExhausted(_) => 2,
        Error::PermissionDenied(_) => 3,
    }
}

fn run(args: &Args) -> Result<StatsSnapshot, Error> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    config.interface = args.interface.clone();
    if args.queues > 1 {
        config.queue_ids = (0..args.queues).collect();
        if !config.queue_ids.contains(&config.steer_queue_id) {
            config.steer_queue_id = 0;
        }
    }
    config.sampling_stride = args.sample_stride;
    config.batch_size = args.batch;
    if let Some(rate) = args.rate {
        config.max_user_rate = rate;
    }
    if args.no_zero_copy {
        config.zero_copy = false;
    }

    let counters = Arc::new(ModeCounters::default());
    let callback = {
        let counters = Arc::clone(&counters);
        let mode = args.mode;
        let verbose = args.verbose;
        move |record: &FeatureRecord| -> i32 {
            match mode {
                Mode::Classify => {
                    counters.count_class(record);
                    0
                }
                Mode::Anomaly => {
                    if is_anomalous(record) {
                        counters.flagged.fetch_add(1, Ordering::Relaxed);
                        if verbose {
                            info!("anomaly: {}", record);
                        }
                        1
                    } else {
                        0
                    }
                }
                Mode::Security => {
                    if is_hostile(record) {
                        counters.flagged.fetch_add(1, Ordering::Relaxed);
                        warn!("alert: {}", record);
                        1
                    } else {
                        0
                    }
                }
            }
        }
    };

    let mut engine = Engine::new(config, callback)?;
    if args.mode == Mode::Anomaly {
        // Inter-arrival times feed the anomaly heuristics.
        engine.enable_flow_tracking(65_536, Duration::from_secs(30))?;
    }
    if let Some(path) = &args.capture {
        let sink = PcapSink::create(path)
            .map_err(|e| Error::InvalidArgument(format!("capture file: {}", e)))?;
        engine.enable_capture(Box::new(sink), args.capture_frames)?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))
            .map_err(|e| Error::ResourceExhausted(format!("signal handler: {}", e)))?;
    }

    engine.start()?;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last_report = Instant::now();
    while !stop.load(Ordering::Acquire) {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
        if args.verbose && last_report.elapsed() >= Duration::from_secs(5) {
            info!("{}", engine.stats());
            last_report = Instant::now();
        }
    }

    engine.stop();
    counters.report(args.mode);
    Ok(engine.stats())
}
