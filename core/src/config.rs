//! Engine configuration.
//!
//! [`EngineConfig`] fixes the resources of a run (interface, queues, ring and
//! pool geometry) and is consumed at init. The live [`Config`] subset is held
//! in an atomically swappable slot and re-read by the classifier once per
//! packet, so `sampling_stride`, `max_user_rate`, the protocol filter, and the
//! steer target can change while traffic flows.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{Error, Result};

/// Protocol selector bits for the classifier filter mask.
pub mod proto_mask {
    use crate::protocols::packet::ipv4::{IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};

    pub const TCP: u8 = 1 << 0;
    pub const UDP: u8 = 1 << 1;
    pub const ICMP: u8 = 1 << 2;
    pub const OTHER: u8 = 1 << 3;
    pub const ALL: u8 = TCP | UDP | ICMP | OTHER;

    /// The mask bit covering an IPv4 protocol number.
    #[inline]
    pub fn bit_for(protocol: u8) -> u8 {
        match protocol {
            IPPROTO_TCP => TCP,
            IPPROTO_UDP => UDP,
            IPPROTO_ICMP => ICMP,
            _ => OTHER,
        }
    }
}

/// Live classifier configuration.
///
/// The classifier reads one snapshot per packet: `sampling_stride`,
/// `max_user_rate`, and `protocol_mask` take effect on the packet after an
/// update. `steer_queue_id` is the exception: ring halves are move-only
/// single-producer handles, so the steer target is resolved once when the
/// engine starts and a later update does not re-target running classifiers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Steer 1-in-N of the frames passing the protocol filter. Must be >= 1.
    pub sampling_stride: u32,
    /// Callback invocations per second; 0 means unlimited.
    pub max_user_rate: u64,
    /// Bitset over [`proto_mask`] selecting which protocols may be steered.
    pub protocol_mask: u8,
    /// Default ring for steered frames on queues without a dedicated ring.
    /// Consumed at start; not live thereafter.
    pub steer_queue_id: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sampling_stride: 1,
            max_user_rate: 0,
            protocol_mask: proto_mask::ALL,
            steer_queue_id: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.sampling_stride == 0 {
            return Err(Error::InvalidArgument(
                "sampling_stride must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full engine configuration, fixed at init.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// NIC to attach to.
    pub interface: String,
    /// RX queues to bind, one classifier and one drainer per entry.
    pub queue_ids: Vec<u32>,
    pub sampling_stride: u32,
    pub max_user_rate: u64,
    /// Protocol names selecting the filter mask: tcp, udp, icmp, other.
    pub protocols: Vec<String>,
    pub steer_queue_id: u32,
    /// Drainer peek limit per wakeup.
    pub batch_size: usize,
    /// RX ring slots per queue. Must be a power of two.
    pub ring_capacity: u32,
    /// Bytes per pool frame. Must fit MTU plus headroom.
    pub frame_size: u32,
    /// Frames in the pool per queue.
    pub pool_frames: u32,
    /// Hand frames to drainers through shared rings; `false` falls back to a
    /// copy-based channel for portability.
    pub zero_copy: bool,
    /// Bounded drainer wait, milliseconds. Keeps stop responsive.
    pub drainer_wait_ms: u64,
    pub promiscuous: bool,
    /// Flow table entries per drainer; 0 disables flow tracking.
    pub flow_table_entries: usize,
    /// Flow idle timeout, milliseconds. A flow seen after this gap restarts.
    pub flow_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            interface: String::new(),
            queue_ids: vec![0],
            sampling_stride: 1,
            max_user_rate: 0,
            protocols: vec![
                "tcp".to_string(),
                "udp".to_string(),
                "icmp".to_string(),
                "other".to_string(),
            ],
            steer_queue_id: 0,
            batch_size: 64,
            ring_capacity: 4096,
            frame_size: 2048,
            pool_frames: 4096,
            zero_copy: true,
            drainer_wait_ms: 1000,
            promiscuous: false,
            flow_table_entries: 0,
            flow_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(Error::InvalidArgument("interface is required".to_string()));
        }
        if self.queue_ids.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one queue id is required".to_string(),
            ));
        }
        let mut ids = self.queue_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.queue_ids.len() {
            return Err(Error::InvalidArgument(
                "queue_ids contains duplicates".to_string(),
            ));
        }
        if !self.queue_ids.contains(&self.steer_queue_id) {
            return Err(Error::InvalidArgument(format!(
                "steer_queue_id {} is not a bound queue",
                self.steer_queue_id
            )));
        }
        if !self.ring_capacity.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "ring_capacity {} is not a power of two",
                self.ring_capacity
            )));
        }
        if self.frame_size < 256 || self.frame_size > u16::MAX as u32 {
            return Err(Error::InvalidArgument(format!(
                "frame_size {} outside 256..=65535",
                self.frame_size
            )));
        }
        if self.pool_frames == 0 {
            return Err(Error::InvalidArgument("pool_frames must be >= 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be >= 1".to_string()));
        }
        self.protocol_mask()?;
        self.live()?.validate()
    }

    /// The filter mask encoded by `protocols`.
    pub fn protocol_mask(&self) -> Result<u8> {
        let mut mask = 0;
        for name in &self.protocols {
            mask |= match name.as_str() {
                "tcp" => proto_mask::TCP,
                "udp" => proto_mask::UDP,
                "icmp" => proto_mask::ICMP,
                "other" => proto_mask::OTHER,
                unknown => {
                    return Err(Error::InvalidArgument(format!(
                        "unknown protocol {:?} (expected tcp, udp, icmp, other)",
                        unknown
                    )))
                }
            };
        }
        Ok(mask)
    }

    /// The live subset installed in the config slot at init.
    pub fn live(&self) -> Result<Config> {
        Ok(Config {
            sampling_stride: self.sampling_stride,
            max_user_rate: self.max_user_rate,
            protocol_mask: self.protocol_mask()?,
            steer_queue_id: self.steer_queue_id,
        })
    }
}

/// Loads and validates a TOML engine configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", path.display(), e)))?;
    let config: EngineConfig = toml::from_str(&raw)
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> EngineConfig {
        EngineConfig {
            interface: "eth0".to_string(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn core_config_default_is_valid_with_interface() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn core_config_rejects_missing_interface() {
        let config = EngineConfig::default();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn core_config_rejects_non_pow2_ring() {
        let mut config = valid();
        config.ring_capacity = 1000;
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn core_config_rejects_zero_stride() {
        let mut config = valid();
        config.sampling_stride = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn core_config_rejects_unknown_protocol() {
        let mut config = valid();
        config.protocols = vec!["tcp".to_string(), "gre".to_string()];
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn core_config_rejects_unbound_steer_queue() {
        let mut config = valid();
        config.queue_ids = vec![0, 1];
        config.steer_queue_id = 2;
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn core_config_mask_from_protocols() {
        let mut config = valid();
        config.protocols = vec!["tcp".to_string(), "udp".to_string()];
        assert_eq!(
            config.protocol_mask().unwrap(),
            proto_mask::TCP | proto_mask::UDP
        );
    }

    #[test]
    fn core_config_parses_toml() {
        let raw = r#"
            interface = "eth1"
            queue_ids = [0, 1]
            sampling_stride = 10
            protocols = ["tcp", "udp"]
            ring_capacity = 8192
            zero_copy = false
        "#;
        let config: EngineConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.interface, "eth1");
        assert_eq!(config.queue_ids, vec![0, 1]);
        assert_eq!(config.sampling_stride, 10);
        assert!(!config.zero_copy);
        assert_eq!(config.ring_capacity, 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn core_config_rejects_unknown_toml_key() {
        let raw = r#"
            interface = "eth1"
            ring_size = 4096
        "#;
        assert!(toml::from_str::<EngineConfig>(raw).is_err());
    }
}
