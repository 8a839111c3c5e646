//! NIC binding.
//!
//! Resolves the configured interface and opens one Layer-2 receive channel
//! per RX queue worker. Attaching never disturbs existing connections (the
//! channel only observes), and dropping the receivers detaches with no
//! residual interface state. Multi-queue runs share a fanout group so the
//! kernel spreads flows across the workers by hash.

use std::io;
use std::time::Duration;

use log::info;
use pnet::datalink::{
    self, Channel, Config as ChannelConfig, DataLinkReceiver, FanoutOption, FanoutType,
    NetworkInterface,
};

use crate::errors::{Error, Result};

pub(crate) struct Port {
    interface: NetworkInterface,
    fanout_group: u16,
}

impl Port {
    /// Resolves `name` against the host interface table.
    pub(crate) fn open(name: &str) -> Result<Port> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))?;
        // Group ids only need to be distinct per interface; the ifindex is.
        let fanout_group = (interface.index & 0xffff) as u16;
        info!("bound interface {} (index {})", interface.name, interface.index);
        Ok(Port {
            interface,
            fanout_group,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.interface.name
    }

    /// Opens the receive channel for one RX queue worker.
    ///
    /// `read_timeout` bounds each receive so the worker can observe stop.
    pub(crate) fn rx_channel(
        &self,
        queues: usize,
        read_timeout: Duration,
        promiscuous: bool,
    ) -> Result<Box<dyn DataLinkReceiver>> {
        let linux_fanout = if queues > 1 {
            Some(FanoutOption {
                group_id: self.fanout_group,
                fanout_type: FanoutType::HASH,
                defrag: true,
                rollover: false,
            })
        } else {
            None
        };
        let config = ChannelConfig {
            read_timeout: Some(read_timeout),
            promiscuous,
            linux_fanout,
            ..ChannelConfig::default()
        };
        match datalink::channel(&self.interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => Ok(rx),
            Ok(_) => Err(Error::AttachFailed(format!(
                "{}: unsupported channel type",
                self.interface.name
            ))),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(Error::PermissionDenied(
                format!("{}: {}", self.interface.name, e),
            )),
            Err(e) => Err(Error::AttachFailed(format!(
                "{}: {}",
                self.interface.name, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_port_unknown_interface() {
        match Port::open("flowsieve-no-such-nic0") {
            Err(Error::InterfaceNotFound(name)) => {
                assert_eq!(name, "flowsieve-no-such-nic0")
            }
            other => panic!("expected InterfaceNotFound, got {:?}", other.map(|_| ())),
        }
    }
}
