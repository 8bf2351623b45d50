//! udp_tx.rs — UDP transmitter for TowPublications
//!
//! Sends each tick's publication to the monitor via:
//!   - Unicast: 127.0.0.1:5555 (local monitor, always enabled)
//!   - Multicast: 239.255.0.1:5555 (when --multicast is given)
//!
//! Send errors are logged and the simulation keeps running.

use std::net::UdpSocket;
use tracing::{debug, warn};

use tow_types::TowPublication;

pub const MULTICAST_ADDR: &str = "239.255.0.1:5555";

pub struct UdpTransmitter {
    socket: UdpSocket,
    unicast_addr: String,
    multicast_addr: Option<String>,
}

impl UdpTransmitter {
    pub fn new(unicast_addr: &str, multicast_addr: Option<&str>) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(false)?;
        Ok(Self {
            socket,
            unicast_addr: unicast_addr.to_string(),
            multicast_addr: multicast_addr.map(|s| s.to_string()),
        })
    }

    pub fn send(&self, publication: &TowPublication) {
        let bytes = match publication.to_bytes() {
            Ok(b) => b,
            Err(e) => { warn!("UDP: serialize failed: {e}"); return; }
        };

        if let Err(e) = self.socket.send_to(&bytes, &self.unicast_addr) {
            warn!("UDP: unicast send failed: {e}");
        } else {
            debug!("UDP → {} seq={} fields={}", self.unicast_addr, publication.seq_num, publication.fields.len());
        }

        if let Some(mc) = &self.multicast_addr {
            if let Err(e) = self.socket.send_to(&bytes, mc) {
                warn!("UDP: multicast send failed: {e}");
            }
        }
    }
}
