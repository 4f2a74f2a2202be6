//! Transport Module
//!
//! Abstraction over the host's Bluetooth Classic (RFCOMM/SPP) connection.
//! The crate never opens sockets itself: the host supplies an implementation
//! and reports scan results, connection changes and inbound messages as
//! [`TransportEvent`]s on the channel it is given.

use crate::domain::models::TransportEvent;
use crate::domain::settings::DeviceFilter;
use anyhow::Result;
use tokio::sync::mpsc;

pub trait Transport: Send + Sync {
    /// Start discovery; results and later connection events go to `events`
    fn scan(&self, filter: &DeviceFilter, events: mpsc::UnboundedSender<TransportEvent>)
        -> Result<()>;

    /// Connect to a peripheral previously reported by a scan
    fn connect_peripheral(&self, id: &str) -> Result<()>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Send one complete frame
    fn send_message(&self, bytes: &[u8]) -> Result<()>;
}
