#![allow(dead_code)]

use ev3_link::domain::settings::DeviceFilter;
use ev3_link::{BrickService, ScannedDevice, Settings, Transport, TransportEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

pub const BRICK_ID: &str = "00:16:53:4A:2B:10";

/// Simulated brick contents, answered to every reply-expected poll
#[derive(Debug, Clone)]
pub struct BrickModel {
    pub sensors: [u8; 4],
    pub motors: [u8; 4],
    pub sensor_values: [f32; 4],
    pub counts: [i32; 4],
    /// Answer polls at all
    pub responsive: bool,
    /// A reset-mode READSI zeroes the addressed gyro
    pub gyro_resets: bool,
}

impl Default for BrickModel {
    fn default() -> Self {
        Self {
            sensors: [30, 29, 16, 32],
            motors: [7, 8, 126, 126],
            sensor_values: [41.0, 12.0, 0.0, -45.5],
            counts: [0; 4],
            responsive: true,
            gyro_resets: true,
        }
    }
}

impl BrickModel {
    pub fn device_list_reply(&self) -> Vec<u8> {
        let mut payload = vec![0u8; 33];
        payload[..4].copy_from_slice(&self.sensors);
        payload[4..16].fill(126);
        payload[16..20].copy_from_slice(&self.motors);
        reply(&payload)
    }

    pub fn values_reply(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(32);
        for value in self.sensor_values {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        for count in self.counts {
            payload.extend_from_slice(&count.to_le_bytes());
        }
        reply(&payload)
    }
}

/// Wrap a payload in a direct reply frame
pub fn reply(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() + 3) as u16;
    let mut frame = len.to_le_bytes().to_vec();
    frame.extend_from_slice(&[0x00, 0x00, 0x02]);
    frame.extend_from_slice(payload);
    frame
}

/// Transport double that records every frame and answers like a brick
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    events: Mutex<Option<UnboundedSender<TransportEvent>>>,
    model: Mutex<BrickModel>,
}

impl MockTransport {
    pub fn new(model: BrickModel) -> Self {
        Self {
            model: Mutex::new(model),
            ..Default::default()
        }
    }

    pub fn model(&self) -> std::sync::MutexGuard<'_, BrickModel> {
        self.model.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Opcode sections of no-reply frames, in send order
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter(|frame| frame[4] == 0x80)
            .map(|frame| frame[7..].to_vec())
            .collect()
    }

    /// Opcode sections of reply-expected (polling) frames
    pub fn polls(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter(|frame| frame[4] == 0x00)
            .map(|frame| frame[7..].to_vec())
            .collect()
    }

    /// The brick goes away on its own
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Disconnected);
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    fn answer(&self, frame: &[u8]) {
        let ops = &frame[7..];
        let mut model = self.model();
        match frame[4] {
            0x00 if model.responsive => {
                let reply = if ops[0] == 0x98 {
                    model.device_list_reply()
                } else {
                    model.values_reply()
                };
                drop(model);
                self.emit(TransportEvent::Message(reply));
            }
            0x80 if ops.len() >= 5 && ops[0] == 0x9D && ops[4] == 4 && model.gyro_resets => {
                model.sensor_values[ops[2] as usize] = 0.0;
            }
            _ => {}
        }
    }
}

impl Transport for MockTransport {
    fn scan(
        &self,
        _filter: &DeviceFilter,
        events: UnboundedSender<TransportEvent>,
    ) -> anyhow::Result<()> {
        let _ = events.send(TransportEvent::DeviceFound(ScannedDevice {
            id: BRICK_ID.to_string(),
            name: "EV3".to_string(),
            rssi: -48,
        }));
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    fn connect_peripheral(&self, id: &str) -> anyhow::Result<()> {
        if id != BRICK_ID {
            anyhow::bail!("unknown peripheral {}", id);
        }
        self.connected.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(TransportEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_message(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        self.answer(bytes);
        Ok(())
    }
}

/// Let spawned tasks drain their queues without moving the clock
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Move the paused clock forward and let everything react
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}

/// Scan and connect; nothing has been polled yet
pub async fn connect(model: BrickModel, settings: Settings) -> (BrickService, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new(model));
    let brick = BrickService::new(transport.clone(), settings);
    let mut found = brick.scan().unwrap();
    let device = found.recv().await.unwrap();
    brick.connect_to(&device.id).unwrap();
    settle().await;
    (brick, transport)
}

/// Connected, with one device list and one value reply applied
pub async fn discovered(model: BrickModel) -> (BrickService, Arc<MockTransport>) {
    discovered_with(model, Settings::default()).await
}

pub async fn discovered_with(
    model: BrickModel,
    settings: Settings,
) -> (BrickService, Arc<MockTransport>) {
    let (brick, transport) = connect(model, settings).await;
    // Ticks at 150 ms (device list) and 300 ms (values)
    advance(310).await;
    (brick, transport)
}
