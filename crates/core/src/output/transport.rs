use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::driver::DmxDriver;

/// Messages accepted by a running transport.
pub enum TransportMessage {
    /// Latest frame of a universe.
    Frame(u16, Vec<u8>),
    Connect(u16, Box<dyn DmxDriver>),
    Disconnect(u16),
    Shutdown,
}

/// Pushes the last frame of every connected universe to its driver at a fixed
/// refresh rate.
pub struct DmxTransport {
    refresh_rate: f64,
    drivers: HashMap<u16, Box<dyn DmxDriver>>,
    frames: HashMap<u16, Vec<u8>>,
    frames_sent: u64,
}

impl DmxTransport {
    pub fn new(refresh_rate: f64) -> Self {
        Self {
            refresh_rate,
            drivers: HashMap::new(),
            frames: HashMap::new(),
            frames_sent: 0,
        }
    }

    /// Run on its own task. The handle resolves to the number of refreshes
    /// sent once the transport is shut down.
    pub fn spawn(self) -> (mpsc::UnboundedSender<TransportMessage>, JoinHandle<anyhow::Result<u64>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<TransportMessage>) -> anyhow::Result<u64> {
        if !(self.refresh_rate > 0.0) {
            anyhow::bail!("invalid DMX refresh rate {}", self.refresh_rate);
        }
        let mut refresh = interval(Duration::from_secs_f64(1.0 / self.refresh_rate));
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("DMX transport running at {}Hz", self.refresh_rate);

        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(TransportMessage::Frame(universe, data)) => {
                            self.frames.insert(universe, data);
                        }
                        Some(TransportMessage::Connect(universe, driver)) => {
                            log::info!("Universe {} connected to {} driver", universe, driver.name());
                            self.drivers.insert(universe, driver);
                        }
                        Some(TransportMessage::Disconnect(universe)) => {
                            if self.drivers.remove(&universe).is_some() {
                                log::info!("Universe {} disconnected", universe);
                            }
                        }
                        Some(TransportMessage::Shutdown) | None => break,
                    }
                }

                _ = refresh.tick() => {
                    self.refresh().await;
                }
            }
        }

        // Flush whatever arrived last.
        self.refresh().await;
        log::info!("DMX transport shutting down after {} refreshes", self.frames_sent);
        Ok(self.frames_sent)
    }

    async fn refresh(&mut self) {
        for (universe, driver) in self.drivers.iter_mut() {
            let Some(data) = self.frames.get(universe) else {
                continue;
            };
            if let Err(err) = driver.send_universe(*universe, data).await {
                log::error!("{} driver failed on universe {}: {}", driver.name(), universe, err);
            }
        }
        self.frames_sent += 1;
    }
}
