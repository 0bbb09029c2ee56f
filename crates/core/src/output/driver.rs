use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Turns a universe frame into bytes on a wire. Protocol details live in the
/// implementations.
#[async_trait]
pub trait DmxDriver: Send {
    fn name(&self) -> &str;

    async fn send_universe(&mut self, universe: u16, data: &[u8]) -> anyhow::Result<()>;
}

type DriverFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn DmxDriver>> + Send + Sync>;

/// Drivers available to hardware connect requests, by name.
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(LogDriver::NAME, || Ok(Box::new(LogDriver::new())));
        registry
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> anyhow::Result<Box<dyn DmxDriver>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn available_drivers(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn open(&self, name: &str) -> anyhow::Result<Box<dyn DmxDriver>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no DMX driver named '{}'", name))?;
        factory()
    }
}

/// Logs a summary of each frame that changed.
pub struct LogDriver {
    last: HashMap<u16, Vec<u8>>,
}

impl LogDriver {
    pub const NAME: &'static str = "log";

    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl Default for LogDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DmxDriver for LogDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn send_universe(&mut self, universe: u16, data: &[u8]) -> anyhow::Result<()> {
        if self.last.get(&universe).map(Vec::as_slice) == Some(data) {
            return Ok(());
        }
        let lit = data.iter().filter(|level| **level > 0).count();
        log::debug!("Universe {}: {} of {} outputs lit", universe, lit, data.len());
        self.last.insert(universe, data.to_vec());
        Ok(())
    }
}

/// Keeps the last frame per universe in shared memory.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    frames: Arc<Mutex<HashMap<u16, Vec<u8>>>>,
}

impl MemoryDriver {
    pub const NAME: &'static str = "memory";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self, universe: u16) -> Option<Vec<u8>> {
        self.frames.lock().get(&universe).cloned()
    }
}

#[async_trait]
impl DmxDriver for MemoryDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn send_universe(&mut self, universe: u16, data: &[u8]) -> anyhow::Result<()> {
        self.frames.lock().insert(universe, data.to_vec());
        Ok(())
    }
}
