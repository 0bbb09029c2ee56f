use std::path::PathBuf;

use clap::Parser;
use lumen_core::{
    ConfigManager, DmxTransport, DriverRegistry, EngineEvent, HardwareRequest, LightingEngine,
    TransportMessage,
};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Lighting console core driving DMX universes from channels, groups and cues.
#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(about = "Lumen lighting console")]
struct Args {
    /// Configuration file (written with defaults if missing)
    #[arg(short, long, default_value = "lumen.json")]
    config: PathBuf,

    /// Output driver connected to every universe
    #[arg(short, long, default_value = "log")]
    driver: String,

    /// Print the available output drivers and exit
    #[arg(long)]
    list_drivers: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let args = Args::parse();

    let drivers = DriverRegistry::default();
    if args.list_drivers {
        for name in drivers.available_drivers() {
            println!("{}", name);
        }
        return Ok(());
    }
    if !drivers.available_drivers().contains(&args.driver) {
        anyhow::bail!(
            "unknown driver '{}' (available: {})",
            args.driver,
            drivers.available_drivers().join(", ")
        );
    }

    let mut config = ConfigManager::new(Some(args.config));
    let settings = config.load()?;
    log::info!("Configuration loaded from {}", config.config_path().display());

    let mut engine = LightingEngine::new(settings.clone())?;
    let mut events = engine.subscribe();
    let (transport, handle) = DmxTransport::new(settings.tick_rate_hz).spawn();

    for universe in 0..settings.universe_count as u16 {
        engine.hardware_connect(universe, args.driver.clone())?;
    }

    let tick = settings.tick_interval();
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(cue) = engine.tick(tick) {
                    log::info!("Cue {} of sequence {} reached", cue.scene, cue.sequence);
                }
                for (universe, frame) in engine.take_frames() {
                    send(&transport, TransportMessage::Frame(universe, frame))?;
                }
            }

            Some(event) = events.recv() => {
                if let EngineEvent::Hardware(request) = event {
                    if let Err(e) = forward_hardware(request, &drivers, &transport) {
                        log::error!("Hardware request failed: {}", e);
                    }
                }
            }

            result = &mut shutdown => {
                result?;
                log::info!("Received shutdown signal");
                break;
            }
        }
    }

    send(&transport, TransportMessage::Shutdown)?;
    let refreshes = handle.await??;
    log::info!("Lumen stopped after {} DMX refreshes", refreshes);
    Ok(())
}

fn forward_hardware(
    request: HardwareRequest,
    drivers: &DriverRegistry,
    transport: &mpsc::UnboundedSender<TransportMessage>,
) -> Result<(), anyhow::Error> {
    let message = match request {
        HardwareRequest::Connect { universe, driver } => {
            TransportMessage::Connect(universe, drivers.open(&driver)?)
        }
        HardwareRequest::Disconnect { universe } => TransportMessage::Disconnect(universe),
    };
    send(transport, message)
}

fn send(
    transport: &mpsc::UnboundedSender<TransportMessage>,
    message: TransportMessage,
) -> Result<(), anyhow::Error> {
    transport
        .send(message)
        .map_err(|_| anyhow::anyhow!("DMX transport has stopped"))
}
