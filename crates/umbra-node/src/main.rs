//! umbra-node: replays pool scenarios and persists the resulting state.
//!
//! ```text
//! umbra-node <scenario.json>   replay against a fresh pool, store the result
//! umbra-node                   report the stored pool
//! ```

mod config;
mod events;
mod scenario;

use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;
use crate::events::{EventBus, EventFilter};
use crate::scenario::Scenario;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = NodeConfig::load()?;

    // 2. Initialize tracing; RUST_LOG wins over the config level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!("umbra={}", config.logging.log_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Umbra node starting");

    // 3. Open database
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let mut conn = umbra_db::open(&config.db_path())?;

    // 4. Create event bus and its logger
    let bus = EventBus::new(config.logging.event_buffer);
    let logger = tokio::spawn(events::log_events(
        bus.subscribe(),
        EventFilter::new(config.logging.event_categories.clone()),
    ));

    match std::env::args().nth(1) {
        Some(path) => {
            let scenario = Scenario::load(Path::new(&path))?;
            let mut pool = scenario.build_pool(config.pool.clone(), bus.clone())?;
            let report = scenario.replay(&mut pool)?;
            umbra_db::save_state(&mut conn, pool.state())?;
            info!(db = ?config.db_path(), "pool state saved");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => match umbra_db::load_state(&conn)? {
            Some(state) => {
                let accumulator = state.accumulator();
                info!(
                    epoch = accumulator.current_epoch(),
                    total_liquidity = state.total_liquidity(),
                    locked_coverage = state.locked_coverage(),
                    positions = state.positions().count(),
                    policies = state.policies().count(),
                    "stored pool"
                );
                println!("{}", serde_json::to_string_pretty(&state.snapshot())?);
            }
            None => info!("no stored pool; pass a scenario file to create one"),
        },
    }

    // Closing the bus ends the logger once it drains.
    let emitted = bus.sequence();
    drop(bus);
    let logged = logger.await?;
    info!(emitted, logged, "Umbra node stopped");
    Ok(())
}
