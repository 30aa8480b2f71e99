//! Sweep command - one pass of the reaper

use crate::infrastructure::key::Reaper;

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    super::init_logging(&config)?;

    let store = crate::create_key_store(&config).await?;
    let removed = Reaper::new(store).run_once().await?;

    println!("Removed {} expired key(s)", removed);
    Ok(())
}
