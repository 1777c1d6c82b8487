use anyhow::Result;
use beamdyn_rs::Config;

fn main() -> Result<()> {
    let cfg = Config::new()?;
    beamdyn_rs::run(cfg)
}
