use anyhow::Context;

use membridge::cli::cli_main;

fn main() -> anyhow::Result<()> {
    cli_main().context("membridge failed")?;
    logger::debug!("membridge done");
    Ok(())
}
