use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("netpulse version {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
