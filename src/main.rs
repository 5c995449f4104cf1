#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = accountable::run().await {
        eprintln!("accountable fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
