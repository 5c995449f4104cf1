#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = accountable::run_worker().await {
        eprintln!("accountable-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
