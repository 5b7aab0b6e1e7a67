#[tokio::main]
async fn main() {
    if let Err(err) = integrity_monitor_lib::run().await {
        log::error!("integrity monitor failed: {err:#}");
        eprintln!("integrity-monitor: {err:#}");
        std::process::exit(1);
    }
}
