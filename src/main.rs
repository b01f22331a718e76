#[tokio::main]
async fn main() {
    if let Err(e) = gravity_bridge_lib::run().await {
        eprintln!("gravity-bridge: {e}");
        std::process::exit(1);
    }
}
