#[tokio::main]
async fn main() {
    deskpilot_lib::init_tracing();
    if let Err(e) = deskpilot_lib::run().await {
        tracing::error!(error = %e, "deskpilot exited with an error");
        std::process::exit(1);
    }
}
