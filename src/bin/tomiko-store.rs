use clap::Parser;

#[tokio::main]
async fn main() {
    use tomiko_store::util::cli::*;

    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let opts = Options::parse();
    match run_cli_action(opts) {
        Ok(()) => println!("OK!"),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
