use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use nadlan::api::{App, Command, optimize_command, run_http_server, simulate_command};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let app = App::parse();
    let outcome = match app.command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
            return;
        }
        Command::Simulate(cli) => simulate_command(cli),
        Command::Optimize(args) => tokio::task::spawn_blocking(move || optimize_command(args))
            .await
            .unwrap_or_else(|e| Err(format!("optimizer task failed: {e}"))),
    };

    match outcome {
        Ok(json) => println!("{json}"),
        Err(msg) => {
            eprintln!("Error: {msg}");
            std::process::exit(1);
        }
    }
}
