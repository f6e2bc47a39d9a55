use clap::Parser;
use kev_epss::cli::{self, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli::load_config(cli.config.as_deref()).await {
        Ok(config) => match cli.command {
            Commands::Enrich(args) => cli::enrich::handle_enrich(args, config, cli.quiet).await,
            Commands::Analyze(args) => cli::analyze::handle_analyze(args, config, cli.quiet).await,
            Commands::FetchSnapshots(args) => cli::fetch::handle_fetch_snapshots(args, config, cli.quiet).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
