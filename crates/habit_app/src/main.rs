use clap::Parser;
use habit_app::app::{run, AppConfig, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("habitflow: {err:#}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(cli, config) {
        eprintln!("habitflow failed: {err:#}");
        std::process::exit(1);
    }
}
