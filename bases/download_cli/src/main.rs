// bases/download_cli/src/main.rs
mod app;
mod args;
mod config;
mod notify;
mod output;

use app::App;
use args::CliArgs;
use clap::Parser;
use color_eyre::Result;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let default_filter = if args.verbose {
        "download_cli=debug,media_downloader=debug,audio_tags=debug"
    } else {
        "download_cli=info,media_downloader=info,audio_tags=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = Config::from_args(args)?;
    let app = App::new(config);

    match app.run().await {
        Ok(summary) if summary.failed_total() == 0 => Ok(()),
        Ok(_) => std::process::exit(1),
        Err(error) => {
            app.print_error(&error);
            std::process::exit(1);
        }
    }
}
