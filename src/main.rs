//! typebench CLI entry point.

use clap::Parser;

use typebench::cli::{commands, handle_error, Cli, Commands};
use typebench::infrastructure::config::ConfigLoader;
use typebench::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => return handle_error(&err, cli.json),
    };

    // Dropped when `run` returns, flushing buffered file output before exit.
    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => return handle_error(&err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Show(args) => commands::show::execute(args, &config, cli.json).await,
        Commands::Variance(args) => commands::variance::execute(args, &config, cli.json).await,
        Commands::Checkers(args) => commands::checkers::execute(args, &config, cli.json).await,
    };

    result.unwrap_or_else(|err| handle_error(&err, cli.json))
}
