use clap::Parser;
use ledger_sync::args::{Args, Command, UpDown};
use ledger_sync::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().ledger_home().path();

    // This allows for testing the program without hitting remote services. When
    // LEDGER_SYNC_IN_TEST_MODE is set and non-zero in length, then the mode will be Mode::Test,
    // otherwise it will be Mode::Live.
    let mode = Mode::from_env();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args).await?.print(),

        Command::Status => commands::status(Config::load(home).await?, mode)
            .await?
            .print(),

        Command::Add(add_args) => {
            commands::add(Config::load(home).await?, mode, add_args.clone())
                .await?
                .print()
        }

        Command::Update(update_args) => {
            commands::update(Config::load(home).await?, mode, update_args.clone())
                .await?
                .print()
        }

        Command::Delete(delete_args) => {
            commands::delete(Config::load(home).await?, mode, delete_args.clone())
                .await?
                .print()
        }

        Command::Pay(pay_args) => {
            commands::pay(Config::load(home).await?, mode, pay_args.clone())
                .await?
                .print()
        }

        Command::Unpay(unpay_args) => {
            commands::unpay(Config::load(home).await?, mode, unpay_args.clone())
                .await?
                .print()
        }

        Command::List(list_args) => {
            commands::list(Config::load(home).await?, mode, list_args.clone())
                .await?
                .print()
        }

        Command::Summary(summary_args) => {
            commands::summary(Config::load(home).await?, mode, summary_args.clone())
                .await?
                .print()
        }

        Command::Sync(sync_args) => {
            let config = Config::load(home).await?;
            match sync_args.direction() {
                UpDown::Up => commands::sync_up(config, mode).await?.print(),
                UpDown::Down => commands::sync_down(config, mode).await?.print(),
            }
        }

        Command::Watch(watch_args) => {
            commands::watch(Config::load(home).await?, mode, watch_args.clone())
                .await?
                .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={level},ledger_sync={level}",
                env!("CARGO_CRATE_NAME"),
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
