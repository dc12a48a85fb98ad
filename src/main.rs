use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::error;

mod config;
mod error;
mod fetch;
mod logger;
mod mail_command;
mod overlap;
mod render;
mod report_command;
mod report_config;
mod tally;
mod time_entry;
mod toggl;

use config::Config;
use mail_command::{MailArgs, MailCommand, SmtpRelay};
use report_command::{ReportArgs, ReportCommand};
use toggl::TogglClient;

/// Togglの詳細レポートからタイムシートを作成し、メールで送るためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- -v report 2016-03-01 2016-03-15
/// $ cargo run -- report 2016-03-01 2016-03-15 --pdf
/// $ cargo run -- mail --file report.txt
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        short = 'c',
        long = "config",
        global = true,
        parse(from_os_str),
        help = "Path to config.yaml"
    )]
    config: Option<PathBuf>,

    #[clap(
        short = 'v',
        long = "verbose",
        global = true,
        help = "Increase output verbosity"
    )]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Generates a report for the given date range.
    Report(ReportArgs),
    /// Sends a generated report by mail.
    Mail(MailArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = logger::init(args.verbose) {
        eprintln!("{:?}", err);
        return ExitCode::from(error::EXIT_FAILURE);
    }

    match run(args).await {
        Ok(()) => ExitCode::from(error::EXIT_OK),
        Err(err) => {
            error!("{:?}", err);
            ExitCode::from(error::exit_code(&err))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;

    match args.subcommand {
        SubCommands::Report(report) => {
            let report_config = report.resolve(&config, args.verbose)?;
            let client = TogglClient::new(&config).context("Failed to create toggl client")?;
            ReportCommand::new(&client).run(&report_config).await?;
        }
        SubCommands::Mail(mail) => {
            let settings = config
                .mail
                .as_ref()
                .context("The config file has no mail section")?;
            let relay = SmtpRelay::new(settings, Duration::from_secs(config.timeout_secs))?;
            MailCommand::new(&relay, settings).run(mail).await?;
        }
    }

    Ok(())
}
