use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Android dating-app automation agent driven over ADB.
#[derive(Parser)]
#[command(name = "hinge-autobot", version, about)]
struct Cli {
    /// Configuration file. Defaults to config.toml next to the executable or in
    /// the working directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the automation loop until interrupted (default).
    Run,
    /// Write a default config.toml and .env-template.
    Init {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Validate the configuration and probe the device.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => hinge_autobot_lib::run(config).await.map(|_| ()),
        Command::Init { dir } => hinge_autobot_lib::init_files(&dir).map(|written| {
            for path in written {
                println!("wrote {}", path.display());
            }
        }),
        Command::Check => hinge_autobot_lib::check(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
