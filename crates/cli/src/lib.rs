pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::recommend::RecommendTarget;

#[derive(Debug, Parser)]
#[command(
    name = "curator",
    about = "Curator operator CLI",
    long_about = "Apply migrations, load the demo storefront, and query recommendation lists against the configured database.",
    after_help = "Examples:\n  curator migrate\n  curator seed\n  curator recommend popular\n  curator recommend similar p-chino\n  curator recommend personalized u-bob"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo storefront catalog, orders, and reviews, then verify them")]
    Seed,
    #[command(about = "Compute one recommendation list and print it as JSON")]
    Recommend {
        #[command(subcommand)]
        target: RecommendTarget,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Recommend { target } => commands::recommend::run(target),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
