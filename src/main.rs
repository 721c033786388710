use std::sync::Arc;

use clap::{Parser, Subcommand};
use stackplan::api::{self, CliError, InMemoryGoalStore, LtvArgs, PlanArgs, SolveArgs};
use stackplan::logging::init_logging;

#[derive(Parser, Debug)]
#[command(
    name = "stackplan",
    about = "Bitcoin accumulation, retirement drawdown and loan-risk planner"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log level for stackplan events; RUST_LOG takes precedence"
    )]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the JSON HTTP API.
    Serve {
        #[arg(long, env = "STACKPLAN_PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run accumulation and retirement for one plan and print the result.
    Plan {
        #[command(flatten)]
        args: PlanArgs,
        #[arg(long, help = "Print a text summary instead of JSON")]
        summary: bool,
    },
    /// Report LTV risk, price shocks and margin calls for a BTC-backed loan.
    Ltv(LtvArgs),
    /// Bisect for a required contribution or a maximum sustainable income.
    Solve(SolveArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let outcome: Result<(), CliError> = match cli.command {
        Command::Serve { port } => api::run_http_server(port, Arc::new(InMemoryGoalStore::new()))
            .await
            .map_err(CliError::from),
        Command::Plan { args, summary } => api::run_plan_command(args, summary),
        Command::Ltv(args) => api::run_ltv_command(args),
        Command::Solve(args) => api::run_solve_command(args),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
