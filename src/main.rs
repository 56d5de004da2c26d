use anyhow::Result;
use clap::Parser;
use devctl::cli::{Cli, Commands, DebugCommands};
use devctl::commands;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    // In machine mode everything human-readable goes to stderr without ANSI
    // so stdout stays a clean JSON event stream. Otherwise colors only when
    // stdout is a TTY (not when piped to a file).
    if cli.machine_output() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
            )
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    } else {
        let use_color = atty::is(atty::Stream::Stdout);
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
            )
            .with_target(false)
            .with_ansi(use_color)
            .init();
    }

    let context = cli.context.clone();
    let machine = cli.machine_output();

    // Dispatch to appropriate command handler
    let result = match cli.cmd {
        Commands::Push(args) => commands::cmd_push(args, &context, machine).await,
        Commands::Log(args) => commands::cmd_log(args, &context).await,
        Commands::Exec(args) => commands::cmd_exec(args, &context).await,
        Commands::Test(args) => commands::cmd_test(args, &context).await,
        Commands::Delete(args) => commands::cmd_delete(args, &context).await,
        Commands::Undeploy => commands::cmd_undeploy(&context).await,
        Commands::Debug(args) => match args.cmd {
            DebugCommands::PortForward(pf) => {
                commands::cmd_debug_port_forward(pf, &context).await
            }
        },
    };

    // Handle errors
    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}
