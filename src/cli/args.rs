use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "devctl",
    version,
    about = "Devfile component lifecycle manager for Kubernetes clusters"
)]
pub struct Cli {
    /// Component working directory
    #[arg(long, global = true, default_value = ".")]
    pub context: PathBuf,

    /// Output format; json switches to machine-readable events
    #[arg(long = "o", global = true, value_enum)]
    pub output: Option<OutputFormat>,

    #[command(subcommand)]
    pub cmd: Commands,
}

impl Cli {
    pub fn machine_output(&self) -> bool {
        matches!(self.output, Some(OutputFormat::Json))
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push local source and devfile commands to the component workload
    Push(PushArgs),
    /// Fetch logs of the component's run or debug command
    Log(LogArgs),
    /// Execute a command inside the component's primary container
    Exec(ExecArgs),
    /// Run a test command defined in the devfile
    Test(TestArgs),
    /// Delete the component workload from the cluster
    Delete(DeleteArgs),
    /// Remove everything this component deployed, without waiting
    Undeploy,
    /// Debug tooling
    Debug(DebugArgs),
}

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Devfile build command to use instead of the default one
    #[arg(long)]
    pub build_command: Option<String>,

    /// Devfile run command to use instead of the default one
    #[arg(long)]
    pub run_command: Option<String>,

    /// Devfile debug command to use instead of the default one
    #[arg(long)]
    pub debug_command: Option<String>,

    /// Push with the debug command set instead of the run one
    #[arg(long)]
    pub debug: bool,

    /// Push all files regardless of what changed
    #[arg(long, short)]
    pub force_build: bool,

    /// Relay remote command output
    #[arg(long)]
    pub show_log: bool,

    /// File patterns to exclude from the push (repeat or comma-separated)
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    pub ignore: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Follow the logs until interrupted
    #[arg(long, short)]
    pub follow: bool,

    /// Show logs of the debug command instead of the run command
    #[arg(long)]
    pub debug: bool,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Command to run inside the container
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Devfile test command to use instead of the default one
    #[arg(long)]
    pub test_command: Option<String>,

    /// Relay remote command output
    #[arg(long)]
    pub show_log: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Block until deletion is complete
    #[arg(long, short)]
    pub wait: bool,

    /// Relay deletion progress
    #[arg(long)]
    pub show_log: bool,
}

#[derive(Args, Debug)]
pub struct DebugArgs {
    #[command(subcommand)]
    pub cmd: DebugCommands,
}

#[derive(Subcommand, Debug)]
pub enum DebugCommands {
    /// Forward a local port to the port the component's debugger listens on
    PortForward(PortForwardArgs),
}

#[derive(Args, Debug)]
pub struct PortForwardArgs {
    /// Local port to listen on (defaults to the remote debug port)
    #[arg(long, short = 'l')]
    pub local_port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_args_parse() {
        let cli = Cli::parse_from([
            "devctl",
            "push",
            "--debug",
            "--ignore",
            "*.log,node_modules",
            "--context",
            "/tmp/app",
        ]);
        assert_eq!(cli.context, PathBuf::from("/tmp/app"));
        let Commands::Push(args) = cli.cmd else {
            panic!("expected push");
        };
        assert!(args.debug);
        assert_eq!(args.ignore, vec!["*.log", "node_modules"]);
    }

    #[test]
    fn test_exec_trailing_args() {
        let cli = Cli::parse_from(["devctl", "exec", "ls", "-la", "/projects"]);
        let Commands::Exec(args) = cli.cmd else {
            panic!("expected exec");
        };
        assert_eq!(args.command, vec!["ls", "-la", "/projects"]);
    }

    #[test]
    fn test_machine_output_flag() {
        let cli = Cli::parse_from(["devctl", "--o", "json", "undeploy"]);
        assert!(cli.machine_output());
    }

    #[test]
    fn test_port_forward_local_port() {
        let cli = Cli::parse_from(["devctl", "debug", "port-forward", "-l", "9000"]);
        let Commands::Debug(args) = cli.cmd else {
            panic!("expected debug");
        };
        let DebugCommands::PortForward(pf) = args.cmd;
        assert_eq!(pf.local_port, Some(9000));
    }
}
