mod completion;
mod dispatch;
mod download;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jvmstack_core::Component;
use jvmstack_installer::LifecycleError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::completion::CliCompletionShell;
use crate::dispatch::run_cli;
use crate::render::{
    current_output_style, format_error_message, render_status_line, TerminalRenderer,
};

#[derive(Parser, Debug)]
#[command(name = "jvmstack")]
#[command(
    about = "Install, upgrade and roll back a JDK and Apache Tomcat on this host",
    long_about = None
)]
struct Cli {
    /// Host config file (default: $JVMSTACK_CONFIG, then /etc/jvmstack/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug detail to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the desired JDK and Tomcat where absent
    Install,
    /// Move both components to the desired state
    Upgrade {
        /// Show the planned transitions without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Restore the retained backup
    Rollback {
        #[arg(long, value_parser = parse_component)]
        component: Option<Component>,
    },
    /// Remove installed components along with their backups
    Uninstall {
        #[arg(long, value_parser = parse_component)]
        component: Option<Component>,
    },
    /// Show installed, backup and desired versions
    Status,
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Option<CliCompletionShell>,
    },
}

fn parse_component(raw: &str) -> Result<Component, String> {
    Component::parse(raw)
        .ok_or_else(|| format!("unknown component '{raw}' (expected java or app-server)"))
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "jvmstack=debug"
    } else {
        "jvmstack=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let renderer = TerminalRenderer::from_style(current_output_style());

    match run_cli(cli, renderer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = format_error_message(&err);
            if err
                .downcast_ref::<LifecycleError>()
                .is_some_and(LifecycleError::is_no_op)
            {
                renderer.print_status("ok", &message);
                return ExitCode::SUCCESS;
            }
            eprintln!("{}", render_status_line(renderer.style(), "err", &message));
            ExitCode::FAILURE
        }
    }
}
