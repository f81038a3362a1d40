use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use jvmstack_core::{DesiredStateSource, HostConfig};
use jvmstack_installer::{
    ArchiveFetcher, Capabilities, Chown, ComponentScope, HostLayout, Systemctl,
    UpgradeOrchestrator,
};

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::download::{desired_state_source, HttpDownloader};
use crate::render::{
    format_report_lines, format_rollback_lines, format_status_lines, format_uninstall_lines,
    TerminalRenderer,
};
use crate::{Cli, Commands};

/// Everything a lifecycle command needs, owned in one place so the
/// orchestrator can borrow it.
struct HostContext {
    layout: HostLayout,
    source: Box<dyn DesiredStateSource>,
    fetcher: ArchiveFetcher<HttpDownloader>,
    services: Systemctl,
    ownership: Chown,
}

impl HostContext {
    fn load(config_path: Option<&Path>, renderer: TerminalRenderer) -> Result<Self> {
        let config = HostConfig::resolve(config_path)?;
        let timeout = Duration::from_secs(config.download_timeout_secs);
        tracing::debug!(
            desired_state = %config.desired_state,
            java_root = %config.java_root.display(),
            tomcat_root = %config.tomcat_root.display(),
            "host config resolved"
        );
        let source = desired_state_source(&config.desired_state, timeout)?;
        let fetcher = ArchiveFetcher::new(HttpDownloader::new(timeout, renderer)?);
        Ok(Self {
            layout: HostLayout::new(config),
            source,
            fetcher,
            services: Systemctl,
            ownership: Chown,
        })
    }

    fn orchestrator(&self) -> UpgradeOrchestrator<'_> {
        let caps = Capabilities {
            fetcher: &self.fetcher,
            services: &self.services,
            ownership: &self.ownership,
        };
        UpgradeOrchestrator::new(&self.layout, caps, self.source.as_ref())
    }
}

pub(crate) fn run_cli(cli: Cli, renderer: TerminalRenderer) -> Result<()> {
    match cli.command {
        Commands::Install => {
            let host = HostContext::load(cli.config.as_deref(), renderer)?;
            renderer.print_section("install");
            let report = host.orchestrator().install()?;
            renderer.print_lines(&format_report_lines(&report));
        }
        Commands::Upgrade { dry_run } => {
            let host = HostContext::load(cli.config.as_deref(), renderer)?;
            renderer.print_section("upgrade");
            if dry_run {
                let report = host.orchestrator().plan()?;
                renderer.print_lines(&format_report_lines(&report));
                renderer.print_status("step", "dry run: no changes made");
            } else {
                let report = host.orchestrator().run()?;
                renderer.print_lines(&format_report_lines(&report));
            }
        }
        Commands::Rollback { component } => {
            let host = HostContext::load(cli.config.as_deref(), renderer)?;
            renderer.print_section("rollback");
            let restored = host
                .orchestrator()
                .rollback(ComponentScope::from_component(component))?;
            renderer.print_lines(&format_rollback_lines(&restored));
        }
        Commands::Uninstall { component } => {
            let host = HostContext::load(cli.config.as_deref(), renderer)?;
            renderer.print_section("uninstall");
            let results = host
                .orchestrator()
                .uninstall(ComponentScope::from_component(component))?;
            renderer.print_lines(&format_uninstall_lines(&results));
        }
        Commands::Status => {
            let host = HostContext::load(cli.config.as_deref(), renderer)?;
            let statuses = host.orchestrator().status()?;
            renderer.print_lines(&format_status_lines(&statuses));
        }
        Commands::Completions { shell } => {
            let shell_env = std::env::var("SHELL").ok();
            let shell = resolve_completion_shell(shell, shell_env.as_deref());
            let mut stdout = std::io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}
