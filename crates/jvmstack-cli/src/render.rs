use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use jvmstack_core::Version;
use jvmstack_installer::{
    ComponentStatus, InstalledComponent, LifecycleError, OperationReport, Transition,
    UninstallResult, UninstallStatus,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Plain {
            return;
        }
        println!("{}", colorize(section_style(), &format!("== {title} ==")));
    }

    pub(crate) fn print_lines(self, lines: &[(&'static str, String)]) {
        for (status, message) in lines {
            self.print_status(status, message);
        }
    }

    /// Byte progress for one download; `None` in plain mode.
    pub(crate) fn start_download_progress(
        self,
        label: &str,
        total: Option<u64>,
    ) -> Option<ProgressBar> {
        if self.style == OutputStyle::Plain {
            return None;
        }
        let progress_bar = match total {
            Some(total) => {
                let progress_bar = ProgressBar::new(total.max(1));
                if let Ok(style) = ProgressStyle::with_template(
                    "{spinner:.cyan.bold} {msg:<24} [{bar:20.cyan/blue}] {bytes:>10}/{total_bytes:10} {elapsed_precise}",
                ) {
                    progress_bar.set_style(style.progress_chars("=>-"));
                }
                progress_bar
            }
            None => ProgressBar::new_spinner(),
        };
        progress_bar.set_message(label.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        Some(progress_bar)
    }
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool, _stderr_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

/// `NO_COLOR` forces plain output; otherwise rich output when stdout is a
/// terminal.
pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty()) {
        return OutputStyle::Plain;
    }
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::io::stderr().is_terminal(),
    )
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

pub(crate) fn format_report_lines(report: &OperationReport) -> Vec<(&'static str, String)> {
    vec![
        transition_line("java", &report.java),
        transition_line("app-server", &report.tomcat),
    ]
}

fn transition_line(label: &str, transition: &Transition) -> (&'static str, String) {
    let status = match transition {
        Transition::Unchanged(_) => "step",
        _ => "ok",
    };
    (status, format!("{label}: {transition}"))
}

pub(crate) fn format_rollback_lines(
    restored: &[InstalledComponent],
) -> Vec<(&'static str, String)> {
    restored
        .iter()
        .map(|installed| {
            (
                "ok",
                format!(
                    "{}: rolled back to {} ({})",
                    installed.component,
                    installed.version,
                    installed.install_path.display()
                ),
            )
        })
        .collect()
}

pub(crate) fn format_uninstall_lines(results: &[UninstallResult]) -> Vec<(&'static str, String)> {
    results
        .iter()
        .map(|result| match (&result.status, &result.version) {
            (UninstallStatus::Uninstalled, Some(version)) => {
                ("ok", format!("{}: uninstalled {version}", result.component))
            }
            (UninstallStatus::Uninstalled, None) => {
                ("ok", format!("{}: removed leftovers", result.component))
            }
            (UninstallStatus::NotInstalled, _) => {
                ("step", format!("{}: not installed", result.component))
            }
        })
        .collect()
}

pub(crate) fn format_status_lines(statuses: &[ComponentStatus]) -> Vec<(&'static str, String)> {
    statuses
        .iter()
        .map(|status| {
            let in_sync = match (&status.installed, &status.desired) {
                (Some(installed), Some(desired)) => installed == desired,
                (_, None) => true,
                (None, Some(_)) => false,
            };
            let badge = if in_sync { "ok" } else { "warn" };
            (
                badge,
                format!(
                    "{}: installed={} backup={} desired={} last-known-good={}",
                    status.component,
                    or_none(status.installed.as_ref()),
                    or_none(status.backup.as_ref()),
                    or_none(status.desired.as_ref()),
                    or_none(status.last_known_good.as_ref()),
                ),
            )
        })
        .collect()
}

fn or_none(version: Option<&Version>) -> String {
    version
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}

/// Lifecycle errors already embed their cause chain in the message; other
/// errors are printed with their anyhow context chain.
pub(crate) fn format_error_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<LifecycleError>() {
        Some(lifecycle) => lifecycle.to_string(),
        None => format!("{err:#}"),
    }
}

pub(crate) fn format_download_size(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
