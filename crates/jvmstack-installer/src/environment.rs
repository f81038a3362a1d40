use anyhow::{Context, Result};
use std::fs;
use std::io;

use crate::{DeclarationStyle, EnvironmentTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingOutcome {
    Written,
    SkippedMissingOptional,
}

/// Remove-then-set rewriting of variable declarations in environment files.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentVariableManager;

impl EnvironmentVariableManager {
    /// Leaves exactly one declaration of `name` in the target. A missing
    /// optional file is skipped; a missing required file is created.
    pub fn set_binding(
        &self,
        target: &EnvironmentTarget,
        name: &str,
        value: &str,
    ) -> Result<BindingOutcome> {
        let Some(existing) = read_target(target)? else {
            return Ok(BindingOutcome::SkippedMissingOptional);
        };

        let mut lines = strip_declarations(&existing, name);
        lines.push(render_declaration(target.style, name, value));
        write_lines(target, &lines)?;
        tracing::debug!(file = %target.path.display(), name, value, "environment binding set");
        Ok(BindingOutcome::Written)
    }

    /// Removes every declaration of `name`; returns whether the file changed.
    pub fn remove_binding(&self, target: &EnvironmentTarget, name: &str) -> Result<bool> {
        let existing = match fs::read_to_string(&target.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", target.path.display()));
            }
        };

        let lines = strip_declarations(&existing, name);
        if lines.len() == existing.lines().count() {
            return Ok(false);
        }
        write_lines(target, &lines)?;
        Ok(true)
    }

    /// Applies `set_binding` to every target; the first failure aborts.
    pub fn set_everywhere(
        &self,
        targets: &[EnvironmentTarget],
        name: &str,
        value: &str,
    ) -> Result<()> {
        for target in targets {
            if self.set_binding(target, name, value)? == BindingOutcome::SkippedMissingOptional {
                tracing::debug!(file = %target.path.display(), "optional shell file missing; skipped");
            }
        }
        Ok(())
    }

    pub fn remove_everywhere(&self, targets: &[EnvironmentTarget], name: &str) -> Result<()> {
        for target in targets {
            self.remove_binding(target, name)?;
        }
        Ok(())
    }
}

fn read_target(target: &EnvironmentTarget) -> Result<Option<String>> {
    match fs::read_to_string(&target.path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if target.required {
                Ok(Some(String::new()))
            } else {
                Ok(None)
            }
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", target.path.display())),
    }
}

fn write_lines(target: &EnvironmentTarget, lines: &[String]) -> Result<()> {
    if let Some(parent) = target.path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut payload = lines.join("\n");
    if !payload.is_empty() {
        payload.push('\n');
    }
    fs::write(&target.path, payload)
        .with_context(|| format!("failed to write {}", target.path.display()))
}

fn strip_declarations(raw: &str, name: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !declares(line, name))
        .map(str::to_string)
        .collect()
}

pub(crate) fn declares(line: &str, name: &str) -> bool {
    let trimmed = line.trim_start();
    let trimmed = trimmed
        .strip_prefix("export")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim_start)
        .unwrap_or(trimmed);
    trimmed
        .strip_prefix(name)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

fn render_declaration(style: DeclarationStyle, name: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    match style {
        DeclarationStyle::Plain => format!("{name}=\"{escaped}\""),
        DeclarationStyle::Export => format!("export {name}=\"{escaped}\""),
    }
}
