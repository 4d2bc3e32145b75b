//! Shell completion generation.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::env;
use std::io;
use std::path::Path;

use crate::Cli;

/// `completions`: write the completion script for `shell` to stdout.
///
/// Without a shell argument the shell is taken from `$SHELL`.
pub(crate) fn cmd_completions(shell: Option<Shell>) -> Result<()> {
    let shell = match shell {
        Some(shell) => shell,
        None => detect_shell().context(
            "Could not detect your shell. Please specify it explicitly:\n  flashmd completions bash",
        )?,
    };

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn detect_shell() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

/// Map a shell binary path such as `/usr/bin/zsh` to its [`Shell`].
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let name = Path::new(shell_path).file_stem()?.to_str()?;
    match name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}
