use std::path::Path;

use clap::{CommandFactory, Parser};
use deqgml_lib::{DecompileOptions, DecompileSettings, DecompileVersion, Program};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, DecompileCommand, DecompileVersionCli, TopLevel};

mod cli;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(TopLevel::Decompile { command }) => match command {
            DecompileCommand::File {
                path,
                version,
                settings,
                no_default_args,
                brace_on_new_line,
                enums_at_bottom,
                indent,
            } => {
                let version = match version {
                    DecompileVersionCli::Current => DecompileVersion::Current,
                    DecompileVersionCli::Legacy => DecompileVersion::Legacy,
                };
                let mut settings = match settings {
                    Some(settings_path) => read_json::<DecompileSettings>(&settings_path),
                    None => DecompileSettings::default(),
                };
                if no_default_args {
                    settings.cleanup_default_argument_values = false;
                }
                if brace_on_new_line {
                    settings.open_block_brace_on_same_line = false;
                }
                if enums_at_bottom {
                    settings.macro_declarations_at_top = false;
                }
                if let Some(width) = indent {
                    settings.indent_string = " ".repeat(width);
                }

                let program = read_json::<Program>(&path);
                debug!(
                    entries = program.code_entries.len(),
                    scripts = program.global_scripts.len(),
                    "loaded program"
                );
                let out = deqgml_lib::decompile_program(&program, &DecompileOptions { version, settings });
                print!("{out}");
            }
        },
        Some(TopLevel::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("failed to print help: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("failed to read {path:?}: {e}");
            std::process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("failed to parse {path:?}: {e}");
            std::process::exit(1);
        }
    }
}
