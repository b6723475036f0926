use std::path::PathBuf;

use clap::{
    Parser, Subcommand, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
    crate_description, crate_name, crate_version,
};
use clap_complete::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecompileVersionCli {
    /// GMLv2 semantics: named arguments, unified arrays
    Current,
    /// Pre-GMLv2 semantics: no function declarations, 2D arrays
    Legacy,
}

#[derive(Parser)]
#[command(name = crate_name!(),
    version = crate_version!(),
    about = crate_description!(),
    styles = Styles::styled()
        .header(AnsiColor::BrightGreen.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default()))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<TopLevel>,
}

#[derive(Subcommand)]
pub enum TopLevel {
    /// Decompiles GML bytecode
    Decompile {
        #[command(subcommand)]
        command: DecompileCommand,
    },
    /// Generate shell completion
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum DecompileCommand {
    /// Decompiles every code entry of a JSON program dump
    File {
        /// Path to the JSON program (code entries, enums, global scripts)
        path: PathBuf,

        /// Select bytecode version
        #[arg(long, value_enum, default_value_t = DecompileVersionCli::Current)]
        version: DecompileVersionCli,

        /// JSON file with decompiler settings; missing keys keep their defaults
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Leave default argument checks as plain if statements
        #[arg(long, default_value_t = false)]
        no_default_args: bool,

        /// Put opening braces on their own line
        #[arg(long, default_value_t = false)]
        brace_on_new_line: bool,

        /// Emit enum declarations after the code instead of before it
        #[arg(long, default_value_t = false)]
        enums_at_bottom: bool,

        /// Number of spaces per indentation level
        #[arg(long)]
        indent: Option<usize>,
    }
}
