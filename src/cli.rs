use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "casekeep")]
#[command(bin_name = "casekeep")]
#[command(version)]
#[command(about = "Local case storage with debounced autosave for clinical fidelity forms")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 's',
        long,
        env = "CASEKEEP_STORE",
        help = "Path to the SQLite case store (overrides the config file)."
    )]
    pub store: Option<PathBuf>,

    #[arg(
        short = 'c',
        long,
        env = "CASEKEEP_CONFIG",
        help = "Config file to read instead of ./casekeep.toml."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "CASEKEEP_NAMESPACE",
        help = "Key prefix that scopes all stored records."
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        env = "CASEKEEP_READ_ONLY",
        value_parser = clap::builder::BoolishValueParser::new(),
        help = "Open the store read-only; every write is refused."
    )]
    pub read_only: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create a new case and select it.")]
    New(NewArgs),
    #[command(about = "List cases, most recently modified first.")]
    Ls(ListArgs),
    #[command(about = "Show one case document (defaults to the current case).")]
    Show(ShowArgs),
    #[command(about = "Make a case the current case.")]
    Select(CaseIdArgs),
    #[command(about = "Print the current case id.")]
    Current,
    #[command(about = "Set one field of a case document.")]
    Set(SetArgs),
    #[command(about = "Delete a case.")]
    Rm(CaseIdArgs),
    #[command(about = "Copy a case under a new id.")]
    Dup(CaseIdArgs),
    #[command(about = "Export a case document as JSON.")]
    Export(ExportArgs),
    #[command(about = "Import a case document from a file or stdin.")]
    Import(ImportArgs),
    #[command(about = "Report how much of the storage quota is used.")]
    Usage(UsageArgs),
    #[command(about = "Delete every stored case and the current-case pointer.")]
    Clear(ClearArgs),
    #[command(about = "Edit a case interactively with autosave.")]
    Edit(EditArgs),
}

#[derive(Debug, Args)]
pub struct NewArgs {
    #[arg(short = 'i', long, help = "Client initials for the new case.")]
    pub initials: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, help = "Emit JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Case id (the case- prefix may be omitted).")]
    pub id: Option<String>,

    #[arg(long, help = "Emit the raw JSON document.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CaseIdArgs {
    #[arg(help = "Case id (the case- prefix may be omitted).")]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    #[arg(long = "case", help = "Case id (defaults to the current case).")]
    pub case_id: Option<String>,

    #[arg(help = "JSON Pointer of the field, e.g. /demographics/age.")]
    pub pointer: String,

    #[arg(help = "New value; parsed as JSON, otherwise stored as a string.")]
    pub value: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(help = "Case id (the case- prefix may be omitted).")]
    pub id: String,

    #[arg(short = 'o', long, help = "Write to this file instead of stdout.")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[arg(help = "Exported case file, or - for stdin.")]
    pub file: String,
}

#[derive(Debug, Args)]
pub struct UsageArgs {
    #[arg(long, help = "Emit JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ClearArgs {
    #[arg(long, help = "Confirm deletion of all stored data.")]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[arg(help = "Case id to edit (defaults to the current case).")]
    pub id: Option<String>,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
