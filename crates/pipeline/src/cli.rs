use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lexstruct",
    version,
    about = "Structure and entity extraction for OCR'd Moroccan legislation"
)]
pub struct Cli {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract structure (and entities) from a file or a directory of files
    Run(RunArgs),
    /// Extract entities from an already structured JSON document
    Entities(EntitiesArgs),
    /// Apply editor corrections to an entities file
    Edit(EditArgs),
}

/// Options shared by every command that talks to the generation service.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    pub input: PathBuf,

    #[arg(long, default_value = "output")]
    pub output: PathBuf,

    #[command(flatten)]
    pub service: ServiceArgs,

    #[arg(long, default_value_t = false)]
    pub skip_entities: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EntitiesArgs {
    /// A `<name>.json` written by `run`
    pub document: PathBuf,

    /// Defaults to `<name>_entities.json` next to the input
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// A `<name>_entities.json` holding `text`, `entities` and `relations`
    #[arg(long)]
    pub entities: PathBuf,

    /// JSON array of edit operations, applied in order
    #[arg(long)]
    pub ops: PathBuf,

    /// Defaults to overwriting the entities file
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "lexstruct",
            "--json-logs",
            "run",
            "laws/",
            "--model",
            "gpt-4o",
            "--no-cache",
            "--skip-entities",
        ]);
        assert!(cli.json_logs);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input, PathBuf::from("laws/"));
                assert_eq!(args.output, PathBuf::from("output"));
                assert_eq!(args.service.model.as_deref(), Some("gpt-4o"));
                assert!(args.service.no_cache);
                assert!(args.skip_entities);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_edit_requires_both_files() {
        assert!(Cli::try_parse_from(["lexstruct", "edit", "--entities", "a.json"]).is_err());
    }
}
