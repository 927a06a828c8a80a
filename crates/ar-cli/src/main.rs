mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// auto-refactor -- plan, refactor, review and document code with LLM agents.
#[derive(Parser)]
#[command(name = "auto-refactor", version, about)]
struct Cli {
    /// Config file (defaults to ~/.auto-refactor/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct Target {
    /// File or directory to work on. Pass "" for no target.
    path: String,
    /// What to do, in plain language.
    instruction: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a request to completion and print the report.
    Run {
        #[command(flatten)]
        target: Target,
        /// Overwrite without keeping a timestamped backup.
        #[arg(long)]
        no_backup: bool,
        /// Run everything but leave files untouched.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a request and print streaming events as they arrive.
    Stream {
        #[command(flatten)]
        target: Target,
    },

    /// Copy a backup over the original file.
    Restore {
        backup: PathBuf,
        original: PathBuf,
    },

    /// Compare two files without calling a model.
    Diff {
        original: PathBuf,
        modified: PathBuf,
        /// Two-column view instead of a unified diff.
        #[arg(long, conflicts_with = "changes")]
        side_by_side: bool,
        /// Column width for --side-by-side.
        #[arg(long, default_value_t = 80, requires = "side_by_side")]
        width: usize,
        /// List changed hunks (modified, deleted, added).
        #[arg(long)]
        changes: bool,
    },

    /// Generate a test suite for a source file.
    GenTests {
        source: PathBuf,
        /// Save the suite beside the source (backup and dry-run per config).
        #[arg(long)]
        write: bool,
        #[arg(long)]
        no_backup: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

impl Commands {
    fn diff_view(side_by_side: bool, width: usize, changes: bool) -> commands::diff::DiffView {
        use commands::diff::DiffView;
        if side_by_side {
            DiffView::SideBySide { width }
        } else if changes {
            DiffView::Changes
        } else {
            DiffView::Unified
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            target,
            no_backup,
            dry_run,
        } => {
            let overrides = commands::Overrides { no_backup, dry_run };
            let config = commands::load_config(cli.config.as_deref(), overrides)?;
            commands::run::run(&config, target.path, target.instruction).await?;
        }
        Commands::Stream { target } => {
            let config = commands::load_config(cli.config.as_deref(), Default::default())?;
            commands::stream::run(&config, target.path, target.instruction).await?;
        }
        Commands::Restore { backup, original } => {
            commands::restore::run(&backup, &original)?;
        }
        Commands::Diff {
            original,
            modified,
            side_by_side,
            width,
            changes,
        } => {
            let view = Commands::diff_view(side_by_side, width, changes);
            commands::diff::run(&original, &modified, view)?;
        }
        Commands::GenTests {
            source,
            write,
            no_backup,
            dry_run,
        } => {
            let overrides = commands::Overrides { no_backup, dry_run };
            let config = commands::load_config(cli.config.as_deref(), overrides)?;
            commands::gen_tests::run(&config, &source, write).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::try_parse_from([
            "auto-refactor",
            "run",
            "src/calc.py",
            "optimize this",
            "--no-backup",
            "--dry-run",
            "--config",
            "alt.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        match cli.command {
            Commands::Run {
                target,
                no_backup,
                dry_run,
            } => {
                assert_eq!(target.path, "src/calc.py");
                assert_eq!(target.instruction, "optimize this");
                assert!(no_backup);
                assert!(dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn empty_path_is_accepted_for_stream() {
        let cli = Cli::try_parse_from(["auto-refactor", "stream", "", "hi"]).unwrap();
        match cli.command {
            Commands::Stream { target } => {
                assert!(target.path.is_empty());
                assert_eq!(target.instruction, "hi");
            }
            _ => panic!("expected stream"),
        }
    }

    #[test]
    fn diff_defaults_to_unified_view() {
        let cli = Cli::try_parse_from(["auto-refactor", "diff", "a.py", "b.py"]).unwrap();
        match cli.command {
            Commands::Diff {
                original,
                modified,
                side_by_side,
                width,
                changes,
            } => {
                assert_eq!(original, PathBuf::from("a.py"));
                assert_eq!(modified, PathBuf::from("b.py"));
                assert_eq!(
                    Commands::diff_view(side_by_side, width, changes),
                    commands::diff::DiffView::Unified
                );
            }
            _ => panic!("expected diff"),
        }
    }

    #[test]
    fn diff_side_by_side_takes_a_width() {
        let cli = Cli::try_parse_from([
            "auto-refactor",
            "diff",
            "a.py",
            "b.py",
            "--side-by-side",
            "--width",
            "40",
        ])
        .unwrap();
        match cli.command {
            Commands::Diff {
                side_by_side,
                width,
                changes,
                ..
            } => assert_eq!(
                Commands::diff_view(side_by_side, width, changes),
                commands::diff::DiffView::SideBySide { width: 40 }
            ),
            _ => panic!("expected diff"),
        }

        assert!(Cli::try_parse_from(["auto-refactor", "diff", "a", "b", "--width", "40"]).is_err());
        assert!(Cli::try_parse_from([
            "auto-refactor",
            "diff",
            "a",
            "b",
            "--side-by-side",
            "--changes"
        ])
        .is_err());
    }

    #[test]
    fn gen_tests_parses_write_flags() {
        let cli =
            Cli::try_parse_from(["auto-refactor", "gen-tests", "src/calc.py", "--write", "--dry-run"])
                .unwrap();
        match cli.command {
            Commands::GenTests {
                source,
                write,
                no_backup,
                dry_run,
            } => {
                assert_eq!(source, PathBuf::from("src/calc.py"));
                assert!(write);
                assert!(!no_backup);
                assert!(dry_run);
            }
            _ => panic!("expected gen-tests"),
        }
    }

    #[test]
    fn restore_requires_both_paths() {
        assert!(Cli::try_parse_from(["auto-refactor", "restore", "a.py.backup_1"]).is_err());
        assert!(Cli::try_parse_from(["auto-refactor", "restore", "a.py.backup_1", "a.py"]).is_ok());
    }
}
