use std::path::Path;

use anyhow::Context;
use ar_core::file_ops;

/// Run the `restore` subcommand. Logging stays off here; the outcome is the
/// only output.
pub fn run(backup: &Path, original: &Path) -> anyhow::Result<()> {
    if file_ops::file_info(backup).map_or(true, |info| !info.is_file) {
        anyhow::bail!("Backup file does not exist: {}", backup.display());
    }
    let message = file_ops::restore_from_backup(backup, original)
        .with_context(|| format!("failed to restore {}", original.display()))?;
    println!("{message}");
    Ok(())
}
