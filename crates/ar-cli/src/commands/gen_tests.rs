use std::path::Path;

use anyhow::Context;
use ar_agents::coordinator::{GeneratedTests, DRY_RUN_STATUS};
use ar_core::config::Config;
use ar_core::file_ops;

/// Run the `gen-tests` subcommand: print a generated suite for `source`
/// and, with `write`, save it beside the source under the language's
/// test file name.
pub async fn run(config: &Config, source: &Path, write: bool) -> anyhow::Result<()> {
    let coordinator = super::coordinator(config)?;
    let suite = coordinator
        .generate_tests(source)
        .await
        .context("failed to generate tests")?;
    tracing::info!(language = suite.language, test_path = %suite.test_path.display(), "suite generated");

    println!("{}", suite.response);
    if !write {
        return Ok(());
    }

    let code = suite_code(&suite)?;
    println!();
    if config.pipeline.dry_run {
        println!("{DRY_RUN_STATUS}");
        return Ok(());
    }
    let report =
        file_ops::write_file_safely(&suite.test_path, code, config.pipeline.backup_enabled)?;
    println!("{report}");
    Ok(())
}

/// The code to save; a response without a fenced block has none.
fn suite_code(suite: &GeneratedTests) -> anyhow::Result<&str> {
    suite.test_code.as_deref().with_context(|| {
        format!(
            "no code block in generated suite; {} not written",
            suite.test_path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn suite(test_code: Option<&str>) -> GeneratedTests {
        GeneratedTests {
            language: "python",
            response: "Here are the tests.".into(),
            test_code: test_code.map(str::to_string),
            test_path: PathBuf::from("pkg/test_calc.py"),
        }
    }

    #[test]
    fn fenced_suite_is_written() {
        let code = suite(Some("def test_x(): pass"));
        assert_eq!(suite_code(&code).unwrap(), "def test_x(): pass");
    }

    #[test]
    fn suite_without_block_names_the_skipped_path() {
        let err = suite_code(&suite(None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no code block in generated suite; pkg/test_calc.py not written"
        );
    }
}
