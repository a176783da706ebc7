use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use huffc_core::{CompileError, CompilerConfig, compile_with_fs, load_config};
use huffc_fs::StdSourceFS;

const INPUT_FILE: &str = "main.huff";
const CONFIG_FILE: &str = "huffc.ron";

/// What a fixture produced, in the shape stored next to it.
enum Outcome {
    Compiled { hex: String, listing: String },
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlessOptions {
    pub errors_only: bool,
    /// Report stale files without touching them.
    pub check: bool,
}

#[derive(Debug, Default)]
pub struct BlessSummary {
    pub processed_cases: usize,
    pub updated_files: Vec<PathBuf>,
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

pub fn discover_cases() -> Result<Vec<String>> {
    let dir = fixtures_dir();
    let entries = std::fs::read_dir(&dir)
        .with_context(|| format!("failed to read fixtures dir '{}'", dir.display()))?;

    let mut cases = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| anyhow!("fixture directory name {name:?} is not UTF-8"))?;
        cases.push(name);
    }
    cases.sort();
    Ok(cases)
}

pub fn run_case(case: &str) -> Result<()> {
    let fixture_dir = fixtures_dir().join(case);
    let outcome = compile_fixture(&fixture_dir)?;

    let expected_error_path = fixture_dir.join("expected.err");
    if expected_error_path.exists() {
        let expected_error = read_expected(&expected_error_path)?;
        let error = match outcome {
            Outcome::Compiled { hex, .. } => bail!(
                "fixture '{case}' expected a compile error, but it produced {hex}"
            ),
            Outcome::Failed(error) => error,
        };
        similar_asserts::assert_eq!(expected_error.trim_end(), error.trim_end());
        return Ok(());
    }

    let (hex, listing) = match outcome {
        Outcome::Compiled { hex, listing } => (hex, listing),
        Outcome::Failed(error) => bail!("fixture '{case}' failed to compile: {error}"),
    };

    let expected_hex = read_expected(&fixture_dir.join("expected.hex"))?;
    similar_asserts::assert_eq!(expected_hex.trim_end(), hex);

    let expected_listing_path = fixture_dir.join("expected.lst");
    if expected_listing_path.exists() {
        let expected_listing = read_expected(&expected_listing_path)?;
        similar_asserts::assert_eq!(expected_listing.trim_end(), listing.trim_end());
    }
    Ok(())
}

/// Rewrites the expected files of `cases` from what the compiler currently
/// produces. Listings are only refreshed for fixtures that already keep one.
pub fn bless_cases(cases: &[String], options: BlessOptions) -> Result<BlessSummary> {
    let mut summary = BlessSummary::default();
    for case in cases {
        let fixture_dir = fixtures_dir().join(case);
        if !fixture_dir.is_dir() {
            bail!("unknown fixture '{case}'");
        }
        summary.processed_cases += 1;

        let mut writer = ExpectedWriter {
            dir: &fixture_dir,
            check: options.check,
            summary: &mut summary,
        };
        match compile_fixture(&fixture_dir)? {
            Outcome::Failed(error) => {
                writer.write("expected.err", &format!("{error}\n"))?;
                writer.remove("expected.hex")?;
                writer.remove("expected.lst")?;
            }
            Outcome::Compiled { hex, listing } => {
                if options.errors_only {
                    continue;
                }
                writer.write("expected.hex", &format!("{hex}\n"))?;
                if fixture_dir.join("expected.lst").exists() {
                    writer.write("expected.lst", &listing)?;
                }
                writer.remove("expected.err")?;
            }
        }
    }
    Ok(summary)
}

fn compile_fixture(fixture_dir: &Path) -> Result<Outcome> {
    let config_path = fixture_dir.join(CONFIG_FILE);
    let config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        CompilerConfig::default()
    };

    let result = compile_with_fs(
        config.entry_macro(),
        Path::new(INPUT_FILE),
        fixture_dir,
        &StdSourceFS,
        &config,
    );
    Ok(match result {
        Ok(output) => Outcome::Compiled {
            hex: output.bytecode_hex(),
            listing: output.listing(&config.opcode_table()),
        },
        Err(error) => Outcome::Failed(summarize_error(&error)),
    })
}

/// `file:line: message`, stable across renderer changes.
fn summarize_error(error: &CompileError) -> String {
    match &error.location {
        Some(location) => format!("{}: {}", location.display_position(), error.error),
        None => error.error.to_string(),
    }
}

fn read_expected(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

/// Keeps one fixture's expected files in sync. A fixture holds either
/// `expected.err` or `expected.hex`, never both.
struct ExpectedWriter<'a> {
    dir: &'a Path,
    check: bool,
    summary: &'a mut BlessSummary,
}

impl ExpectedWriter<'_> {
    fn write(&mut self, file: &str, contents: &str) -> Result<()> {
        let path = self.dir.join(file);
        if std::fs::read_to_string(&path).is_ok_and(|current| current == contents) {
            return Ok(());
        }
        if !self.check {
            std::fs::write(&path, contents)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
        }
        self.summary.updated_files.push(path);
        Ok(())
    }

    fn remove(&mut self, file: &str) -> Result<()> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(());
        }
        if !self.check {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove '{}'", path.display()))?;
        }
        self.summary.updated_files.push(path);
        Ok(())
    }
}

/// Accepts a fixture name, its directory, or its `main.huff`.
pub fn normalize_case_arg(raw: &str) -> String {
    let path = Path::new(raw);
    let dir = if path.file_name().and_then(|name| name.to_str()) == Some(INPUT_FILE) {
        path.parent().unwrap_or(path)
    } else {
        path
    };
    dir.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(raw)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_args_accept_paths() {
        assert_eq!(normalize_case_arg("jump-labels"), "jump-labels");
        assert_eq!(normalize_case_arg("fixtures/jump-labels/"), "jump-labels");
        assert_eq!(
            normalize_case_arg("tests/golden/fixtures/jump-labels/main.huff"),
            "jump-labels"
        );
    }

    #[test]
    fn check_mode_reports_without_writing() {
        let cases = discover_cases().expect("cases");
        let summary = bless_cases(
            &cases,
            BlessOptions {
                errors_only: false,
                check: true,
            },
        )
        .expect("bless");
        assert_eq!(summary.processed_cases, cases.len());
    }
}
