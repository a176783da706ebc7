use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const ENTRY_FILE: &str = "main.huff";

/// One directory under `fixtures/`.
struct FixtureCase {
    name: String,
    /// `.huff` files and the optional config, relative to the fixture.
    sources: Vec<String>,
    expects_error: bool,
}

fn main() {
    let manifest_dir = PathBuf::from(
        env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR should be set by Cargo"),
    );
    let fixtures_dir = manifest_dir.join("fixtures");
    println!("cargo:rerun-if-changed={}", fixtures_dir.display());

    let mut cases = discover_fixture_cases(&fixtures_dir);
    cases.sort_by(|a, b| a.name.cmp(&b.name));

    let generated = generate_tests(&cases);

    let out_dir =
        PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR should be set by Cargo build script"));
    let out_file = out_dir.join("generated_golden_tests.rs");
    fs::write(&out_file, generated).expect("failed to write generated golden tests");
}

fn discover_fixture_cases(fixtures_dir: &Path) -> Vec<FixtureCase> {
    let entries = fs::read_dir(fixtures_dir).unwrap_or_else(|err| {
        panic!(
            "failed to read fixtures dir '{}': {err}",
            fixtures_dir.display()
        )
    });

    let mut cases = Vec::new();
    for entry in entries {
        let path = entry.expect("failed to read fixture entry").path();
        if !path.is_dir() {
            continue;
        }
        cases.push(read_fixture_case(&path));
    }
    cases
}

fn read_fixture_case(dir: &Path) -> FixtureCase {
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_else(|| panic!("fixture directory name must be valid UTF-8"))
        .to_string();

    if !dir.join(ENTRY_FILE).is_file() {
        panic!("fixture '{name}' has no {ENTRY_FILE}");
    }
    let has_hex = dir.join("expected.hex").is_file();
    let has_err = dir.join("expected.err").is_file();
    if has_hex == has_err {
        panic!("fixture '{name}' needs exactly one of expected.hex and expected.err");
    }

    // Includes may live in nested directories, so every file is tracked.
    let mut sources = Vec::new();
    collect_sources(dir, dir, &mut sources);
    sources.sort();

    FixtureCase {
        name,
        sources,
        expects_error: has_err,
    }
}

fn collect_sources(root: &Path, dir: &Path, sources: &mut Vec<String>) {
    let entries =
        fs::read_dir(dir).unwrap_or_else(|err| panic!("failed to read '{}': {err}", dir.display()));
    for entry in entries {
        let path = entry.expect("failed to read fixture file entry").path();
        println!("cargo:rerun-if-changed={}", path.display());

        if path.is_dir() {
            collect_sources(root, &path, sources);
            continue;
        }
        let is_source = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("huff") || ext == "ron");
        if is_source {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            sources.push(relative.display().to_string().replace('\\', "/"));
        }
    }
}

fn generate_tests(cases: &[FixtureCase]) -> String {
    let mut out = String::new();
    out.push_str("use huffc_golden_tests::harness::run_case;\n\n");

    if cases.is_empty() {
        out.push_str("#[test]\nfn no_fixtures_found() {\n    panic!(\"no fixtures found for golden harness\");\n}\n");
        return out;
    }

    let mut used_names = BTreeSet::new();
    for case in cases {
        let prefix = if case.expects_error { "rejects" } else { "compiles" };
        let function_name = format!("{prefix}_{}", sanitize_ident(&case.name));
        if !used_names.insert(function_name.clone()) {
            panic!("fixture '{}' maps to a duplicate test name {function_name}", case.name);
        }

        let name = &case.name;
        out.push_str(&format!(
            "/// Sources: {}\n#[test]\nfn {function_name}() {{\n    run_case({name:?})\n        .unwrap_or_else(|err| panic!(\"fixture {{}} failed:\\n{{err:#}}\", {name:?}));\n}}\n\n",
            case.sources.join(", ")
        ));
    }

    out
}

fn sanitize_ident(input: &str) -> String {
    let ident: String = input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    ident
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
