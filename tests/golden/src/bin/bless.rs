use anyhow::{Result, anyhow, bail};
use huffc_golden_tests::harness::{BlessOptions, bless_cases, discover_cases, normalize_case_arg};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut errors_only = false;
    let mut list_only = false;
    let mut check = false;
    let mut cases: Vec<String> = Vec::new();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--errors-only" => {
                errors_only = true;
                index += 1;
            }
            "--check" => {
                check = true;
                index += 1;
            }
            "--list" => {
                list_only = true;
                index += 1;
            }
            "--case" => {
                let Some(value) = args.get(index + 1) else {
                    bail!("--case requires a value");
                };
                cases.push(normalize_case_arg(value));
                index += 2;
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument '{unknown}'. Use --help to view usage."
                ));
            }
        }
    }

    if list_only {
        for case in discover_cases()? {
            println!("{case}");
        }
        return Ok(());
    }

    if cases.is_empty() {
        cases = discover_cases()?;
    } else {
        cases.sort();
        cases.dedup();
    }

    let summary = bless_cases(&cases, BlessOptions { errors_only, check })?;
    if check {
        if summary.updated_files.is_empty() {
            println!("{} fixture(s) up to date.", summary.processed_cases);
            return Ok(());
        }
        for path in &summary.updated_files {
            println!("stale {}", path.display());
        }
        bail!(
            "{} expected file(s) out of date; rerun without --check to bless them",
            summary.updated_files.len()
        );
    }

    println!(
        "Processed {} case(s), updated {} file(s).",
        summary.processed_cases,
        summary.updated_files.len()
    );
    for path in summary.updated_files {
        println!("updated {}", path.display());
    }
    Ok(())
}

fn print_usage() {
    println!("Usage: cargo run -p huffc-golden-tests --bin bless -- [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --case <NAME>   Bless only this fixture; a path to it or its main.huff works too");
    println!("  --errors-only   Only refresh expected.err files");
    println!("  --check         Fail if any expected file is out of date, writing nothing");
    println!("  --list          List discovered fixtures and exit");
    println!("  -h, --help      Show this help");
}
