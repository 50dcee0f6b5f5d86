use anyhow::{Result, anyhow, bail};
use retroasm_golden_tests::harness::{BlessOptions, bless_cases, discover_cases};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut errors_only = false;
    let mut list_only = false;
    let mut cases: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--errors-only" | "--err-only" => errors_only = true,
            "--list" => list_only = true,
            "--case" => {
                let Some(value) = args.next() else {
                    bail!("--case requires a value");
                };
                cases.push(value);
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

    let summary = bless_cases(&cases, BlessOptions { errors_only })?;
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
    println!("Usage: cargo run -p retroasm-golden-tests --bin bless -- [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --errors-only, --err-only   Regenerate only expected.err fixtures");
    println!("  --case <NAME>               Fixture directory name under fixtures/");
    println!("  --list                      List discoverable cases and exit");
    println!("  -h, --help                  Show this help");
}
