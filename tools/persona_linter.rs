/// Persona Linter — validates persona coverage and template slots.
///
/// Usage: persona_linter <persona.ron | dir> [--standalone]
///
/// By default each file is layered over the built-in persona, the way the
/// engine loads it. `--standalone` lints the file on its own.

use narrator_engine::core::persona::{LintIssue, Persona};
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: persona_linter <persona.ron | dir> [--standalone]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let standalone = args[2..].iter().any(|a| a == "--standalone");

    let files = if target.is_file() {
        vec![target.to_path_buf()]
    } else if target.is_dir() {
        let mut found = Vec::new();
        collect_ron_files(target, &mut found);
        found.sort();
        found
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    };

    if files.is_empty() {
        eprintln!("ERROR: no .ron files under '{}'", target.display());
        process::exit(1);
    }

    let mut total_errors = 0;
    let mut total_warnings = 0;

    for path in &files {
        println!("\n=== {} ===\n", path.display());
        let persona = match load(path, standalone) {
            Ok(p) => p,
            Err(e) => {
                println!("ERROR: {}", e);
                total_errors += 1;
                continue;
            }
        };

        let issues = persona.lint();
        if issues.is_empty() {
            println!("All checks passed!");
        }
        for issue in &issues {
            if is_error(issue) {
                println!("ERROR: {}", issue);
                total_errors += 1;
            } else {
                println!("WARNING: {}", issue);
                total_warnings += 1;
            }
        }
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        total_errors,
        total_warnings
    );

    if total_errors == 0 {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load(path: &Path, standalone: bool) -> Result<Persona, String> {
    let loaded = Persona::load_from_ron(path).map_err(|e| e.to_string())?;
    if standalone {
        return Ok(loaded);
    }
    let mut base = Persona::builtin().map_err(|e| format!("built-in persona: {}", e))?;
    base.merge(loaded);
    Ok(base)
}

// Anything that can leave a turn without a response is an error; thin
// coverage is only a warning.
fn is_error(issue: &LintIssue) -> bool {
    matches!(
        issue,
        LintIssue::MissingFallback(_) | LintIssue::UnfillableSlot { .. }
    )
}

fn collect_ron_files(dir: &Path, out: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_ron_files(&path, out);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                out.push(path);
            }
        }
    }
}
