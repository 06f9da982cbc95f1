/// Story Linter — checks story files for broken references and dead ends.
///
/// Usage: story_linter <story.ron | dir> [--autoplay <runs>] [--seed <n>]
///
/// Set RUST_LOG to see engine logging (default: warn).

use std::path::{Path, PathBuf};
use std::process;
use story_engine::core::autoplay::Autoplayer;
use story_engine::core::lint::lint_story;
use story_engine::schema::story::Story;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story.ron | dir> [--autoplay <runs>] [--seed <n>]");
        process::exit(0);
    }

    let target = &args[1];
    let mut autoplay_runs: usize = 0;
    let mut seed: u64 = 42;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--autoplay" if i + 1 < args.len() => {
                i += 1;
                autoplay_runs = args[i].parse().unwrap_or(100);
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = Path::new(target);
    let files = if path.is_file() {
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        let mut files = Vec::new();
        collect_story_files(path, &mut files);
        files.sort();
        files
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target);
        process::exit(1);
    };

    let mut total_errors = 0;
    let mut total_warnings = 0;

    for file in &files {
        let story = match Story::load_from_ron(file) {
            Ok(story) => story,
            Err(e) => {
                println!("ERROR: failed to load {}: {}", file.display(), e);
                total_errors += 1;
                continue;
            }
        };

        println!(
            "\n=== {} ({}, {} scenes) ===\n",
            story.title,
            file.display(),
            story.scene_count()
        );

        let report = lint_story(&story);
        if report.is_clean() {
            println!("All checks passed!");
        }
        for warning in report.warnings() {
            println!("{}", warning);
        }
        for error in report.errors() {
            println!("{}", error);
        }
        total_errors += report.errors().count();
        total_warnings += report.warnings().count();

        if autoplay_runs > 0 {
            let summary = Autoplayer::new().seed(seed).run_many(&story, autoplay_runs);
            println!(
                "\nAutoplay: {} runs, {} completed ({:.0}%), {} dead ends, {} broken, {} stuck, {} over step limit",
                summary.runs,
                summary.completions,
                summary.completion_rate() * 100.0,
                summary.dead_ends,
                summary.broken,
                summary.stuck,
                summary.step_limits
            );
            for (ending, count) in &summary.endings {
                println!("  ending {:<20} {}", ending, count);
            }
            for (scene, count) in &summary.broken_references {
                println!("  missing scene {:<14} {}", scene, count);
            }
            if !summary.unvisited.is_empty() {
                println!("  never visited: {}", summary.unvisited.join(", "));
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

fn collect_story_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_story_files(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                files.push(path);
            }
        }
    }
}
