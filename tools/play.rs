/// Play — interactive shell for reading a story and inspecting its graph.
///
/// Usage: play <story.ron> [--seed <n>]
///
/// Commands:
///   look                 — show the current scene and its choices
///   <n> | choose <n|id>  — take a choice (by number or id)
///   next                 — follow the scene's continue edge
///   back                 — step back one scene
///   vars                 — show visible variables
///   history              — show visited scenes
///   layout               — print the story graph layout
///   lint                 — run story checks
///   auto <n>             — autoplay n random walks and summarize
///   restart              — start over
///   help                 — list commands
///   quit                 — exit

use std::io::{self, BufRead, Write};
use std::path::Path;
use story_engine::core::autoplay::Autoplayer;
use story_engine::core::layout::{layout_story, LayoutOptions};
use story_engine::core::lint::lint_story;
use story_engine::core::playthrough::{PlayStatus, Playthrough, Step};
use story_engine::schema::scene::CONTINUE;
use story_engine::schema::story::Story;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let story_path = args[1].clone();
    let mut seed: u64 = 42;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let story = match Story::load_from_ron(Path::new(&story_path)) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: failed to load {}: {}", story_path, e);
            std::process::exit(1);
        }
    };

    println!("{} by {}", story.title, story.author);
    println!("{} scenes, start: {}", story.scene_count(), story.config.start_scene);
    println!("Type 'help' for commands.\n");

    let mut play = Playthrough::new(&story);
    print_scene(&play);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("play> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "look" | "l" => print_scene(&play),
            "choose" | "c" => {
                if parts.len() < 2 {
                    println!("Usage: choose <number | choice id>");
                    continue;
                }
                choose(&mut play, parts[1]);
            }
            "next" | "n" | CONTINUE => {
                let target = match play.current_content() {
                    Ok(scene) if scene.choices.is_empty() => scene.fallback_target(),
                    Ok(_) => {
                        println!("This scene has choices. Use 'choose'.");
                        continue;
                    }
                    Err(e) => {
                        println!("ERROR: {}", e);
                        continue;
                    }
                };
                match target {
                    Some(target) => report_step(&play.advance(CONTINUE, target), &play),
                    None => println!("This scene is a dead end. Try 'back'."),
                }
            }
            "back" | "b" => match play.retreat() {
                Ok(Some(_)) => print_scene(&play),
                Ok(None) => println!("Already at the first scene."),
                Err(e) => println!("ERROR: {}", e),
            },
            "vars" | "v" => {
                let visible = play.visible_variables();
                if visible.is_empty() {
                    println!("No variables.");
                }
                for (name, var) in visible {
                    let filled = (var.fill_fraction() * 10.0).round() as usize;
                    println!(
                        "  {:<12} {:>4}  [{}{}] {}",
                        var.label(name),
                        var.value,
                        "#".repeat(filled),
                        ".".repeat(10 - filled),
                        var.rank().label()
                    );
                }
                if !play.achievements().is_empty() {
                    println!("  achievements: {}", play.achievements().join(", "));
                }
            }
            "history" => {
                println!("  {}", play.history().join(" -> "));
                println!("  progress: {:.0}%", play.progress() * 100.0);
            }
            "layout" => {
                let layout = layout_story(&story, Some(play.current_scene_id()), &LayoutOptions::default());
                println!("\n--- Layout: {} nodes, {} edges ---", layout.nodes.len(), layout.edges.len());
                for node in &layout.nodes {
                    println!(
                        "{} L{} ({:>6.0}, {:>6.0})  {:<22} {}",
                        if node.selected { "*" } else { " " },
                        node.level,
                        node.position.x,
                        node.position.y,
                        node.id,
                        node.label
                    );
                }
                for edge in &layout.edges {
                    println!("    {} -> {}  \"{}\"", edge.source, edge.target, edge.label);
                }
                for edge in layout.dangling_edges() {
                    println!("  dangling: {} -> {}", edge.source, edge.target);
                }
                println!("--- End ---\n");
            }
            "lint" => {
                let report = lint_story(&story);
                if report.is_clean() {
                    println!("All checks passed!");
                }
                for issue in &report.issues {
                    println!("{}", issue);
                }
            }
            "auto" => {
                let runs: usize = match parts.get(1).map(|n| n.parse()) {
                    Some(Ok(n)) if n > 0 => n,
                    None => 100,
                    _ => {
                        println!("Usage: auto <runs>");
                        continue;
                    }
                };
                let summary = Autoplayer::new().seed(seed).run_many(&story, runs);
                println!("\n=== Autoplay: {} runs ===\n", summary.runs);
                println!("Completed:  {} ({:.0}%)", summary.completions, summary.completion_rate() * 100.0);
                println!("Dead ends:  {}", summary.dead_ends);
                println!("Broken:     {}", summary.broken);
                println!("Stuck:      {}", summary.stuck);
                println!("Step limit: {}", summary.step_limits);
                for (ending, count) in &summary.endings {
                    println!("  ending {:<20} {}", ending, count);
                }
                for (scene, count) in &summary.broken_references {
                    println!("  missing scene {:<14} {}", scene, count);
                }
                if !summary.unvisited.is_empty() {
                    println!("  never visited: {}", summary.unvisited.join(", "));
                }
                println!();
            }
            "restart" => {
                play.restart();
                print_scene(&play);
            }
            _ => {
                if cmd.parse::<usize>().is_ok() {
                    choose(&mut play, &cmd);
                } else {
                    println!("Unknown command: {}. Type 'help' for commands.", cmd);
                }
            }
        }
    }
}

fn choose(play: &mut Playthrough<'_>, which: &str) {
    let choices = match play.available_choices() {
        Ok(choices) => choices,
        Err(e) => {
            println!("ERROR: {}", e);
            return;
        }
    };
    let picked = match which.parse::<usize>() {
        Ok(n) if n >= 1 && n <= choices.len() => Some(choices[n - 1]),
        Ok(_) => None,
        Err(_) => choices.iter().copied().find(|c| c.id == which),
    };
    match picked {
        Some(choice) => {
            let result = play.advance(&choice.id, &choice.next_scene);
            report_step(&result, play);
        }
        None => println!("No available choice '{}'.", which),
    }
}

fn report_step<E: std::fmt::Display>(result: &Result<Step, E>, play: &Playthrough<'_>) {
    match result {
        Ok(Step::Completed { .. }) => {
            println!("\n=== The End ===");
            match play.ending() {
                Some(ending) => {
                    println!("{}", ending.name);
                    if !ending.description.is_empty() {
                        println!("{}", ending.description);
                    }
                }
                None => println!("(no ending matched)"),
            }
            println!("Type 'restart' to play again.\n");
        }
        Ok(_) => print_scene(play),
        Err(e) => println!("ERROR: {}", e),
    }
}

fn print_scene(play: &Playthrough<'_>) {
    match play.status() {
        PlayStatus::Broken(id) => {
            println!("\nScene {} is referenced but not found in the story.", id);
            println!("Type 'back' to return.\n");
            return;
        }
        PlayStatus::Complete => {
            println!("\nThe story is over. Type 'restart' to play again.\n");
            return;
        }
        _ => {}
    }
    let Ok(scene) = play.current_content() else {
        return;
    };
    let content = play.rendered_content().unwrap_or_default();

    println!("\n--- {} ---", scene.title);
    println!("{}\n", content);

    if scene.choices.is_empty() {
        match scene.fallback_target() {
            Some(_) => println!("  [next] Continue"),
            None => println!("  (dead end, type 'back')"),
        }
    } else {
        let available = play.available_choices().unwrap_or_default();
        for (i, choice) in available.iter().enumerate() {
            println!("  [{}] {}", i + 1, choice.text);
        }
        let locked = scene.choices.len() - available.len();
        if locked > 0 {
            println!("  ({} locked)", locked);
        }
    }
    println!();
}

fn print_usage() {
    println!("Usage: play <story.ron> [--seed <n>]");
}

fn print_help() {
    println!("Commands:");
    println!("  look                 — show the current scene and its choices");
    println!("  <n> | choose <n|id>  — take a choice (by number or id)");
    println!("  next                 — follow the scene's continue edge");
    println!("  back                 — step back one scene");
    println!("  vars                 — show visible variables");
    println!("  history              — show visited scenes");
    println!("  layout               — print the story graph layout");
    println!("  lint                 — run story checks");
    println!("  auto <n>             — autoplay n random walks and summarize");
    println!("  restart              — start over");
    println!("  help                 — list commands");
    println!("  quit                 — exit");
}
