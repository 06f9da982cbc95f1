/// Digital Whispers demo — loads the bundled stories, plays one path with a
/// two-phase transition, lays out the graph and lints the unfinished draft.
///
/// Run with: cargo run --example digital_whispers

use story_engine::core::autoplay::Autoplayer;
use story_engine::core::layout::{layout_story, LayoutOptions};
use story_engine::core::lint::lint_story;
use story_engine::core::playthrough::{Playthrough, Step};
use story_engine::core::repository::{InMemoryStoryRepository, StoryRepository};

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    // --- Load every story in stories/ ---
    let repo = InMemoryStoryRepository::builder()
        .stories_dir("stories")
        .build()
        .expect("Failed to load stories");

    for story in repo.list_stories() {
        println!("{:<20} {:<16} {} scenes", story.title, story.author, story.scene_count());
    }

    let story = repo
        .get_story("digital-whispers")
        .expect("digital-whispers is bundled");

    // --- Play a path, animating each move in two phases ---
    let path = [
        ("read", "read_message"),
        ("reply", "reply"),
        ("listen", "listen"),
        ("help", "end"),
    ];

    let mut play = Playthrough::new(story);
    for (choice, target) in path {
        let scene = play.current_content().expect("scene exists");
        println!("\n=== {} ===", scene.title);
        println!("{}", play.rendered_content().expect("scene exists"));

        play.begin_advance(choice, target).expect("valid choice");
        // A UI would run its transition here; input is locked until it finishes
        assert!(play.begin_retreat().is_err());

        match play.finish_transition() {
            Some(Step::Completed { .. }) => {
                let ending = play.ending().map_or("(none)", |e| e.name.as_str());
                println!("\n>>> The End: {}", ending);
            }
            Some(step) => println!("  -> {:?}", step),
            None => unreachable!("a transition was pending"),
        }
    }

    for (name, var) in play.visible_variables() {
        println!("{:<10} {:>3} ({})", var.label(name), var.value, var.rank().label());
    }
    println!("achievements: {:?}", play.achievements());

    // --- Graph layout ---
    let layout = layout_story(story, Some("listen"), &LayoutOptions::default());
    println!("\n--- Layout ---");
    for node in &layout.nodes {
        println!(
            "{:<14} level {} at ({:.0}, {:.0}){}",
            node.id,
            node.level,
            node.position.x,
            node.position.y,
            if node.selected { "  <- selected" } else { "" }
        );
    }

    // --- Autoplay coverage ---
    let summary = Autoplayer::new().seed(2026).run_many(story, 200);
    println!("\n--- Autoplay: {} runs ---", summary.runs);
    for (ending, count) in &summary.endings {
        println!("{:<12} {}", ending, count);
    }

    // --- The unfinished draft ---
    let draft = repo
        .get_story("crown-of-destiny")
        .expect("crown-of-destiny is bundled");
    println!("\n--- Lint: {} ---", draft.title);
    for issue in &lint_story(draft).issues {
        println!("{}", issue);
    }
}
