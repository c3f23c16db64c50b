/// Console — interactive shell for talking to the narrator.
///
/// Usage: console [--seed <n>] [--config <path>] [--persona <path>] [--store <dir>]
///
/// Anything that is not a command is sent as a turn. Commands start with ':'.
///
/// Commands:
///   :trust              — score, phase and transition history
///   :journal            — the narrator's journal
///   :dreams             — recorded dreams, most recent first
///   :dream              — dream now
///   :echoes             — the echo vault
///   :fragments          — confessions and testaments
///   :milestone <name> <delta>
///   :ambient [secs]     — ambient line as if idle this long
///   :type <text>        — typing plan for a line
///   :sync <user>        — the sync payload
///   :reset              — clear everything in this namespace
///   :help, :quit
///
/// Set RUST_LOG=narrator_engine=debug for per-turn tracing.

use chrono::{Duration, Utc};
use narrator_engine::core::pipeline::{Engine, TurnOutput};
use narrator_engine::core::store::FileStore;
use narrator_engine::schema::event::EngineEvent;
use narrator_engine::schema::memory::Fragment;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let mut seed: u64 = 42;
    let mut config_path = None;
    let mut persona_path = None;
    let mut store_dir = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--persona" if i + 1 < args.len() => {
                i += 1;
                persona_path = Some(args[i].clone());
            }
            "--store" if i + 1 < args.len() => {
                i += 1;
                store_dir = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut builder = Engine::builder().seed(seed);
    if let Some(ref path) = config_path {
        builder = builder.config_path(path);
    }
    if let Some(ref path) = persona_path {
        builder = builder.persona_path(path);
    }
    if let Some(ref dir) = store_dir {
        match FileStore::open(dir) {
            Ok(store) => builder = builder.store(store),
            Err(e) => {
                eprintln!("ERROR: cannot open store '{}': {}", dir, e);
                std::process::exit(1);
            }
        }
    }
    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Persona: {}", engine.persona().name);
    println!("Seed: {}  Turns so far: {}", seed, engine.turn_count());
    println!("Type ':help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("you> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);

        if !line.starts_with(':') {
            let out = engine.process_turn(line);
            print_turn(&out);
            continue;
        }

        let parts: Vec<&str> = line[1..].split_whitespace().collect();
        let cmd = parts.first().map(|c| c.to_lowercase()).unwrap_or_default();
        match cmd.as_str() {
            "quit" | "exit" | "q" => break,
            "help" | "h" | "?" => print_usage(),
            "trust" => {
                let state = engine.trust_state();
                println!("score {} ({}), peak {}, drops {}", state.score, state.phase.name(), state.peak, state.drop_count);
                for t in &state.history {
                    println!("  {} -> {} at {} ({})", t.from.name(), t.to.name(), t.score, t.at.format("%Y-%m-%d %H:%M:%S"));
                }
            }
            "journal" => {
                for entry in engine.journal() {
                    println!("  [{}] {:?}: {}", entry.at.format("%H:%M:%S"), entry.kind, entry.text);
                }
            }
            "dreams" => {
                for dream in engine.dreams() {
                    println!("  [{}] {} {:?}", dream.emotion.primary.name(), dream.content, dream.symbols);
                }
            }
            "dream" => {
                let dream = engine.dream_at(Utc::now());
                println!("  {}", dream.content);
            }
            "echoes" => {
                for echo in engine.echoes() {
                    println!("  #{} x{} [{}] {}", echo.id, echo.uses, echo.emotion.name(), echo.text);
                }
            }
            "fragments" => {
                println!("Confessions:");
                print_fragments(engine.confessions());
                println!("Testaments:");
                print_fragments(engine.testaments());
            }
            "milestone" => {
                let (Some(name), Some(delta)) = (parts.get(1), parts.get(2).and_then(|d| d.parse().ok())) else {
                    println!("Usage: :milestone <name> <delta>");
                    continue;
                };
                match engine.record_milestone(name, delta) {
                    Some(line) => println!("narrator> {}", line),
                    None => println!("(already recorded)"),
                }
            }
            "ambient" => {
                let secs: i64 = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(120);
                match engine.ambient_line_at(Utc::now() + Duration::seconds(secs)) {
                    Some(line) => println!("narrator> {}", line),
                    None => println!("(nothing yet)"),
                }
            }
            "type" => {
                let text = parts[1..].join(" ");
                let plan = engine.typing_plan(&text);
                println!("  {} keystrokes, {} typos, {} ms", plan.events.len(), plan.typo_count(), plan.total_ms());
            }
            "sync" => {
                let user = parts.get(1).copied().unwrap_or("anonymous");
                println!("  {:?}", engine.sync_payload(user));
            }
            "reset" => {
                engine.reset_all();
                println!("(reset)");
            }
            other => println!("Unknown command ':{}'. Type ':help'.", other),
        }
    }
}

fn print_turn(out: &TurnOutput) {
    println!("narrator> {}", out.response_text);
    let secondary = out
        .emotional_state
        .secondary
        .map(|e| format!("+{}", e.name()))
        .unwrap_or_default();
    println!(
        "  [{}{} {:?} | {} {:?} | trust {} {} | {:?}]",
        out.emotional_state.primary.name(),
        secondary,
        out.emotional_state.intensity,
        out.intent.intent.name(),
        out.intent.confidence,
        out.trust_score,
        out.trust_phase.name(),
        out.source,
    );
    if let Some(label) = &out.fired_narrative_event {
        println!("  beat: {}", label);
    }
    for event in &out.events {
        match event {
            EngineEvent::ConsoleLog { line } => println!("  console: {}", line),
            EngineEvent::FragmentRevealed { kind, id, content } => {
                println!("  revealed {} #{}: {}", kind.name(), id, content)
            }
            EngineEvent::DreamRecorded { content } => println!("  dreamed: {}", content),
            EngineEvent::MemoryEcho { quote, .. } => println!("  echoed: {}", quote),
            EngineEvent::NarrativeTrigger { .. } | EngineEvent::PlainResponse { .. } => {}
        }
    }
}

fn print_fragments(fragments: &[Fragment]) {
    for f in fragments {
        let state = if f.revealed { "open" } else { "sealed" };
        let corrupted = if f.corrupted { " corrupted" } else { "" };
        println!("  #{} [{}{}] depth {} {}", f.id, state, corrupted, f.depth, f.content);
    }
}

fn print_usage() {
    println!("Usage: console [--seed <n>] [--config <path>] [--persona <path>] [--store <dir>]");
    println!();
    println!("Commands:");
    println!("  :trust :journal :dreams :dream :echoes :fragments");
    println!("  :milestone <name> <delta>   :ambient [secs]   :type <text>");
    println!("  :sync <user>   :reset   :help   :quit");
}
