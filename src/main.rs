use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

use liquid_sort::{
    EngineConfig, GameState, GenerationRequest, GenerationService, Level, PourPolicy,
    SearchOutcome, Solver,
};

/// Generate and solve liquid-sorting levels
#[derive(Parser)]
#[command(name = "liquid-sort", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON file with engine settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate validated, mutually distinct levels
    Generate {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
        #[arg(short, long, default_value_t = 2)]
        difficulty: u32,
        #[arg(long, default_value_t = 6)]
        containers: usize,
        #[arg(long, default_value_t = 4)]
        colors: usize,
        #[arg(long)]
        capacity: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Id of the first level
        #[arg(long, default_value_t = 1)]
        start_id: u32,
        /// Print levels as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search for a solution, e.g. `solve AABB BBAA ....`
    Solve {
        #[arg(required = true)]
        containers: Vec<String>,
        /// Allow pours that only move part of a run
        #[arg(long)]
        capped: bool,
        #[arg(long)]
        max_states: Option<usize>,
        #[arg(long)]
        max_expansions: Option<usize>,
    },
}

fn init_log(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} {t} {m}{n}")))
        .build();
    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(level)))
                .build("stderr", Box::new(stderr)),
        )
        .build(Root::builder().appender("stderr").build(level));
    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Logging disabled: {e}");
            }
        }
        Err(e) => eprintln!("Logging disabled: {e}"),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    EngineConfig::from_json_str(&text).map_err(|e| format!("bad config {}: {e}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_log(cli.verbose);

    let mut config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Generate {
            count,
            difficulty,
            containers,
            colors,
            capacity,
            seed,
            start_id,
            json,
        } => {
            if let Some(capacity) = capacity {
                config.generator.container_capacity = capacity;
            }
            if seed.is_some() {
                config.generator.seed = seed;
            }
            let service = GenerationService::new(&config);
            for level_id in start_id..start_id + count {
                let request = GenerationRequest {
                    level_id,
                    difficulty,
                    container_count: containers,
                    color_count: colors,
                };
                let level = match service.generate_next_level(request) {
                    Ok(level) => level,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        return ExitCode::FAILURE;
                    }
                };
                if json {
                    match serde_json::to_string(&level) {
                        Ok(text) => println!("{text}"),
                        Err(e) => {
                            eprintln!("Error: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("#{} {}", level.id, level.get_text_representation());
                    println!("   {}", level.signature);
                }
            }
        }
        Commands::Solve {
            containers,
            capped,
            max_states,
            max_expansions,
        } => {
            let level = match Level::new_from_repr(0, 0, &containers.join(" ")) {
                Ok(level) => level,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            if capped {
                config.search.policy = PourPolicy::Capped;
            }
            if let Some(max_states) = max_states {
                config.search.max_states = max_states;
            }
            if let Some(max_expansions) = max_expansions {
                config.search.max_expansions = max_expansions;
            }
            print_solution(&level, Solver::new(config.search).solve(&level.initial_containers));
        }
    }
    ExitCode::SUCCESS
}

fn print_solution(level: &Level, outcome: SearchOutcome) {
    match outcome {
        SearchOutcome::Solved { moves, states_visited, .. } => {
            println!("Solvable in {} moves ({states_visited} states).", moves.len());
            let mut state = GameState::from_level(level);
            for (step, mv) in moves.iter().enumerate() {
                println!(
                    "{:>3}. {} -> {}  {} x{}",
                    step + 1,
                    mv.from_container,
                    mv.to_container,
                    mv.liquid_color,
                    mv.volume
                );
                // Capped solutions may not replay through the all-or-nothing pour rules.
                if let Ok(next) = state.execute_pour(mv.from_container, mv.to_container) {
                    state = next;
                }
            }
            if state.is_completed() {
                println!("     {}", state.get_text_representation());
            }
        }
        SearchOutcome::Unsolvable { states_visited } => {
            println!("Not solvable: all {states_visited} reachable states checked.");
        }
        SearchOutcome::BudgetExceeded { states_visited, expansions } => {
            println!("Unknown: gave up after {states_visited} states and {expansions} expansions.");
        }
        SearchOutcome::Cancelled => println!("Cancelled."),
    }
}
