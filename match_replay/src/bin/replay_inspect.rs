use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use match_kernel::domain::{Action, Actor, Cell, GameState};
use match_kernel::games::tictactoe::{GAME_KEY, GAME_VERSION};
use match_kernel::registry::GameRegistry;

use match_replay::catalog::ListQuery;
use match_replay::config::ReplayConfig;
use match_replay::log_store::MatchLogStore;
use match_replay::model::{MatchId, MatchStatus};
use match_replay::replay::{step_from_signed, InvalidActionPolicy, SequencePolicy};
use match_replay::schema_export::export_schemas;
use match_replay::service::ReplayService;

#[derive(Parser, Debug)]
#[command(name = "replay-inspect", about = "Inspect and replay persisted matches")]
struct Args {
    /// Match log directory (overrides REPLAY_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Turn index handling: strict | lenient
    #[arg(long)]
    sequence: Option<SequencePolicy>,

    /// Malformed action handling: skip | divergent
    #[arg(long)]
    invalid_actions: Option<InvalidActionPolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List matches, newest first
    List {
        #[arg(long)]
        game: Option<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print the replay view of a match as JSON
    Show { match_id: MatchId },
    /// Render the board after a step (-1 = before the first turn)
    Step {
        match_id: MatchId,
        #[arg(allow_negative_numbers = true)]
        step: i64,
    },
    /// Print every step with its state hash
    Timeline { match_id: MatchId },
    /// Compare stored snapshots against action replay
    Audit { match_id: MatchId },
    /// Write a finished five-turn tic-tac-toe match into the data directory
    Demo {
        #[arg(long, default_value = "demo")]
        seed: String,
    },
    /// Write JSON-Schema files for every registered game
    Schemas {
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            println!("not found");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the requested match does not exist.
fn run(args: Args) -> Result<bool> {
    let mut config = ReplayConfig::from_env()?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(policy) = args.sequence {
        config.sequence = policy;
    }
    if let Some(policy) = args.invalid_actions {
        config.invalid_actions = policy;
    }

    if let Command::Schemas { out } = &args.command {
        let written = export_schemas(&GameRegistry::with_builtin(), out)
            .with_context(|| format!("exporting schemas to {}", out.display()))?;
        for path in &written {
            println!("{}", path.display());
        }
        return Ok(true);
    }

    let store = MatchLogStore::open(&config.data_dir)
        .with_context(|| format!("opening match logs in {}", config.data_dir.display()))?;
    let service = ReplayService::new(store, GameRegistry::with_builtin(), config.options());
    match args.command {
        Command::List {
            game,
            version,
            limit,
        } => {
            let query = ListQuery {
                game_key: game,
                game_version: version,
                limit: Some(limit.unwrap_or(config.list_limit)),
            };
            for m in service.list_matches(&query)? {
                println!(
                    "{:>6}  {:<9} {}/{}  seed={}  {}",
                    m.id,
                    m.status.as_str(),
                    m.game_key,
                    m.game_version,
                    m.seed,
                    m.created_at.to_rfc3339()
                );
            }
            Ok(true)
        }
        Command::Show { match_id } => match service.get_replay(match_id)? {
            Some(view) => {
                println!("{}", serde_json::to_string_pretty(&view)?);
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Step { match_id, step } => match service.state_at(match_id, step_from_signed(step))? {
            Some(r) => {
                print!("{}", render_board(&r.state));
                println!("step:      {}", r.step.map_or(-1, |s| s as i64));
                println!("to move:   {}", r.player);
                println!("winner:    {}", r.winner.map_or("-".to_string(), |w| w.to_string()));
                if r.divergent {
                    println!("divergent: yes");
                }
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Timeline { match_id } => match service.timeline(match_id)? {
            Some(timeline) => {
                println!("  -  initial  {}", short(&timeline.initial_hash));
                for (i, step) in timeline.steps.iter().enumerate() {
                    println!(
                        "{:>3}  idx={:<3} {:<7} {}  {}",
                        i,
                        step.idx,
                        step.actor.as_str(),
                        short(&step.hash),
                        serde_json::to_string(&step.outcome)?
                    );
                }
                println!("fingerprint {}", timeline.fingerprint());
                if timeline.divergent {
                    println!("divergent");
                }
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Audit { match_id } => match service.audit(match_id)? {
            Some(mismatches) if mismatches.is_empty() => {
                println!("all snapshots agree with action replay");
                Ok(true)
            }
            Some(mismatches) => {
                println!("{}", serde_json::to_string_pretty(&mismatches)?);
                Err(anyhow!("{} snapshot(s) disagree with action replay", mismatches.len()))
            }
            None => Ok(false),
        },
        Command::Demo { seed } => {
            let match_id = write_demo(service.into_catalog(), &seed)?;
            println!("wrote demo match {} to {}", match_id, config.data_dir.display());
            Ok(true)
        }
        // exported above, before the store is opened
        Command::Schemas { .. } => Ok(true),
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

fn render_board(state: &GameState) -> String {
    let mut out = String::new();
    for (i, row) in state.board.rows().iter().enumerate() {
        if i > 0 {
            out.push_str(&vec!["---"; row.len()].join("+"));
            out.push('\n');
        }
        let cells: Vec<String> = row.iter().map(|m| format!(" {} ", m.as_str())).collect();
        out.push_str(&cells.join("|"));
        out.push('\n');
    }
    out
}

/// Reference game: agentA takes the top row on the fifth turn.
fn write_demo(mut store: MatchLogStore, seed: &str) -> Result<MatchId> {
    let registry = GameRegistry::with_builtin();
    let rules = registry
        .lookup(GAME_KEY, GAME_VERSION)
        .ok_or_else(|| anyhow!("{}/{} is not registered", GAME_KEY, GAME_VERSION))?;

    let record = store.create_match(seed, GAME_KEY, GAME_VERSION)?;
    let mut state = rules.initial_state(seed);
    store.append_snapshot(record.id, None, &serde_json::to_value(&state)?)?;

    let moves = [(0, 0), (1, 1), (0, 1), (2, 2), (0, 2)];
    let mut actor = Actor::AgentA;
    for (idx, (row, col)) in moves.into_iter().enumerate() {
        let action = Action::Move(Cell::new(row, col));
        let turn = store.append_turn(record.id, idx as i64, actor, &serde_json::to_string(&action)?)?;
        state = rules.apply_action(&state, actor, &action)?.state;
        store.append_snapshot(record.id, Some(turn.id), &serde_json::to_value(&state)?)?;
        actor = actor.opponent();
    }

    store.mark_status(record.id, MatchStatus::Finished)?;
    info!(match_id = record.id, winner = ?state.winner, "demo match written");
    Ok(record.id)
}
