//! Match Simulator CLI Tool
//!
//! Drives complete match scenarios against in-memory storage and prints the
//! results as JSON.
//!
//! Usage:
//!   cargo run --bin match-sim -- --help
//!   cargo run --bin match-sim single --winner-score 3 --loser-score 1
//!   cargo run --bin match-sim double --targeted
//!   cargo run --bin match-sim league --players 6 --rounds 4

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use versus::config::{validate_config, AppConfig};
use versus::lifecycle::CreatedMatch;
use versus::metrics::MetricsCollector;
use versus::{
    AcceptSlot, CreateDoubleMatch, CreateSingleMatch, InMemoryStorage, MatchManager, Selector,
    SubmitScore, User,
};

#[derive(Parser)]
#[command(name = "match-sim")]
#[command(about = "Run match lifecycle scenarios for the versus service against in-memory storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Elo K-factor
    #[arg(long, default_value = "32.0")]
    k_factor: f64,

    /// Rating assigned to newly registered users
    #[arg(long, default_value = "1000.0")]
    initial_rating: f64,

    /// Reject targeted selectors naming unknown users
    #[arg(long)]
    reject_unknown_targets: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one 1v1 game from creation to settlement
    Single {
        /// Invite the rival by id instead of leaving the slot open
        #[arg(short, long)]
        targeted: bool,
        #[arg(long, default_value = "1")]
        winner_score: i64,
        #[arg(long, default_value = "0")]
        loser_score: i64,
    },
    /// Play one 2v2 game from creation to settlement
    Double {
        /// Invite the partner and rivals by id instead of leaving slots open
        #[arg(short, long)]
        targeted: bool,
        #[arg(long, default_value = "1")]
        winner_score: i64,
        #[arg(long, default_value = "0")]
        loser_score: i64,
    },
    /// Play rotating 1v1 rounds among a group and print the leaderboard
    League {
        #[arg(short, long, default_value = "4")]
        players: usize,
        #[arg(short, long, default_value = "3")]
        rounds: usize,
    },
}

fn build_manager(cli: &Cli) -> Result<MatchManager> {
    let mut config = AppConfig::default();
    config.rating.k_factor = cli.k_factor;
    config.rating.initial_rating = cli.initial_rating;
    config.matchmaking.reject_unknown_targets = cli.reject_unknown_targets;
    validate_config(&config)?;

    let metrics = Arc::new(MetricsCollector::new()?);
    Ok(MatchManager::from_config(
        Arc::new(InMemoryStorage::new()),
        &config,
        metrics,
    )?)
}

fn register_players(manager: &MatchManager, count: usize) -> Result<Vec<User>> {
    (0..count)
        .map(|i| {
            let name = format!("player{}", i + 1);
            let email = format!("{}@sim.local", name);
            manager
                .users()
                .register(&name, &email)
                .with_context(|| format!("Failed to register {}", name))
        })
        .collect()
}

fn selector_for(user: &User, targeted: bool) -> Selector {
    if targeted {
        Selector::User(user.id)
    } else {
        Selector::Anyone
    }
}

/// Fill every vacant slot with the given players, in slot order
fn fill_slots(
    manager: &MatchManager,
    created: &CreatedMatch,
    players: &[User],
) -> Result<Vec<serde_json::Value>> {
    let slots: Vec<_> = created.vacant_slots().cloned().collect();
    if slots.len() != players.len() {
        bail!(
            "Have {} players for {} vacant slots",
            players.len(),
            slots.len()
        );
    }

    slots
        .iter()
        .zip(players)
        .map(|(slot, player)| {
            // targeted slots must go to the user they name
            let acting = slot
                .user_id
                .and_then(|id| players.iter().find(|p| p.id == id))
                .unwrap_or(player);
            let outcome = manager.accept_slot(AcceptSlot {
                slot_id: slot.id,
                acting_user_id: acting.id,
            })?;
            Ok(serde_json::to_value(&outcome)?)
        })
        .collect()
}

/// Settle a game with the creator's team as the winner
fn settle(
    manager: &MatchManager,
    created: &CreatedMatch,
    winner_score: i64,
    loser_score: i64,
) -> Result<serde_json::Value> {
    let [home, away] = created.teams.as_slice() else {
        bail!("Game {} does not have two teams", created.game.id);
    };

    let outcome = manager.submit_score(SubmitScore {
        game_id: created.game.id,
        team_a_id: home.team.id,
        team_a_score: winner_score,
        team_b_id: away.team.id,
        team_b_score: loser_score,
    })?;
    Ok(serde_json::to_value(&outcome)?)
}

fn run_single(
    manager: &MatchManager,
    targeted: bool,
    winner_score: i64,
    loser_score: i64,
) -> Result<serde_json::Value> {
    let players = register_players(manager, 2)?;
    let created = manager.create_single_match(CreateSingleMatch {
        creator_user_id: players[0].id,
        rival: selector_for(&players[1], targeted),
    })?;

    let acceptances = fill_slots(manager, &created, &players[1..])?;
    let settlement = settle(manager, &created, winner_score, loser_score)?;

    Ok(json!({
        "created": created,
        "acceptances": acceptances,
        "settlement": settlement,
        "view": manager.game_view(created.game.id)?,
    }))
}

fn run_double(
    manager: &MatchManager,
    targeted: bool,
    winner_score: i64,
    loser_score: i64,
) -> Result<serde_json::Value> {
    let players = register_players(manager, 4)?;
    let created = manager.create_double_match(CreateDoubleMatch {
        creator_user_id: players[0].id,
        partner: selector_for(&players[1], targeted),
        rivals: vec![
            selector_for(&players[2], targeted),
            selector_for(&players[3], targeted),
        ],
    })?;

    let acceptances = fill_slots(manager, &created, &players[1..])?;
    let settlement = settle(manager, &created, winner_score, loser_score)?;

    Ok(json!({
        "created": created,
        "acceptances": acceptances,
        "settlement": settlement,
        "view": manager.game_view(created.game.id)?,
    }))
}

fn run_league(manager: &MatchManager, players: usize, rounds: usize) -> Result<serde_json::Value> {
    if players < 2 {
        bail!("A league needs at least 2 players");
    }

    let users = register_players(manager, players)?;
    let mut games = 0;

    for round in 0..rounds {
        for i in 0..players / 2 {
            // rotate pairings each round; the lower seat wins on even rounds
            let a = &users[(i + round) % players];
            let b = &users[(players - 1 - i + round) % players];
            if a.id == b.id {
                continue;
            }
            let (creator, rival) = if round % 2 == 0 { (a, b) } else { (b, a) };

            let created = manager.create_single_match(CreateSingleMatch {
                creator_user_id: creator.id,
                rival: Selector::User(rival.id),
            })?;
            fill_slots(manager, &created, std::slice::from_ref(rival))?;
            settle(manager, &created, 2 + (round % 3) as i64, 1)?;
            games += 1;
        }
    }

    Ok(json!({
        "games_played": games,
        "leaderboard": manager.users().leaderboard(players)?,
        "stats": manager.stats()?,
    }))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let manager = build_manager(&cli)?;

    let report = match cli.command {
        Commands::Single {
            targeted,
            winner_score,
            loser_score,
        } => run_single(&manager, targeted, winner_score, loser_score)?,
        Commands::Double {
            targeted,
            winner_score,
            loser_score,
        } => run_double(&manager, targeted, winner_score, loser_score)?,
        Commands::League { players, rounds } => run_league(&manager, players, rounds)?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
