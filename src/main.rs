use color_eyre::eyre::{
    Result,
    eyre,
};
use rungs_client::{
    Address,
    AdvanceResult,
    Difficulty,
    GameSession,
    SessionConfig,
    SessionHandles,
    ledger::in_memory::{
        InMemoryLedger,
        ScriptedPrompt,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tracing::info;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: rungs-client [--tier easy|medium|hard|expert] [--stages <n>] [--wager <amount>]\n\
         \n\
         Plays one round against the in-memory ledger simulation and prints\n\
         every state transition. A development aid; real deployments embed\n\
         the library behind their own transport."
    );
    std::process::exit(0);
}

struct DemoArgs {
    tier: Difficulty,
    stages: u32,
    wager: u64,
}

fn parse_cli_args() -> Result<DemoArgs> {
    let mut args = std::env::args().skip(1);
    let mut tier = Difficulty::Easy;
    let mut stages = 3u32;
    let mut wager = 2u64;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tier" => {
                let raw = args.next().ok_or_else(|| eyre!("--tier requires a value"))?;
                tier = match raw.as_str() {
                    "easy" => Difficulty::Easy,
                    "medium" => Difficulty::Medium,
                    "hard" => Difficulty::Hard,
                    "expert" => Difficulty::Expert,
                    other => return Err(eyre!("Unknown tier: {other}")),
                };
            }
            "--stages" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--stages requires a number"))?;
                stages = raw.parse().map_err(|_| eyre!("Invalid stage count: {raw}"))?;
            }
            "--wager" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--wager requires an amount"))?;
                wager = raw.parse().map_err(|_| eyre!("Invalid wager: {raw}"))?;
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    Ok(DemoArgs {
        tier,
        stages,
        wager,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    rungs_client::init_tracing();
    let args = parse_cli_args()?;

    let ledger = InMemoryLedger::new();
    let account = ledger.funded_account(1_000);
    let contract = Address([0xFE; 32]);
    let handles = SessionHandles {
        reader: Arc::new(ledger.clone()),
        receipts: Arc::new(ledger.clone()),
        strategies: vec![Box::new(ledger.strategy_for(account))],
        prompt: Arc::new(ScriptedPrompt::default()),
    };
    let config = SessionConfig {
        submit_cooldown_ms: 250,
        readiness_interval_ms: 200,
        ..SessionConfig::default()
    };

    let mut session = GameSession::attach(account, contract, handles, config).await?;
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "round event");
        }
    });

    let start = session.start_round(args.tier, args.wager).await?;
    info!(round = %start.round_id, tx = %start.tx, "wager accepted");

    let mut waited = 0;
    while !session.is_randomness_ready() {
        if waited > 100 {
            return Err(eyre!("randomness provider never became ready"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += 1;
    }

    for _ in 0..args.stages {
        match session.advance().await?.result {
            AdvanceResult::Advanced {
                stage,
                multiplier_bps,
            } => {
                info!(stage, multiplier_bps, "advanced");
            }
            AdvanceResult::RoundOver { failed } => {
                info!(failed, "round over mid-climb");
                return Ok(());
            }
        }
    }

    let outcome = session.cash_out().await?;
    info!(tx = %outcome.tx, result = ?outcome.result, "cashed out");
    Ok(())
}
