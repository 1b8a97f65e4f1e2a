use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campus_economics::{AccountId, ActionOutcome, FixedPointAmount, LedgerAction, TrackId};
use campus_wallet_core::{CampusClient, ClientConfig, InMemoryLedger, LedgerService, MemoryLedgerConfig};

#[derive(Parser)]
#[command(name = "campus-cli")]
#[command(about = "Campus token economy client", long_about = None)]
struct Cli {
    /// Config file; defaults to ./campus.{toml,yaml,json} when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price a swap at the configured rate
    Quote {
        #[command(subcommand)]
        side: QuoteCommand,
    },

    /// Print the effective configuration
    Config,

    /// Run a scripted session against an in-memory ledger
    Simulate {
        /// Confirmation delay of the in-memory ledger
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
    },
}

#[derive(Subcommand)]
enum QuoteCommand {
    /// Tokens received for a currency amount
    Buy { amount: String },

    /// Currency received for a token amount
    Sell { amount: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Quote { side } => {
            let rate = config.exchange_rate()?;
            match side {
                QuoteCommand::Buy { amount } => {
                    let paid = FixedPointAmount::parse(&amount, rate.currency.scale)?;
                    let tokens = rate.quote_buy(paid)?;
                    println!("{} {} -> {} {}", paid.format(), rate.currency.symbol, tokens.format(), rate.token.symbol);
                }
                QuoteCommand::Sell { amount } => {
                    let sold = FixedPointAmount::parse(&amount, rate.token.scale)?;
                    let proceeds = rate.quote_sell(sold)?;
                    println!("{} {} -> {} {}", sold.format(), rate.token.symbol, proceeds.format(), rate.currency.symbol);
                }
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate { delay_ms } => {
            let report = simulate(config, Duration::from_millis(delay_ms)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn amount(literal: &str, spec: &campus_economics::AssetSpec) -> Result<FixedPointAmount> {
    Ok(FixedPointAmount::parse(literal, spec.scale)?)
}

/// Buy and sell tokens, stake, accrue and claim yield, publish and purchase a course.
async fn simulate(config: ClientConfig, delay: Duration) -> Result<serde_json::Value> {
    let economics = campus_economics::integration::CampusEconomics::new(config.economics_config()?)?;
    let ledger = InMemoryLedger::with_state(
        economics,
        MemoryLedgerConfig {
            confirmation_delay: delay,
            read_lag: Duration::ZERO,
        },
    );
    let shared: Arc<dyn LedgerService> = Arc::new(ledger.clone());

    let operator = config.operator();
    let alice = AccountId::new("alice");
    let bob = AccountId::new("bob");
    let currency = config.exchange.currency.spec()?;
    let token = config.exchange.token.spec()?;
    let track = config
        .tracks
        .first()
        .ok_or_else(|| anyhow!("no staking tracks configured"))?;
    let track_id = TrackId::new(&track.id);
    let track_asset = track.asset.spec()?;
    let pool_id = AccountId::new(&track.pool);
    let gate_id = AccountId::new(&config.identities.course_gate);
    let exchange_id = AccountId::new(&config.identities.exchange);

    // Operator funds the exchange
    ledger.credit(&operator, &currency.id, amount("10", &currency)?)?;
    ledger.apply_now(&operator, &LedgerAction::AddCurrencyReserve { amount: amount("10", &currency)? })?;
    ledger.apply_now(&operator, &LedgerAction::MintTokenReserve { amount: amount("1000000", &token)? })?;
    ledger.credit(&alice, &currency.id, amount("2", &currency)?)?;
    ledger.credit(&alice, &track_asset.id, amount("1000", &track_asset)?)?;
    info!(block = ledger.block_height(), "ledger seeded");

    let alice_client = CampusClient::new(shared.clone(), alice.clone(), config.clone())?;
    let bob_client = CampusClient::new(shared.clone(), bob.clone(), config.clone())?;
    let operator_client = CampusClient::new(shared.clone(), operator.clone(), config.clone())?;
    let capability = operator_client
        .operator_capability()
        .cloned()
        .ok_or_else(|| anyhow!("operator session has no capability"))?;

    alice_client.buy(amount("1", &currency)?).await?;
    alice_client
        .approve(&exchange_id, &token.id, amount("1000", &token)?)
        .await?;
    alice_client.sell(amount("1000", &token)?).await?;

    alice_client
        .approve(&pool_id, &track_asset.id, amount("500", &track_asset)?)
        .await?;
    alice_client.stake(&track_id, amount("500", &track_asset)?).await?;
    operator_client
        .accrue_yield(&capability, &track_id, amount("10", &track_asset)?)
        .await?;
    let claimed = alice_client.claim_rewards(&track_id).await?;

    let created = bob_client
        .create_course("Intro to Rust", "Ownership, borrowing and lifetimes", amount("100", &token)?)
        .await?;
    let course_id = match created.outcome {
        ActionOutcome::CourseCreated(record) => record.id,
        other => return Err(anyhow!("unexpected outcome {:?}", other)),
    };
    alice_client.approve(&gate_id, &token.id, amount("100", &token)?).await?;
    alice_client.purchase(&course_id).await?;

    let state = ledger.snapshot();
    state.verify_invariants()?;
    let balance = |account: &AccountId, spec: &campus_economics::AssetSpec| {
        FixedPointAmount::new(state.balance(account, &spec.id), spec.scale).format()
    };

    Ok(serde_json::json!({
        "block": ledger.block_height(),
        "state_hash": state.state_hash()?,
        "claim": claimed.outcome,
        "alice": {
            "profile": alice_client.session().profile(),
            (currency.symbol.clone()): balance(&alice, &currency),
            (token.symbol.clone()): balance(&alice, &token),
            (track_asset.symbol.clone()): balance(&alice, &track_asset),
            "stake": state.pool(&track_id)?.record(&alice),
        },
        "bob": {
            (token.symbol.clone()): balance(&bob, &token),
        },
        "reserves": state.reserves(),
        "courses": state.catalog.all_course_ids(),
    }))
}
