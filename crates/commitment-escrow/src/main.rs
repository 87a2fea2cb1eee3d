//! escrow - drive the commitment escrow engine from the command line
//!
//! usage:
//!   escrow demo                              # lock 1000, claim it, show balances
//!   escrow run scenario.toml --snapshot      # replay a scripted scenario
//!   escrow derive --amount 1000 --recipient bob
//!   escrow --config escrow.toml config       # print effective config

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commitment_escrow::{
    Amount, AttestationVerifier, CommitmentOpening, Engine, EngineConfig, InMemoryLedger,
    NonEmptyProof, Principal, ProofVerifier, Scenario,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "escrow")]
#[command(about = "custodial commitment escrow - lock against a commitment, claim once with a nullifier")]
#[command(version)]
struct Cli {
    /// engine config (toml); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum VerifierKind {
    /// accept any non-empty proof (placeholder)
    NonEmpty,
    /// accept keyed blake3 attestations over the claim inputs
    Attestation,
}

#[derive(Subcommand)]
enum Command {
    /// run the built-in create + claim walkthrough
    Demo,

    /// replay a toml scenario
    Run {
        /// scenario file
        scenario: PathBuf,

        #[arg(long, value_enum, default_value = "non-empty")]
        verifier: VerifierKind,

        /// attestation key (64 hex chars), required with --verifier attestation
        #[arg(long)]
        attestation_key: Option<String>,

        /// print the final engine state as json
        #[arg(long)]
        snapshot: bool,
    },

    /// derive a commitment hash and nullifier from an off-band opening
    Derive {
        /// 32-byte secret as hex (random when omitted)
        #[arg(long)]
        secret: Option<String>,

        #[arg(long)]
        amount: u64,

        /// recipient name or hex principal
        #[arg(long)]
        recipient: Option<String>,
    },

    /// print the effective engine config
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("commitment_escrow=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Demo => run_demo(config),
        Command::Run {
            scenario,
            verifier,
            attestation_key,
            snapshot,
        } => {
            let scenario = Scenario::load(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;
            match verifier {
                VerifierKind::NonEmpty => run_scenario(&scenario, config, NonEmptyProof, snapshot),
                VerifierKind::Attestation => {
                    let key = attestation_key
                        .context("--attestation-key is required with --verifier attestation")?;
                    let key = parse_key(&key)?;
                    run_scenario(&scenario, config, AttestationVerifier::new(key), snapshot)
                }
            }
        }
        Command::Derive {
            secret,
            amount,
            recipient,
        } => run_derive(secret, amount, recipient),
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn run_demo(config: EngineConfig) -> Result<()> {
    let sender = Principal::named("sender");
    let recipient = Principal::named("recipient");

    let mut ledger = InMemoryLedger::new();
    ledger.credit(&sender, Amount::new(5_000))?;
    let engine = Engine::new(config, ledger, NonEmptyProof);

    let opening = CommitmentOpening::random(&mut rand::thread_rng(), Amount::new(1_000), Some(recipient));
    let hash = opening.commit();
    let nullifier = opening.nullifier();

    println!("=== create ===");
    engine.create_transaction(&sender, hash.as_ref(), opening.amount, opening.recipient)?;
    print_balances(&engine, &[("sender", sender), ("recipient", recipient)]);

    println!("\n=== claim with empty proof ===");
    match engine.claim_transaction(&sender, hash.as_ref(), &[], nullifier.as_ref()) {
        Ok(()) => bail!("empty proof was accepted"),
        Err(e) => println!("rejected: {} (code {})", e, e.code()),
    }

    println!("\n=== claim ===");
    engine.claim_transaction(&sender, hash.as_ref(), &[0xAA], nullifier.as_ref())?;
    print_balances(&engine, &[("sender", sender), ("recipient", recipient)]);

    println!("\n=== replay ===");
    match engine.claim_transaction(&sender, hash.as_ref(), &[0xAA], nullifier.as_ref()) {
        Ok(()) => bail!("nullifier was accepted twice"),
        Err(e) => println!("rejected: {} (code {})", e, e.code()),
    }

    Ok(())
}

fn run_scenario<V: ProofVerifier>(
    scenario: &Scenario,
    config: EngineConfig,
    verifier: V,
    snapshot: bool,
) -> Result<()> {
    let engine = scenario.build_engine(config, verifier)?;
    let outcomes = scenario.run(&engine)?;

    let mut mismatches = 0;
    for outcome in &outcomes {
        let marker = if outcome.matches_expectation() { " " } else { "!" };
        match &outcome.result {
            Ok(()) => println!("{} step {:>3} {:<8} ok", marker, outcome.index, outcome.op),
            Err(e) => println!(
                "{} step {:>3} {:<8} {} ({}): {}",
                marker,
                outcome.index,
                outcome.op,
                e.name(),
                e.code(),
                e
            ),
        }
        if !outcome.matches_expectation() {
            mismatches += 1;
            tracing::warn!(
                step = outcome.index,
                expected = outcome.expect.as_deref().unwrap_or("ok"),
                got = outcome.outcome_name(),
                "unexpected outcome"
            );
        }
    }

    if snapshot {
        println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
    }

    if mismatches > 0 {
        bail!("{} of {} steps did not match expectations", mismatches, outcomes.len());
    }
    Ok(())
}

fn run_derive(secret: Option<String>, amount: u64, recipient: Option<String>) -> Result<()> {
    let recipient = recipient
        .map(|r| r.parse::<Principal>())
        .transpose()?;
    let opening = match secret {
        Some(secret) => CommitmentOpening::new(parse_key(&secret)?, Amount::from(amount), recipient),
        None => CommitmentOpening::random(&mut rand::thread_rng(), Amount::from(amount), recipient),
    };

    println!("secret:          {}", hex::encode(opening.secret));
    println!("commitment_hash: {}", opening.commit());
    println!("nullifier:       {}", opening.nullifier());
    Ok(())
}

fn print_balances<V: ProofVerifier>(engine: &Engine<InMemoryLedger, V>, accounts: &[(&str, Principal)]) {
    for (name, account) in accounts {
        println!("{:<10} {}", name, engine.balance_of(account));
    }
    println!("{:<10} {}", "custody", engine.custody_balance());
}

fn parse_key(s: &str) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    hex::decode_to_slice(s.trim().trim_start_matches("0x"), &mut key)
        .context("expected 32 bytes of hex")?;
    Ok(key)
}
