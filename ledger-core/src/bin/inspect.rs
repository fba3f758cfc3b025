//! Offline verifier for exported ledger snapshots
//!
//! Usage: `ledger-inspect <snapshot.json>`

use anyhow::Context;
use ledger_core::{ChainSnapshot, TransactionType};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: ledger-inspect <snapshot.json>")?;

    let content = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let snapshot: ChainSnapshot =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path))?;

    snapshot.verify().context("snapshot failed verification")?;

    let votes = snapshot
        .iter()
        .filter(|block| block.transaction.tx_type == TransactionType::VoteCast)
        .count();
    let petitions = snapshot
        .iter()
        .filter(|block| block.transaction.tx_type == TransactionType::PetitionCreated)
        .count();

    tracing::info!(
        blocks = snapshot.len(),
        petitions,
        votes,
        tail = %snapshot.tail().map(|b| b.hash.as_str()).unwrap_or_default(),
        "Snapshot verified"
    );

    Ok(())
}
