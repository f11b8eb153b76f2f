//! Checkpoint command implementation.

use super::open_env;
use crate::error::CliError;
use std::path::Path;

/// Runs the checkpoint command.
pub fn run(home: &Path) -> Result<(), CliError> {
    let env = open_env(home)?;
    env.txn_checkpoint()?;
    let stat = env.txn_stat()?;
    println!(
        "checkpoint complete; last transaction id {}",
        stat.last_txnid.map_or(0, |id| id.as_u64())
    );
    env.close(0)?;
    Ok(())
}
