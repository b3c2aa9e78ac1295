//! Credit ledger.
//!
//! One credit is consumed per successful generation. A reservation is taken
//! when a job is created (the hold decrements the balance), then either
//! consumed on completion or released on failure/deletion. Consume and
//! release are idempotent per job ID via a uniquely-keyed entries table, so
//! settlement can share a transaction with the job's terminal status write
//! and a crash or double call can never double-spend or silently lose
//! credits.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

/// Current balance for an owner (person or team). Missing owners have zero.
pub fn balance(conn: &Connection, owner_id: &str) -> Result<i64> {
    let credits: Option<i64> = conn
        .query_row(
            "SELECT credits FROM credit_balances WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read credit balance")?;
    Ok(credits.unwrap_or(0))
}

/// Add credits to an owner's balance, creating the row if needed.
pub fn grant(conn: &Connection, owner_id: &str, amount: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO credit_balances (owner_id, credits) VALUES (?1, ?2)
         ON CONFLICT(owner_id) DO UPDATE SET credits = credits + ?2",
        params![owner_id, amount],
    )
    .context("Failed to grant credits")?;
    Ok(())
}

/// Reserve `amount` credits for a job. Returns false when the balance is
/// insufficient. Re-reserving for the same job while the hold is live is a
/// no-op returning true; a job whose reservation was already released cannot
/// be re-reserved and returns false.
pub fn reserve(conn: &Connection, person_id: &str, job_id: &str, amount: i64) -> Result<bool> {
    if entry_exists(conn, job_id, "reserve")? {
        // Idempotent only for a live hold. The released case places no new
        // hold, so claiming success here would desync balance and ledger.
        if entry_exists(conn, job_id, "release")? {
            warn!(job_id, "reserve called for an already-released reservation");
            return Ok(false);
        }
        return Ok(true);
    }

    let rows = conn
        .execute(
            "UPDATE credit_balances SET credits = credits - ?1
             WHERE owner_id = ?2 AND credits >= ?1",
            params![amount, person_id],
        )
        .context("Failed to place credit hold")?;
    if rows == 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO credit_entries (job_id, person_id, kind, amount)
         VALUES (?1, ?2, 'reserve', ?3)",
        params![job_id, person_id, amount],
    )
    .context("Failed to record credit reservation")?;
    Ok(true)
}

/// Consume the reservation for a job. The hold already decremented the
/// balance, so this only finalizes the entry. Idempotent per job ID; a job
/// with no reservation, or one already released, consumes nothing.
pub fn consume(conn: &Connection, job_id: &str) -> Result<()> {
    let Some((person_id, amount)) = reservation(conn, job_id)? else {
        warn!(job_id, "consume called for a job with no credit reservation");
        return Ok(());
    };
    if entry_exists(conn, job_id, "release")? {
        warn!(job_id, "consume called for an already-released reservation");
        return Ok(());
    }

    conn.execute(
        "INSERT OR IGNORE INTO credit_entries (job_id, person_id, kind, amount)
         VALUES (?1, ?2, 'consume', ?3)",
        params![job_id, person_id, amount],
    )
    .context("Failed to record credit consumption")?;
    Ok(())
}

/// Release the reservation for a job, refunding the hold. Idempotent per job
/// ID; consumed reservations are not refundable.
pub fn release(conn: &Connection, job_id: &str) -> Result<()> {
    let Some((person_id, amount)) = reservation(conn, job_id)? else {
        return Ok(());
    };
    if entry_exists(conn, job_id, "consume")? {
        return Ok(());
    }

    let rows = conn
        .execute(
            "INSERT OR IGNORE INTO credit_entries (job_id, person_id, kind, amount)
             VALUES (?1, ?2, 'release', ?3)",
            params![job_id, person_id, amount],
        )
        .context("Failed to record credit release")?;

    // Refund only on the first release.
    if rows == 1 {
        grant(conn, &person_id, amount)?;
    }
    Ok(())
}

/// Move credits between two balances (e.g. team pool to person). Returns
/// false when the source balance is insufficient.
pub fn transfer(conn: &Connection, from_owner: &str, to_owner: &str, amount: i64) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE credit_balances SET credits = credits - ?1
             WHERE owner_id = ?2 AND credits >= ?1",
            params![amount, from_owner],
        )
        .context("Failed to debit transfer source")?;
    if rows == 0 {
        return Ok(false);
    }
    grant(conn, to_owner, amount)?;
    Ok(true)
}

fn entry_exists(conn: &Connection, job_id: &str, kind: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM credit_entries WHERE job_id = ?1 AND kind = ?2",
            params![job_id, kind],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to check credit entry")?;
    Ok(found.is_some())
}

fn reservation(conn: &Connection, job_id: &str) -> Result<Option<(String, i64)>> {
    conn.query_row(
        "SELECT person_id, amount FROM credit_entries
         WHERE job_id = ?1 AND kind = 'reserve'",
        params![job_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .context("Failed to load credit reservation")
}
