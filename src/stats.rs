use rusqlite::{Connection, OptionalExtension};

use crate::store::StoreError;

/// Per-owner usage counters, bumped by the tool endpoints. The row is
/// created lazily on first increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub calculator_uses: i64,
    pub wheel_spins: i64,
    pub divider_uses: i64,
    pub stopwatch_starts: i64,
    pub stopwatch_flags: i64,
    pub stopwatch_total_ms: i64,
    pub countdown_starts: i64,
    pub countdown_total_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    CalculatorUses,
    WheelSpins,
    DividerUses,
    StopwatchStarts,
    StopwatchFlags,
    CountdownStarts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Stopwatch,
    Countdown,
}

impl TimerKind {
    pub fn parse(s: &str) -> Option<TimerKind> {
        match s {
            "stopwatch" => Some(TimerKind::Stopwatch),
            "countdown" => Some(TimerKind::Countdown),
            _ => None,
        }
    }
}

pub fn increment(conn: &Connection, owner_id: &str, counter: Counter) -> Result<(), StoreError> {
    // Static SQL per counter; column names never come from input.
    let sql = match counter {
        Counter::CalculatorUses => {
            "INSERT INTO user_stats(owner_id, calculator_uses) VALUES(?, 1)
             ON CONFLICT(owner_id) DO UPDATE SET calculator_uses = calculator_uses + 1"
        }
        Counter::WheelSpins => {
            "INSERT INTO user_stats(owner_id, wheel_spins) VALUES(?, 1)
             ON CONFLICT(owner_id) DO UPDATE SET wheel_spins = wheel_spins + 1"
        }
        Counter::DividerUses => {
            "INSERT INTO user_stats(owner_id, divider_uses) VALUES(?, 1)
             ON CONFLICT(owner_id) DO UPDATE SET divider_uses = divider_uses + 1"
        }
        Counter::StopwatchStarts => {
            "INSERT INTO user_stats(owner_id, stopwatch_starts) VALUES(?, 1)
             ON CONFLICT(owner_id) DO UPDATE SET stopwatch_starts = stopwatch_starts + 1"
        }
        Counter::StopwatchFlags => {
            "INSERT INTO user_stats(owner_id, stopwatch_flags) VALUES(?, 1)
             ON CONFLICT(owner_id) DO UPDATE SET stopwatch_flags = stopwatch_flags + 1"
        }
        Counter::CountdownStarts => {
            "INSERT INTO user_stats(owner_id, countdown_starts) VALUES(?, 1)
             ON CONFLICT(owner_id) DO UPDATE SET countdown_starts = countdown_starts + 1"
        }
    };
    conn.execute(sql, [owner_id])?;
    Ok(())
}

/// Add a finished timer run to the owner's accumulated total. Zero or
/// negative elapsed values are ignored.
pub fn add_elapsed(
    conn: &Connection,
    owner_id: &str,
    kind: TimerKind,
    elapsed_ms: i64,
) -> Result<(), StoreError> {
    if elapsed_ms <= 0 {
        return Ok(());
    }
    let sql = match kind {
        TimerKind::Stopwatch => {
            "INSERT INTO user_stats(owner_id, stopwatch_total_ms) VALUES(?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET stopwatch_total_ms = stopwatch_total_ms + ?2"
        }
        TimerKind::Countdown => {
            "INSERT INTO user_stats(owner_id, countdown_total_ms) VALUES(?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET countdown_total_ms = countdown_total_ms + ?2"
        }
    };
    conn.execute(sql, (owner_id, elapsed_ms))?;
    Ok(())
}

/// All eight counters for an owner; zeros before the first increment.
pub fn get(conn: &Connection, owner_id: &str) -> Result<UserStats, StoreError> {
    let row = conn
        .query_row(
            "SELECT calculator_uses, wheel_spins, divider_uses,
                    stopwatch_starts, stopwatch_flags, stopwatch_total_ms,
                    countdown_starts, countdown_total_ms
             FROM user_stats WHERE owner_id = ?",
            [owner_id],
            |row| {
                Ok(UserStats {
                    calculator_uses: row.get(0)?,
                    wheel_spins: row.get(1)?,
                    divider_uses: row.get(2)?,
                    stopwatch_starts: row.get(3)?,
                    stopwatch_flags: row.get(4)?,
                    stopwatch_total_ms: row.get(5)?,
                    countdown_starts: row.get(6)?,
                    countdown_total_ms: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(row.unwrap_or_default())
}
