pub mod migrations;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::analytics::MonthlyCohort;
use crate::store::migrations::BASE_MIGRATION;
use crate::window::DateWindow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRetrievalStats {
    pub day: String,
    pub total: i64,
    pub successful: i64,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyParticipants {
    pub day: String,
    pub participants: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyParticipants {
    pub month: String,
    pub participants: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRewards {
    pub day: String,
    pub amount: f64,
}

pub struct StatsStore {
    conn: Connection,
}

impl StatsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    pub fn upsert_retrieval_stats(&self, day: NaiveDate, total: i64, successful: i64) -> Result<()> {
        self.conn.execute(
            r#"
INSERT INTO retrieval_stats_daily(day, total, successful)
VALUES (?1, ?2, ?3)
ON CONFLICT(day) DO UPDATE SET
    total = total + excluded.total,
    successful = successful + excluded.successful
"#,
            params![day.to_string(), total, successful],
        )?;
        Ok(())
    }

    pub fn add_participants(&self, day: NaiveDate, participants: &[String]) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO daily_participants(day, participant) VALUES (?1, ?2)",
        )?;
        for participant in participants {
            stmt.execute(params![day.to_string(), participant])?;
        }
        Ok(())
    }

    /// Additive upsert into the daily transfer aggregate: a repeated
    /// observation for the same (day, recipient) key increments the amount.
    pub fn upsert_reward_transfer(&self, day: NaiveDate, recipient: &str, amount: f64) -> Result<()> {
        self.conn.execute(
            r#"
INSERT INTO daily_reward_transfers(day, recipient, amount)
VALUES (?1, ?2, ?3)
ON CONFLICT(day, recipient) DO UPDATE SET amount = amount + excluded.amount
"#,
            params![day.to_string(), recipient, amount],
        )?;
        Ok(())
    }

    pub fn read_checkpoint(&self) -> Result<Option<u64>> {
        let result = self.conn.query_row(
            "SELECT last_checked_block FROM reward_transfer_checkpoint WHERE id = 1",
            [],
            |row| row.get::<_, Option<i64>>(0),
        );
        match result {
            Ok(value) => Ok(value.map(|block| block as u64)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the ingestion checkpoint forward; a value at or below the stored
    /// one is a no-op, so overlapping runs cannot regress it.
    pub fn advance_checkpoint(&self, new_value: u64) -> Result<()> {
        self.conn.execute(
            r#"
INSERT INTO reward_transfer_checkpoint(id, last_checked_block)
VALUES (1, ?1)
ON CONFLICT(id) DO UPDATE SET last_checked_block = excluded.last_checked_block
WHERE reward_transfer_checkpoint.last_checked_block IS NULL
   OR excluded.last_checked_block > reward_transfer_checkpoint.last_checked_block
"#,
            params![new_value as i64],
        )?;
        Ok(())
    }

    pub fn daily_retrieval_stats(&self, window: &DateWindow) -> Result<Vec<DailyRetrievalStats>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT day, total, successful
FROM retrieval_stats_daily
WHERE day BETWEEN ?1 AND ?2
ORDER BY day
"#,
        )?;
        let rows = stmt
            .query_map(
                params![window.from.to_string(), window.to.to_string()],
                |row| {
                    let total: i64 = row.get(1)?;
                    let successful: i64 = row.get(2)?;
                    Ok(DailyRetrievalStats {
                        day: row.get(0)?,
                        total,
                        successful,
                        success_rate: if total > 0 {
                            Some(successful as f64 / total as f64)
                        } else {
                            None
                        },
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn daily_participants(&self, window: &DateWindow) -> Result<Vec<DailyParticipants>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT day, COUNT(DISTINCT participant)
FROM daily_participants
WHERE day BETWEEN ?1 AND ?2
GROUP BY day
ORDER BY day
"#,
        )?;
        let rows = stmt
            .query_map(
                params![window.from.to_string(), window.to.to_string()],
                |row| {
                    Ok(DailyParticipants {
                        day: row.get(0)?,
                        participants: row.get(1)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn monthly_participants(&self, window: &DateWindow) -> Result<Vec<MonthlyParticipants>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT substr(day, 1, 7) AS month, COUNT(DISTINCT participant)
FROM daily_participants
WHERE day BETWEEN ?1 AND ?2
GROUP BY month
ORDER BY month
"#,
        )?;
        let rows = stmt
            .query_map(
                params![window.from.to_string(), window.to.to_string()],
                |row| {
                    Ok(MonthlyParticipants {
                        month: row.get(0)?,
                        participants: row.get(1)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Month-ordered cohort membership. Callers computing change rates widen
    /// the window one month left so the first requested month has a baseline.
    pub fn monthly_cohorts(&self, window: &DateWindow) -> Result<Vec<MonthlyCohort>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT DISTINCT substr(day, 1, 7) AS month, participant
FROM daily_participants
WHERE day BETWEEN ?1 AND ?2
ORDER BY month
"#,
        )?;
        let rows = stmt
            .query_map(
                params![window.from.to_string(), window.to.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;

        let mut cohorts: Vec<MonthlyCohort> = Vec::new();
        for (month, participant) in rows {
            match cohorts.last_mut() {
                Some(cohort) if cohort.month == month => {
                    cohort.members.insert(participant);
                }
                _ => {
                    cohorts.push(MonthlyCohort {
                        month,
                        members: HashSet::from([participant]),
                    });
                }
            }
        }
        Ok(cohorts)
    }

    pub fn daily_rewards(&self, window: &DateWindow) -> Result<Vec<DailyRewards>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT day, SUM(amount)
FROM daily_reward_transfers
WHERE day BETWEEN ?1 AND ?2
GROUP BY day
ORDER BY day
"#,
        )?;
        let rows = stmt
            .query_map(
                params![window.from.to_string(), window.to.to_string()],
                |row| {
                    Ok(DailyRewards {
                        day: row.get(0)?,
                        amount: row.get(1)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
