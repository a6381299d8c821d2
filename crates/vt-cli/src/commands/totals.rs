//! Totals command: cumulative time in channel per user.

use std::io::Write;

use anyhow::Result;
use chrono::SecondsFormat;

use vt_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let records = db.list_cumulative_times()?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &records)?;
        writeln!(writer)?;
        return Ok(());
    }

    if records.is_empty() {
        writeln!(writer, "No time recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Time in channel:")?;
    for record in records {
        writeln!(
            writer,
            "- {} ({}): {} (updated {})",
            record.username,
            record.user_id,
            record.cumulative,
            record
                .last_updated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;
    use vt_core::{CumulativeTimeRecord, SessionDuration, UserId};

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        for (id, name, seconds) in [("1", "alice", 125), ("2", "bob", 3661)] {
            let user = UserId::new(id).unwrap();
            db.upsert_cumulative_time(
                &user,
                &CumulativeTimeRecord {
                    user_id: user.clone(),
                    username: name.to_string(),
                    cumulative: SessionDuration::from_seconds(seconds),
                    last_updated_at: at,
                },
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn totals_lists_largest_first() {
        let mut output = Vec::new();
        run(&mut output, &seeded(), false).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Time in channel:
        - bob (2): 1h 1m 1s (updated 2025-03-01T12:00:00Z)
        - alice (1): 0h 2m 5s (updated 2025-03-01T12:00:00Z)
        ");
    }

    #[test]
    fn totals_json_exposes_components() {
        let mut output = Vec::new();
        run(&mut output, &seeded(), true).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(parsed[0]["username"], "bob");
        assert_eq!(parsed[0]["cumulative"]["hours"], 1);
        assert_eq!(parsed[1]["cumulative"]["seconds"], 5);
    }

    #[test]
    fn totals_empty_database() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, false).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "No time recorded.\n");
    }
}
