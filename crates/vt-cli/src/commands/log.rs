//! Log command: prints the join/leave audit trail.

use std::io::Write;

use anyhow::Result;

use vt_core::UserId;
use vt_db::Database;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    user: Option<&UserId>,
    limit: Option<usize>,
) -> Result<()> {
    let rows = db.list_audit_rows(user, limit)?;
    if rows.is_empty() {
        writeln!(writer, "No audit entries.")?;
        return Ok(());
    }
    for row in rows {
        writeln!(
            writer,
            "{} {:<5} {} ({})",
            row.timestamp, row.action, row.username, row.user_id
        )?;
    }
    Ok(())
}
