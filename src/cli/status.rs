use crate::db::get_connection;
use crate::error::Result;
use crate::settings::load_settings;

/// The `YYYY-MM-DD` part of a stored timestamp, or the whole value when it
/// is shorter or not plain ASCII there.
fn day_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Data dir:     {}", settings.data_dir);
    println!("Database:     {}", db_path.display());
    println!("Fiscal start: {}", settings.fiscal_start()?);
    println!("Currency:     {}", settings.default_currency);

    if db_path.exists() {
        let conn = get_connection(&db_path)?;
        let contacts: i64 = conn.query_row("SELECT count(*) FROM contacts", [], |r| r.get(0))?;
        let contributions: i64 = conn.query_row(
            "SELECT count(*) FROM contributions WHERE is_test = 0 AND is_template = 0",
            [],
            |r| r.get(0),
        )?;
        let groups: i64 = conn.query_row("SELECT count(*) FROM contact_groups", [], |r| r.get(0))?;
        let tags: i64 = conn.query_row("SELECT count(*) FROM tags", [], |r| r.get(0))?;
        let span: (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(receive_date), MAX(receive_date) FROM contributions",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        println!();
        println!("Contacts:       {contacts}");
        println!("Contributions:  {contributions}");
        println!("Groups:         {groups}");
        println!("Tags:           {tags}");
        if let (Some(first), Some(last)) = span {
            println!("Received:       {} to {}", day_part(&first), day_part(&last));
        }
    } else {
        println!();
        println!("Database not found. Run `lybunt init` to set up.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_part() {
        assert_eq!(day_part("2023-04-05 12:00:00"), "2023-04-05");
        assert_eq!(day_part("2023-04"), "2023-04");
        // a multi-byte character straddling byte 10
        assert_eq!(day_part("2023-04-0é rest"), "2023-04-0é rest");
    }
}
