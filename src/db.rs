use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::{NewContact, NewContribution};
use crate::window::SQL_DATETIME;

/// Name of the receive-date index the direct report join hints at.
pub const RECEIVE_DATE_INDEX: &str = "idx_contributions_receive_date";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY,
    contact_type TEXT NOT NULL DEFAULT 'Individual',
    contact_sub_type TEXT,
    sort_name TEXT NOT NULL,
    first_name TEXT,
    last_name TEXT,
    gender TEXT,
    birth_date TEXT,
    is_deceased INTEGER DEFAULT 0,
    do_not_phone INTEGER DEFAULT 0,
    do_not_email INTEGER DEFAULT 0,
    do_not_sms INTEGER DEFAULT 0,
    do_not_mail INTEGER DEFAULT 0,
    is_opt_out INTEGER DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS emails (
    id INTEGER PRIMARY KEY,
    contact_id INTEGER NOT NULL,
    email TEXT NOT NULL,
    on_hold INTEGER DEFAULT 0,
    is_primary INTEGER DEFAULT 1,
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE TABLE IF NOT EXISTS phones (
    id INTEGER PRIMARY KEY,
    contact_id INTEGER NOT NULL,
    phone TEXT NOT NULL,
    is_primary INTEGER DEFAULT 1,
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE TABLE IF NOT EXISTS addresses (
    id INTEGER PRIMARY KEY,
    contact_id INTEGER NOT NULL,
    street_address TEXT,
    supplemental_address_1 TEXT,
    city TEXT,
    postal_code TEXT,
    state_province TEXT,
    country TEXT,
    is_primary INTEGER DEFAULT 1,
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE TABLE IF NOT EXISTS contact_groups (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id INTEGER NOT NULL,
    contact_id INTEGER NOT NULL,
    PRIMARY KEY (group_id, contact_id),
    FOREIGN KEY (group_id) REFERENCES contact_groups(id),
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS entity_tags (
    tag_id INTEGER NOT NULL,
    contact_id INTEGER NOT NULL,
    PRIMARY KEY (tag_id, contact_id),
    FOREIGN KEY (tag_id) REFERENCES tags(id),
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE TABLE IF NOT EXISTS contributions (
    id INTEGER PRIMARY KEY,
    contact_id INTEGER NOT NULL,
    receive_date TEXT NOT NULL,
    total_amount REAL NOT NULL,
    financial_type TEXT NOT NULL DEFAULT 'Donation',
    contribution_status TEXT NOT NULL DEFAULT 'completed',
    payment_instrument TEXT,
    is_test INTEGER DEFAULT 0,
    is_template INTEGER DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (contact_id) REFERENCES contacts(id)
);

CREATE INDEX IF NOT EXISTS idx_contributions_receive_date ON contributions(receive_date);
CREATE INDEX IF NOT EXISTS idx_contributions_contact ON contributions(contact_id);
CREATE INDEX IF NOT EXISTS idx_emails_contact ON emails(contact_id);
CREATE INDEX IF NOT EXISTS idx_phones_contact ON phones(contact_id);
CREATE INDEX IF NOT EXISTS idx_addresses_contact ON addresses(contact_id);
";

const DEFAULT_GROUPS: &[&str] = &["Major Donors", "Newsletter", "Volunteers"];
const DEFAULT_TAGS: &[&str] = &["Board Member", "Company", "Government Entity"];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    for name in DEFAULT_GROUPS {
        conn.execute(
            "INSERT OR IGNORE INTO contact_groups (name) VALUES (?1)",
            [name],
        )?;
    }
    for name in DEFAULT_TAGS {
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [name])?;
    }
    Ok(())
}

pub fn insert_contact(conn: &Connection, contact: &NewContact) -> Result<i64> {
    conn.execute(
        "INSERT INTO contacts (contact_type, contact_sub_type, sort_name, first_name, last_name, gender, birth_date, \
         is_deceased, do_not_email) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            contact.contact_type,
            contact.contact_sub_type,
            contact.sort_name,
            contact.first_name,
            contact.last_name,
            contact.gender,
            contact.birth_date,
            contact.is_deceased,
            contact.do_not_email,
        ],
    )?;
    let id = conn.last_insert_rowid();
    if let Some(email) = &contact.email {
        conn.execute(
            "INSERT INTO emails (contact_id, email, on_hold) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, email, contact.email_on_hold],
        )?;
    }
    if let Some(phone) = &contact.phone {
        conn.execute(
            "INSERT INTO phones (contact_id, phone) VALUES (?1, ?2)",
            rusqlite::params![id, phone],
        )?;
    }
    if let Some(a) = &contact.address {
        conn.execute(
            "INSERT INTO addresses (contact_id, street_address, supplemental_address_1, city, postal_code, \
             state_province, country) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                a.street_address,
                a.supplemental_address_1,
                a.city,
                a.postal_code,
                a.state_province,
                a.country,
            ],
        )?;
    }
    Ok(id)
}

pub fn insert_contribution(conn: &Connection, c: &NewContribution) -> Result<i64> {
    conn.execute(
        "INSERT INTO contributions (contact_id, receive_date, total_amount, financial_type, \
         contribution_status, payment_instrument, is_test, is_template) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            c.contact_id,
            c.receive_date.format(SQL_DATETIME).to_string(),
            c.total_amount,
            c.financial_type,
            c.contribution_status,
            c.payment_instrument,
            c.is_test,
            c.is_template,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Add a contact to a group by name, returning the group id.
pub fn add_to_group(conn: &Connection, group: &str, contact_id: i64) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO contact_groups (name) VALUES (?1)", [group])?;
    let group_id: i64 = conn.query_row(
        "SELECT id FROM contact_groups WHERE name = ?1",
        [group],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, contact_id) VALUES (?1, ?2)",
        rusqlite::params![group_id, contact_id],
    )?;
    Ok(group_id)
}

/// Tag a contact by name, returning the tag id.
pub fn add_tag(conn: &Connection, tag: &str, contact_id: i64) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [tag])?;
    let tag_id: i64 = conn.query_row("SELECT id FROM tags WHERE name = ?1", [tag], |r| r.get(0))?;
    conn.execute(
        "INSERT OR IGNORE INTO entity_tags (tag_id, contact_id) VALUES (?1, ?2)",
        rusqlite::params![tag_id, contact_id],
    )?;
    Ok(tag_id)
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}

#[cfg(test)]
pub(crate) fn at(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAddress;

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "contacts",
            "emails",
            "phones",
            "addresses",
            "contact_groups",
            "group_members",
            "tags",
            "entity_tags",
            "contributions",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
        let groups: i64 = conn
            .query_row("SELECT count(*) FROM contact_groups", [], |r| r.get(0))
            .unwrap();
        assert_eq!(groups, DEFAULT_GROUPS.len() as i64);
        let tags: i64 = conn.query_row("SELECT count(*) FROM tags", [], |r| r.get(0)).unwrap();
        assert_eq!(tags, DEFAULT_TAGS.len() as i64);
    }

    #[test]
    fn test_receive_date_index_exists() {
        let (_dir, conn) = test_db();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
                [RECEIVE_DATE_INDEX],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_insert_contact_with_email_and_phone() {
        let (_dir, conn) = test_db();
        let mut contact = NewContact::individual("Ada", "Lovelace");
        contact.email = Some("ada@example.org".to_string());
        contact.email_on_hold = true;
        contact.phone = Some("555-0100".to_string());
        let id = insert_contact(&conn, &contact).unwrap();

        let (sort_name, on_hold): (String, bool) = conn
            .query_row(
                "SELECT c.sort_name, e.on_hold FROM contacts c JOIN emails e ON e.contact_id = c.id WHERE c.id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(sort_name, "Lovelace, Ada");
        assert!(on_hold);
    }

    #[test]
    fn test_contribution_dates_stored_as_full_timestamps() {
        let (_dir, conn) = test_db();
        let id = insert_contact(&conn, &NewContact::individual("A", "B")).unwrap();
        insert_contribution(&conn, &NewContribution::donation(id, at(2023, 1, 1), 10.0)).unwrap();
        let stored: String = conn
            .query_row("SELECT receive_date FROM contributions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "2023-01-01 12:00:00");
    }

    #[test]
    fn test_add_to_group_is_idempotent() {
        let (_dir, conn) = test_db();
        let id = insert_contact(&conn, &NewContact::individual("A", "B")).unwrap();
        let g1 = add_to_group(&conn, "Major Donors", id).unwrap();
        let g2 = add_to_group(&conn, "Major Donors", id).unwrap();
        assert_eq!(g1, g2);
        let members: i64 = conn
            .query_row("SELECT count(*) FROM group_members", [], |r| r.get(0))
            .unwrap();
        assert_eq!(members, 1);
    }

    #[test]
    fn test_insert_contact_with_address_and_tag() {
        let (_dir, conn) = test_db();
        let mut contact = NewContact::individual("Ada", "Lovelace");
        contact.contact_sub_type = Some("Student".to_string());
        contact.address = Some(NewAddress::city("12 Marylebone Rd", "London", "NW1 5LR", "England", "United Kingdom"));
        let id = insert_contact(&conn, &contact).unwrap();
        let board = add_tag(&conn, "Board Member", id).unwrap();
        assert_eq!(add_tag(&conn, "Board Member", id).unwrap(), board);

        let (sub_type, city, primary): (String, String, bool) = conn
            .query_row(
                "SELECT c.contact_sub_type, a.city, a.is_primary FROM contacts c JOIN addresses a ON a.contact_id = c.id",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!((sub_type.as_str(), city.as_str(), primary), ("Student", "London", true));
        let tagged: i64 = conn
            .query_row("SELECT count(*) FROM entity_tags WHERE contact_id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(tagged, 1);
    }
}
