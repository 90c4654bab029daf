use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::db::{add_tag, add_to_group, get_connection, init_db, insert_contact, insert_contribution};
use crate::error::{ReportError, Result};
use crate::models::{NewAddress, NewContact, NewContribution};
use crate::settings::load_settings;

struct DemoDonor {
    first: &'static str,
    last: &'static str,
    gender: Option<&'static str>,
    on_hold: bool,
    group: Option<&'static str>,
    /// (years before the current one, month, amount)
    gifts: &'static [(i32, u32, f64)],
}

const DONORS: &[DemoDonor] = &[
    DemoDonor { first: "Maya", last: "Okafor", gender: Some("Female"), on_hold: false, group: Some("Major Donors"),
        gifts: &[(1, 3, 2500.0), (1, 11, 1000.0), (2, 6, 3000.0), (3, 6, 2000.0)] },
    DemoDonor { first: "Tomas", last: "Lindqvist", gender: Some("Male"), on_hold: false, group: None,
        gifts: &[(1, 5, 120.0), (2, 5, 100.0)] },
    DemoDonor { first: "Priya", last: "Raman", gender: Some("Female"), on_hold: true, group: Some("Newsletter"),
        gifts: &[(1, 12, 75.0)] },
    DemoDonor { first: "Jonah", last: "Abernathy", gender: Some("Male"), on_hold: false, group: Some("Volunteers"),
        gifts: &[(1, 2, 40.0), (1, 8, 40.0), (0, 2, 40.0)] },
    DemoDonor { first: "Lucia", last: "Ferreira", gender: Some("Female"), on_hold: false, group: Some("Major Donors"),
        gifts: &[(0, 1, 5000.0), (1, 1, 5000.0), (2, 1, 4500.0)] },
    DemoDonor { first: "Sam", last: "Whitfield", gender: None, on_hold: false, group: None,
        gifts: &[(0, 4, 25.0)] },
    DemoDonor { first: "Eleanor", last: "Park", gender: Some("Female"), on_hold: false, group: Some("Newsletter"),
        gifts: &[(3, 9, 300.0), (4, 9, 300.0)] },
    DemoDonor { first: "Dmitri", last: "Volkov", gender: Some("Male"), on_hold: true, group: None,
        gifts: &[(1, 10, 650.0), (3, 10, 200.0)] },
    DemoDonor { first: "Grace", last: "Mbeki", gender: Some("Female"), on_hold: false, group: Some("Volunteers"),
        gifts: &[(1, 7, 15.0), (1, 7, 15.0), (1, 7, 20.0)] },
];

const ORGANIZATIONS: &[(&str, i32, u32, f64)] = &[
    ("Harbor Light Foundation", 1, 4, 10000.0),
    ("Northside Credit Union", 0, 6, 1500.0),
];

/// (last name, street, city, postal code, state)
const ADDRESSES: &[(&str, &str, &str, &str, &str)] = &[
    ("Okafor", "41 Harbor View Rd", "Portland", "04101", "Maine"),
    ("Lindqvist", "8 Birch Ln", "Duluth", "55802", "Minnesota"),
    ("Ferreira", "230 Ocean Ave", "Providence", "02903", "Rhode Island"),
    ("Volkov", "17 Cedar St", "Portland", "97205", "Oregon"),
    ("Mbeki", "5 Orchard Ct", "Madison", "53703", "Wisconsin"),
];

/// (last name, tag)
const TAGS: &[(&str, &str)] = &[("Okafor", "Board Member"), ("Ferreira", "Board Member")];

/// (last name, contact subtype)
const SUB_TYPES: &[(&str, &str)] = &[("Raman", "Student"), ("Abernathy", "Staff"), ("Park", "Parent")];

fn lookup<'a, T>(table: &'a [(&str, T)], last: &str) -> Option<&'a T> {
    table.iter().find(|(name, _)| *name == last).map(|(_, v)| v)
}

const MARKER: &str = "Okafor, Maya";

fn at(year: i32, month: u32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, 15)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .ok_or_else(|| ReportError::Other(format!("bad demo date {year}-{month}")))
}

/// Insert the demo donors with gifts placed relative to `year`. Returns the
/// number of contributions written.
fn insert_demo_data(conn: &Connection, year: i32) -> Result<usize> {
    let mut count = 0;
    for (i, donor) in DONORS.iter().enumerate() {
        let mut contact = NewContact::individual(donor.first, donor.last);
        contact.gender = donor.gender.map(String::from);
        contact.email = Some(format!("{}.{}@example.org", donor.first, donor.last).to_lowercase());
        contact.email_on_hold = donor.on_hold;
        contact.phone = Some(format!("555-01{i:02}"));
        contact.contact_sub_type = lookup(SUB_TYPES, donor.last).map(|s| s.to_string());
        contact.address = ADDRESSES
            .iter()
            .find(|a| a.0 == donor.last)
            .map(|(_, street, city, postal, state)| NewAddress::city(street, city, postal, state, "United States"));
        let id = insert_contact(conn, &contact)?;
        if let Some(group) = donor.group {
            add_to_group(conn, group, id)?;
        }
        if let Some(tag) = lookup(TAGS, donor.last) {
            add_tag(conn, tag, id)?;
        }
        for (j, (ago, month, amount)) in donor.gifts.iter().enumerate() {
            let mut gift = NewContribution::donation(id, at(year - ago, *month)?, *amount);
            gift.payment_instrument = Some(if j % 2 == 0 { "Credit Card" } else { "Check" }.to_string());
            insert_contribution(conn, &gift)?;
            count += 1;
        }
    }

    for (name, ago, month, amount) in ORGANIZATIONS {
        let id = insert_contact(conn, &NewContact::organization(name))?;
        add_tag(conn, "Company", id)?;
        let mut gift = NewContribution::donation(id, at(year - ago, *month)?, *amount);
        gift.financial_type = "Member Dues".to_string();
        gift.payment_instrument = Some("EFT".to_string());
        insert_contribution(conn, &gift)?;
        count += 1;
    }

    // Noise every report should ignore.
    let tester = insert_contact(conn, &NewContact::individual("Test", "Account"))?;
    let mut test_gift = NewContribution::donation(tester, at(year - 1, 6)?, 99999.0);
    test_gift.is_test = true;
    insert_contribution(conn, &test_gift)?;
    let mut pending = NewContribution::donation(tester, at(year - 1, 6)?, 500.0);
    pending.contribution_status = "pending".to_string();
    insert_contribution(conn, &pending)?;
    count += 2;

    Ok(count)
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    if !db_path.exists() {
        return Err(ReportError::Other("No database found. Run `lybunt init` first.".into()));
    }

    let conn = get_connection(&db_path)?;
    init_db(&conn)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM contacts WHERE sort_name = ?1)",
        [MARKER],
        |r| r.get(0),
    )?;
    if exists {
        println!("Demo data already loaded (contact '{MARKER}' exists).");
        return Ok(());
    }

    let year = Local::now().date_naive().year();
    let count = insert_demo_data(&conn, year)?;

    println!("Demo data loaded!");
    println!("  Contacts:      {}", DONORS.len() + ORGANIZATIONS.len() + 1);
    println!("  Contributions: {count}");
    println!();
    println!("Try these next:");
    println!("  lybunt report lapsed");
    println!("  lybunt report lapsed --chart bar");
    println!("  lybunt report donors --column email --sort sort_name");
    println!("  lybunt report lapsed --filter group_id=1");
    println!("  lybunt report donors --column city --filter state_province=Oregon");

    Ok(())
}
