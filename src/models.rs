use chrono::NaiveDateTime;

/// A contact to insert, with its optional primary email and phone.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub contact_type: String,
    pub contact_sub_type: Option<String>,
    pub sort_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub is_deceased: bool,
    pub do_not_email: bool,
    pub email: Option<String>,
    pub email_on_hold: bool,
    pub phone: Option<String>,
    pub address: Option<NewAddress>,
}

impl NewContact {
    /// An individual named `Last, First`.
    pub fn individual(first: &str, last: &str) -> Self {
        Self {
            contact_type: "Individual".to_string(),
            contact_sub_type: None,
            sort_name: format!("{last}, {first}"),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            gender: None,
            birth_date: None,
            is_deceased: false,
            do_not_email: false,
            email: None,
            email_on_hold: false,
            phone: None,
            address: None,
        }
    }

    pub fn organization(name: &str) -> Self {
        Self {
            contact_type: "Organization".to_string(),
            sort_name: name.to_string(),
            first_name: None,
            last_name: None,
            ..Self::individual("", "")
        }
    }
}

/// A primary postal address.
#[derive(Debug, Clone, Default)]
pub struct NewAddress {
    pub street_address: Option<String>,
    pub supplemental_address_1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub state_province: Option<String>,
    pub country: Option<String>,
}

impl NewAddress {
    pub fn city(street: &str, city: &str, postal_code: &str, state_province: &str, country: &str) -> Self {
        Self {
            street_address: Some(street.to_string()),
            supplemental_address_1: None,
            city: Some(city.to_string()),
            postal_code: Some(postal_code.to_string()),
            state_province: Some(state_province.to_string()),
            country: Some(country.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewContribution {
    pub contact_id: i64,
    pub receive_date: NaiveDateTime,
    pub total_amount: f64,
    pub financial_type: String,
    pub contribution_status: String,
    pub payment_instrument: Option<String>,
    pub is_test: bool,
    pub is_template: bool,
}

impl NewContribution {
    /// A completed live donation.
    pub fn donation(contact_id: i64, receive_date: NaiveDateTime, total_amount: f64) -> Self {
        Self {
            contact_id,
            receive_date,
            total_amount,
            financial_type: "Donation".to_string(),
            contribution_status: "completed".to_string(),
            payment_instrument: None,
            is_test: false,
            is_template: false,
        }
    }
}
