use chrono::NaiveDate;
use uuid::Uuid;

use crate::constants::ALLOCATION_KEY_PREFIX;

const RANDOM_HEX_LEN: usize = 12;

/// `WA-YYYYMMDD-<12 hex>`; the random part comes from a v4 UUID.
pub fn generate_allocation_key(date: NaiveDate) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        ALLOCATION_KEY_PREFIX,
        date.format("%Y%m%d"),
        &random[..RANDOM_HEX_LEN]
    )
}

/// Cheap shape check used to reject garbage before touching the store.
pub fn is_well_formed(key: &str) -> bool {
    let mut parts = key.splitn(3, '-');
    let (Some(prefix), Some(date), Some(random)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == ALLOCATION_KEY_PREFIX
        && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
        && random.len() == RANDOM_HEX_LEN
        && random.chars().all(|c| c.is_ascii_hexdigit())
}
