use chrono::{DateTime, Local, NaiveDate, Utc};

/// Calendar day an instant belongs to for quota accounting (host local time).
pub fn work_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

pub fn today() -> NaiveDate {
    work_date(Utc::now())
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
