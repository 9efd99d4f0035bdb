//! SoQL filter and sort expression builders for the dataset's fixed
//! schema.

/// Filter matching illegal dumping requests only.
#[must_use]
pub fn category_filter() -> String {
    "REQCATEGORY='ILLDUMP'".to_string()
}

/// Filter matching illegal dumping requests initiated in `year`.
#[must_use]
pub fn year_filter(year: i32) -> String {
    format!("REQCATEGORY='ILLDUMP' AND date_extract_y(DATETIMEINIT)={year}")
}

/// Default sort: newest requests first.
#[must_use]
pub fn newest_first() -> String {
    "DATETIMEINIT DESC".to_string()
}
