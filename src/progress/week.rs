use chrono::{Datelike, NaiveDate};

/// ISO year-week bucket, e.g. "2024-09"
pub fn iso_week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-{:02}", week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_key_uses_iso_year() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(iso_week_key(d(2024, 2, 29)), "2024-09");
        // Monday 2024-12-30 belongs to ISO week 1 of 2025
        assert_eq!(iso_week_key(d(2024, 12, 30)), "2025-01");
        // Sunday 2021-01-03 still belongs to 2020-W53
        assert_eq!(iso_week_key(d(2021, 1, 3)), "2020-53");
    }
}
