//! Pure formatting helpers for the certificate template fields.
//!
//! The output strings are a rendering contract with the deployed template;
//! changing any of them changes every issued certificate.

use chrono::NaiveDate;

/// Title-case a name: words separated by single spaces, first letter upper,
/// rest lower. Runs of whitespace collapse.
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Registration left-padded with zeros to ten characters, upper-cased.
/// Longer registrations pass through unpadded.
pub fn registration_mask(registration: &str) -> String {
    let trimmed = registration.trim().to_uppercase();
    format!("{trimmed:0>10}")
}

/// `"{type} - {number}"` with spaces stripped from the number.
pub fn document_line(kind: &str, number: &str) -> String {
    format!(
        "{} - {}",
        kind,
        number.replace(' ', "").trim().to_uppercase()
    )
}

pub fn workload_label(hours: u32) -> String {
    format!("{hours}h")
}

/// Whole-percent utilization, ties rounding to even as the previous system
/// did.
pub fn utilization_label(utilization: f64) -> String {
    format!("{}%", utilization.round_ties_even() as i64)
}

/// `"dd MonthName yyyy"` with English month names.
pub fn long_date(date: NaiveDate) -> String {
    date.format("%d %B %Y").to_string()
}

/// The issue line printed at the bottom of the certificate.
pub fn location_line(date: NaiveDate) -> String {
    format!("São Paulo - Brazil, {}", long_date(date))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn names_are_title_cased() {
        assert_eq!(title_case("maria clara da silva"), "Maria Clara Da Silva");
        assert_eq!(title_case("JOÃO  DOS   SANTOS"), "João Dos Santos");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn registrations_pad_to_ten() {
        assert_eq!(registration_mask("4655"), "0000004655");
        assert_eq!(registration_mask(" ab12 "), "000000AB12");
        assert_eq!(registration_mask("12345678901"), "12345678901");
    }

    #[test]
    fn documents_strip_spaces_and_upper() {
        assert_eq!(
            document_line("CPF", "123 456 789-x"),
            "CPF - 123456789-X"
        );
    }

    #[test]
    fn workload_and_utilization_labels() {
        assert_eq!(workload_label(140), "140h");
        assert_eq!(utilization_label(87.5), "88%");
        assert_eq!(utilization_label(92.5), "92%");
        assert_eq!(utilization_label(92.4), "92%");
        assert_eq!(utilization_label(100.0), "100%");
    }

    #[test]
    fn dates_use_english_month_names() {
        assert_eq!(long_date(date(2024, 11, 30)), "30 November 2024");
        assert_eq!(long_date(date(2024, 3, 5)), "05 March 2024");
    }

    #[test]
    fn issue_line_embeds_the_long_date() {
        assert_eq!(
            location_line(date(2024, 11, 30)),
            "São Paulo - Brazil, 30 November 2024"
        );
    }

    proptest! {
        #[test]
        fn title_case_is_idempotent(input in "[a-zA-Zà-ü ]{0,40}") {
            let once = title_case(&input);
            prop_assert_eq!(title_case(&once), once);
        }

        #[test]
        fn masked_registrations_are_at_least_ten_chars(input in "[a-z0-9]{1,14}") {
            let masked = registration_mask(&input);
            prop_assert!(masked.len() >= 10);
            prop_assert!(masked.ends_with(&input.to_uppercase()));
        }
    }
}
