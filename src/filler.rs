use chrono::NaiveDate;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::record::{DATE_LAYOUT, FieldValue, Fields};
use crate::validation::STATE_OPTIONS;

const YEARS: [i32; 5] = [2020, 2021, 2022, 2023, 2024];
// Every day listed exists in every month.
const DAYS: [u32; 14] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 15, 20, 25, 28];

pub const STATE_FIELD: &str = "State";
pub const CREATED_FIELD: &str = "Created Date";

pub fn random_state<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    STATE_OPTIONS.choose(rng).copied().unwrap_or(STATE_OPTIONS[0])
}

/// Random timestamp between 2020 and 2024 in the `Created Date` layout.
pub fn random_created_date<R: Rng + ?Sized>(rng: &mut R) -> String {
    let year = *YEARS.choose(rng).unwrap_or(&YEARS[0]);
    let month = rng.gen_range(1..=12);
    let day = *DAYS.choose(rng).unwrap_or(&DAYS[0]);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| {
            date.and_hms_opt(
                rng.gen_range(0..24),
                rng.gen_range(0..60),
                rng.gen_range(0..60),
            )
        })
        .map(|ts| ts.format(DATE_LAYOUT).to_string())
        .unwrap_or_else(|| format!("{}-{:02}-{:02} 00:00:00", year, month, day))
}

/// Backfills `State` and `Created Date` on freshly fetched rows.
///
/// Only runs on raw remote data; cached snapshots already carry both fields.
pub fn fill_missing_fields<R: Rng + ?Sized>(rows: Vec<Fields>, rng: &mut R) -> Vec<Fields> {
    rows.into_iter()
        .map(|mut row| {
            if row.get(STATE_FIELD).is_none_or(FieldValue::is_blank) {
                row.insert(STATE_FIELD.to_string(), random_state(rng).into());
            }
            if row.get(CREATED_FIELD).is_none_or(FieldValue::is_blank) {
                row.insert(CREATED_FIELD.to_string(), random_created_date(rng).into());
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_field;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_values_pass_validation() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let date = random_created_date(&mut rng);
            assert!(validate_field(CREATED_FIELD, &date).valid, "{}", date);
            let state = random_state(&mut rng);
            assert!(validate_field(STATE_FIELD, state).valid);
        }
    }

    #[test]
    fn existing_values_are_kept() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut row = Fields::new();
        row.insert("name".into(), "Foo".into());
        row.insert(STATE_FIELD.into(), "paused".into());
        row.insert(CREATED_FIELD.into(), "2021-01-01 00:00:00".into());

        let filled = fill_missing_fields(vec![row.clone()], &mut rng);
        assert_eq!(filled, vec![row]);
    }

    #[test]
    fn blank_values_are_filled() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut row = Fields::new();
        row.insert("id".into(), "a1".into());
        row.insert(STATE_FIELD.into(), "".into());

        let filled = fill_missing_fields(vec![row], &mut rng);
        let state = filled[0].get(STATE_FIELD).unwrap().display();
        assert!(STATE_OPTIONS.iter().any(|label| *label == state));
        assert!(filled[0].get(CREATED_FIELD).is_some());
        assert_eq!(filled[0].get("id"), Some(&FieldValue::text("a1")));
    }
}
