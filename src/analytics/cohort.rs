use crate::analytics::{ChangeRates, MonthlyCohort};

/// Computes churn/growth/retention for each month after the first.
///
/// The input must be ordered ascending by month and include one extra month
/// on the left edge: index 0 only ever serves as the baseline. All three
/// rates are normalized against the prior month's cohort size; a month with
/// an empty baseline reports zero rates rather than dividing by zero.
pub fn compute_change_rates(cohorts: &[MonthlyCohort]) -> Vec<ChangeRates> {
    let mut out = Vec::new();
    for pair in cohorts.windows(2) {
        let previous = &pair[0];
        let current = &pair[1];

        let initial = previous.members.len();
        let retained = previous.members.intersection(&current.members).count();
        let lost = initial - retained;
        let acquired = current.members.difference(&previous.members).count();

        let rate = |count: usize| {
            if initial > 0 {
                count as f64 / initial as f64
            } else {
                0.0
            }
        };

        out.push(ChangeRates {
            month: current.month.clone(),
            churn_rate: rate(lost),
            growth_rate: rate(acquired),
            retention_rate: rate(retained),
        });
    }
    out
}
