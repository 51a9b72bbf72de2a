pub mod cohort;

use std::collections::HashSet;

use serde::Serialize;

/// Distinct participants active in one calendar month, keyed `YYYY-MM`.
#[derive(Debug, Clone)]
pub struct MonthlyCohort {
    pub month: String,
    pub members: HashSet<String>,
}

impl MonthlyCohort {
    pub fn new(month: impl Into<String>, members: impl IntoIterator<Item = String>) -> Self {
        Self {
            month: month.into(),
            members: members.into_iter().collect(),
        }
    }
}

/// Month-over-month movement of a cohort relative to the prior month's size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRates {
    pub month: String,
    pub churn_rate: f64,
    pub growth_rate: f64,
    pub retention_rate: f64,
}
