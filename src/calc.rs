//! Pure grading arithmetic shared by the grade ledger, reports and promotion.

/// Slack allowed above a subject budget to absorb floating rounding.
pub const BUDGET_EPSILON: f64 = 0.001;
pub const DEFAULT_BUDGET: f64 = 100.0;
pub const DEFAULT_PASSING_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreLine {
    pub score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreTotals {
    pub score_sum: f64,
    pub max_sum: f64,
    pub count: usize,
}

impl ScoreTotals {
    pub fn add(&mut self, line: ScoreLine) {
        self.score_sum += line.score;
        self.max_sum += line.max_score;
        self.count += 1;
    }

    /// Raw percentage of points earned, `None` when nothing was graded.
    pub fn percent(&self) -> Option<f64> {
        if self.max_sum > 0.0 {
            Some(self.score_sum / self.max_sum * 100.0)
        } else {
            None
        }
    }
}

pub fn score_in_range(score: f64, max_score: f64) -> bool {
    score.is_finite() && max_score.is_finite() && max_score > 0.0 && score >= 0.0 && score <= max_score
}

pub fn fits_budget(existing_max_sum: f64, added_max: f64, budget: f64) -> bool {
    existing_max_sum + added_max <= budget + BUDGET_EPSILON
}

pub fn remaining_allowance(existing_max_sum: f64, budget: f64) -> f64 {
    (budget - existing_max_sum).max(0.0)
}

/// Rescales the earned share of points onto the subject's class point scale.
pub fn subject_average(t: &ScoreTotals, budget: f64) -> f64 {
    if t.max_sum > 0.0 {
        t.score_sum / t.max_sum * budget
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectPeriodResult {
    pub average: f64,
    pub budget: f64,
    pub graded_max: f64,
}

/// Budget-weighted percentage across subjects. Subjects without graded points
/// contribute neither points nor budget; `None` means no data at all.
pub fn period_average<I>(subjects: I) -> Option<f64>
where
    I: IntoIterator<Item = SubjectPeriodResult>,
{
    let mut points = 0.0;
    let mut budget_sum = 0.0;
    for s in subjects {
        if s.graded_max <= 0.0 {
            continue;
        }
        points += s.average;
        budget_sum += s.budget;
    }
    if budget_sum > 0.0 {
        Some(points / budget_sum * 100.0)
    } else {
        None
    }
}

/// Unweighted mean of per-subject year percentages, ignoring budgets and periods.
pub fn annual_average<I>(per_subject: I) -> f64
where
    I: IntoIterator<Item = ScoreTotals>,
{
    let percents: Vec<f64> = per_subject.into_iter().filter_map(|t| t.percent()).collect();
    if percents.is_empty() {
        return 0.0;
    }
    percents.iter().sum::<f64>() / percents.len() as f64
}

pub fn passes(annual_average: f64, threshold: f64) -> bool {
    annual_average >= threshold
}
