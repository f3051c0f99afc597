//! Derived metrics over a KPI snapshot
//!
//! Pure and total: every function accepts any well-typed payload and never
//! divides by zero. Ratios come back as percentages in `[0, 100]`.

use crate::models::{AccountTotal, CategoryAmounts, KpiMetrics};
use serde::Serialize;

/// Rows in the ranking chart
pub const RANKING_LIMIT: usize = 8;
/// Rows in the textual breakdown under the chart
pub const BREAKDOWN_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub amount: f64,
    /// Share of the view the row belongs to.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub month: String,
    pub inflow: f64,
    pub outflow: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodAverages {
    pub inflow: f64,
    pub outflow: f64,
    pub net: f64,
}

/// Everything the dashboard renders from one KPI payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total_moved: f64,
    pub total_outflow: f64,
    pub total_savings: f64,
    pub net_flow: f64,
    pub savings_rate: f64,
    pub ranking: Vec<CategoryShare>,
    pub breakdown: Vec<CategoryShare>,
    pub distribution: Vec<CategoryShare>,
    pub trend: Vec<TrendPoint>,
    pub averages: PeriodAverages,
    pub top_inflow_accounts: Vec<AccountTotal>,
}

/// `part / whole * 100`, or 0 when `whole` is not positive.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 && whole.is_finite() {
        (part / whole * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Moved minus spent this month. Negative means a deficit.
pub fn net_flow(kpis: &KpiMetrics) -> f64 {
    kpis.total_moved_month - kpis.total_outflow_month
}

pub fn savings_rate(kpis: &KpiMetrics) -> f64 {
    percentage(kpis.total_savings_inflow, kpis.total_moved_month)
}

/// The ranking view: at most `RANKING_LIMIT` categories by descending
/// amount. Equal amounts keep backend order. Shares are over the rows of
/// this view, so every shorter prefix of it uses the same denominator.
pub fn ranked_categories(amounts: &CategoryAmounts) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = amounts
        .iter()
        .map(|(category, amount)| (category.to_string(), amount))
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(RANKING_LIMIT);
    ranked
}

/// Shares of the ranking view, top `limit` rows.
pub fn top_spending(kpis: &KpiMetrics, limit: usize) -> Vec<CategoryShare> {
    let mut ranking = ranking_shares(&kpis.spending_by_category);
    ranking.truncate(limit);
    ranking
}

fn ranking_shares(amounts: &CategoryAmounts) -> Vec<CategoryShare> {
    let ranked = ranked_categories(amounts);
    let total: f64 = ranked.iter().map(|(_, amount)| amount).sum();

    ranked
        .into_iter()
        .map(|(category, amount)| CategoryShare {
            category,
            amount,
            percentage: percentage(amount, total),
        })
        .collect()
}

/// Shares of `category_distribution`, in backend order.
pub fn distribution_shares(kpis: &KpiMetrics) -> Vec<CategoryShare> {
    let total = kpis.category_distribution.total();
    kpis.category_distribution
        .iter()
        .map(|(category, amount)| CategoryShare {
            category: category.to_string(),
            amount,
            percentage: percentage(amount, total),
        })
        .collect()
}

pub fn trend_points(kpis: &KpiMetrics) -> Vec<TrendPoint> {
    kpis.monthly_trend
        .iter()
        .map(|month| TrendPoint {
            month: month.month.clone(),
            inflow: month.inflow,
            outflow: month.outflow,
            net: month.inflow - month.outflow,
        })
        .collect()
}

/// Arithmetic means across all returned months; zeros for an empty trend.
pub fn period_averages(kpis: &KpiMetrics) -> PeriodAverages {
    let months = kpis.monthly_trend.len();
    if months == 0 {
        return PeriodAverages::default();
    }

    let (inflow, outflow) = kpis
        .monthly_trend
        .iter()
        .fold((0.0, 0.0), |(i, o), m| (i + m.inflow, o + m.outflow));
    let n = months as f64;

    PeriodAverages {
        inflow: inflow / n,
        outflow: outflow / n,
        net: (inflow - outflow) / n,
    }
}

pub fn summarize(kpis: &KpiMetrics) -> KpiSummary {
    let ranking = ranking_shares(&kpis.spending_by_category);

    KpiSummary {
        total_moved: kpis.total_moved_month,
        total_outflow: kpis.total_outflow_month,
        total_savings: kpis.total_savings_inflow,
        net_flow: net_flow(kpis),
        savings_rate: savings_rate(kpis),
        breakdown: ranking.iter().take(BREAKDOWN_LIMIT).cloned().collect(),
        ranking,
        distribution: distribution_shares(kpis),
        trend: trend_points(kpis),
        averages: period_averages(kpis),
        top_inflow_accounts: kpis.top_inflow_accounts.clone(),
    }
}
