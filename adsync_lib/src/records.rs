//! Typed metric records built from report rows.
//!
//! Each dataset has its own record type with a composite natural key. Cells
//! arrive as raw strings; counts and money are coerced leniently (anything
//! unusable becomes zero) while key columns must parse or the row is skipped.

use adreports_api::{ReportRow, NO_DATA};
use chrono::NaiveDate;
use rusqlite::types::Value;
use thiserror::Error;

use crate::dataset::DatasetKind;

/// Why a row could not become a record.
#[derive(Error, Debug, PartialEq)]
pub enum RowError {
    #[error("missing column {0}")]
    Missing(&'static str),
    #[error("invalid {column} value {value:?}")]
    Invalid { column: &'static str, value: String },
}

/// Lenient numeric coercion for metric cells.
///
/// `--`, empty, absent and non-numeric cells all become `0.0`.
pub fn coerce_number(cell: Option<&str>) -> f64 {
    match cell.map(str::trim) {
        None | Some("") | Some(NO_DATA) => 0.0,
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
    }
}

/// Click-through rate in percent; zero when there were no impressions.
pub fn click_through_rate(clicks: i64, impressions: i64) -> f64 {
    if impressions > 0 {
        clicks as f64 / impressions as f64 * 100.0
    } else {
        0.0
    }
}

/// Average cost per click; zero when there were no clicks.
pub fn average_cpc(cost: f64, clicks: i64) -> f64 {
    if clicks > 0 {
        cost / clicks as f64
    } else {
        0.0
    }
}

/// Maps per-goal report columns onto named outcome fields.
///
/// The upstream expands `Conversions` and `Revenue` into one column per goal
/// and attribution model, e.g. `Conversions_12345_LC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalColumns {
    purchase_goal_id: u64,
    lead_goal_id: Option<u64>,
    attribution_model: String,
}

impl GoalColumns {
    pub fn new(purchase_goal_id: u64, lead_goal_id: Option<u64>, attribution_model: &str) -> Self {
        Self {
            purchase_goal_id,
            lead_goal_id,
            attribution_model: attribution_model.to_string(),
        }
    }

    pub fn goal_ids(&self) -> Vec<u64> {
        std::iter::once(self.purchase_goal_id)
            .chain(self.lead_goal_id)
            .collect()
    }

    pub fn attribution_model(&self) -> &str {
        &self.attribution_model
    }

    pub fn conversions_column(&self, goal_id: u64) -> String {
        format!("Conversions_{}_{}", goal_id, self.attribution_model)
    }

    pub fn revenue_column(&self, goal_id: u64) -> String {
        format!("Revenue_{}_{}", goal_id, self.attribution_model)
    }

    pub fn purchases(&self, row: &ReportRow) -> f64 {
        coerce_number(row.get(&self.conversions_column(self.purchase_goal_id)))
    }

    pub fn purchase_revenue(&self, row: &ReportRow) -> f64 {
        coerce_number(row.get(&self.revenue_column(self.purchase_goal_id)))
    }

    pub fn leads(&self, row: &ReportRow) -> f64 {
        match self.lead_goal_id {
            Some(goal) => coerce_number(row.get(&self.conversions_column(goal))),
            None => 0.0,
        }
    }
}

/// A typed row of one dataset table.
pub trait MetricRecord: Sized + Send + 'static {
    const KIND: DatasetKind;
    /// Target table; every table has a `date` column holding `YYYY-MM-DD`.
    const TABLE: &'static str;
    /// Insert column order, matching [`MetricRecord::to_values`].
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &ReportRow, goals: &GoalColumns) -> Result<Self, RowError>;

    fn date(&self) -> NaiveDate;

    fn to_values(&self) -> Vec<Value>;
}

fn required<'a>(row: &'a ReportRow, column: &'static str) -> Result<&'a str, RowError> {
    match row.get(column).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RowError::Missing(column)),
    }
}

fn parse_date(row: &ReportRow) -> Result<NaiveDate, RowError> {
    let raw = required(row, "Date")?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| RowError::Invalid {
        column: "Date",
        value: raw.to_string(),
    })
}

fn parse_id(row: &ReportRow, column: &'static str) -> Result<i64, RowError> {
    let raw = required(row, column)?;
    raw.parse::<i64>().map_err(|_| RowError::Invalid {
        column,
        value: raw.to_string(),
    })
}

fn count(row: &ReportRow, column: &str) -> i64 {
    coerce_number(row.get(column)).round() as i64
}

fn optional_text(row: &ReportRow, column: &str) -> Option<String> {
    row.get(column)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn date_value(date: NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

fn text_value(value: &Option<String>) -> Value {
    match value {
        Some(v) => Value::Text(v.clone()),
        None => Value::Null,
    }
}

/// Daily campaign totals. Key: `(date, campaign_id, ad_network_type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDailyRecord {
    pub date: NaiveDate,
    pub campaign_id: i64,
    pub campaign_name: String,
    pub ad_network_type: String,
    pub impressions: i64,
    pub clicks: i64,
    pub cost: f64,
    pub ctr: f64,
    pub avg_cpc: f64,
    pub purchases: f64,
    pub purchase_revenue: f64,
    pub leads: f64,
}

impl MetricRecord for CampaignDailyRecord {
    const KIND: DatasetKind = DatasetKind::CampaignDaily;
    const TABLE: &'static str = "campaign_daily_stats";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "campaign_id",
        "campaign_name",
        "ad_network_type",
        "impressions",
        "clicks",
        "cost",
        "ctr",
        "avg_cpc",
        "purchases",
        "purchase_revenue",
        "leads",
    ];

    fn from_row(row: &ReportRow, goals: &GoalColumns) -> Result<Self, RowError> {
        let impressions = count(row, "Impressions");
        let clicks = count(row, "Clicks");
        let cost = coerce_number(row.get("Cost"));
        Ok(Self {
            date: parse_date(row)?,
            campaign_id: parse_id(row, "CampaignId")?,
            campaign_name: optional_text(row, "CampaignName").unwrap_or_default(),
            ad_network_type: required(row, "AdNetworkType")?.to_string(),
            impressions,
            clicks,
            cost,
            ctr: click_through_rate(clicks, impressions),
            avg_cpc: average_cpc(cost, clicks),
            purchases: goals.purchases(row),
            purchase_revenue: goals.purchase_revenue(row),
            leads: goals.leads(row),
        })
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            date_value(self.date),
            Value::Integer(self.campaign_id),
            Value::Text(self.campaign_name.clone()),
            Value::Text(self.ad_network_type.clone()),
            Value::Integer(self.impressions),
            Value::Integer(self.clicks),
            Value::Real(self.cost),
            Value::Real(self.ctr),
            Value::Real(self.avg_cpc),
            Value::Real(self.purchases),
            Value::Real(self.purchase_revenue),
            Value::Real(self.leads),
        ]
    }
}

/// Search query performance. Key: `(date, campaign_id, ad_group_id, query)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQueryRecord {
    pub date: NaiveDate,
    pub campaign_id: i64,
    pub ad_group_id: i64,
    pub query: String,
    pub criterion: Option<String>,
    pub impressions: i64,
    pub clicks: i64,
    pub cost: f64,
    pub ctr: f64,
    pub purchases: f64,
    pub leads: f64,
}

impl MetricRecord for SearchQueryRecord {
    const KIND: DatasetKind = DatasetKind::SearchQuery;
    const TABLE: &'static str = "search_query_stats";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "campaign_id",
        "ad_group_id",
        "query",
        "criterion",
        "impressions",
        "clicks",
        "cost",
        "ctr",
        "purchases",
        "leads",
    ];

    fn from_row(row: &ReportRow, goals: &GoalColumns) -> Result<Self, RowError> {
        let impressions = count(row, "Impressions");
        let clicks = count(row, "Clicks");
        Ok(Self {
            date: parse_date(row)?,
            campaign_id: parse_id(row, "CampaignId")?,
            ad_group_id: parse_id(row, "AdGroupId")?,
            query: required(row, "Query")?.to_string(),
            criterion: optional_text(row, "Criterion"),
            impressions,
            clicks,
            cost: coerce_number(row.get("Cost")),
            ctr: click_through_rate(clicks, impressions),
            purchases: goals.purchases(row),
            leads: goals.leads(row),
        })
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            date_value(self.date),
            Value::Integer(self.campaign_id),
            Value::Integer(self.ad_group_id),
            Value::Text(self.query.clone()),
            text_value(&self.criterion),
            Value::Integer(self.impressions),
            Value::Integer(self.clicks),
            Value::Real(self.cost),
            Value::Real(self.ctr),
            Value::Real(self.purchases),
            Value::Real(self.leads),
        ]
    }
}

/// Network placement performance. Key: `(date, campaign_id, placement)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRecord {
    pub date: NaiveDate,
    pub campaign_id: i64,
    pub placement: String,
    pub ad_network_type: Option<String>,
    pub impressions: i64,
    pub clicks: i64,
    pub cost: f64,
    pub ctr: f64,
    pub purchases: f64,
    pub leads: f64,
}

impl MetricRecord for PlacementRecord {
    const KIND: DatasetKind = DatasetKind::Placement;
    const TABLE: &'static str = "placement_stats";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "campaign_id",
        "placement",
        "ad_network_type",
        "impressions",
        "clicks",
        "cost",
        "ctr",
        "purchases",
        "leads",
    ];

    fn from_row(row: &ReportRow, goals: &GoalColumns) -> Result<Self, RowError> {
        let impressions = count(row, "Impressions");
        let clicks = count(row, "Clicks");
        Ok(Self {
            date: parse_date(row)?,
            campaign_id: parse_id(row, "CampaignId")?,
            placement: required(row, "Placement")?.to_string(),
            ad_network_type: optional_text(row, "AdNetworkType"),
            impressions,
            clicks,
            cost: coerce_number(row.get("Cost")),
            ctr: click_through_rate(clicks, impressions),
            purchases: goals.purchases(row),
            leads: goals.leads(row),
        })
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            date_value(self.date),
            Value::Integer(self.campaign_id),
            Value::Text(self.placement.clone()),
            text_value(&self.ad_network_type),
            Value::Integer(self.impressions),
            Value::Integer(self.clicks),
            Value::Real(self.cost),
            Value::Real(self.ctr),
            Value::Real(self.purchases),
            Value::Real(self.leads),
        ]
    }
}
