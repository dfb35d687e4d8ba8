//! Report definitions and their wire representation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How the upstream should generate the report.
///
/// `Online` reports are built while the request waits, `Offline` reports are
/// always queued, and `Auto` lets the upstream decide based on size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    #[default]
    Auto,
    Online,
    Offline,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Comparison applied by a selection filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    LessThan,
    GreaterThan,
}

/// A single selection filter, e.g. `Impressions GREATER_THAN 0`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(field: &str, operator: FilterOperator, values: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Everything about a report except its date window.
///
/// The same definition is reused for every window; the window is supplied
/// when the request body is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDefinition {
    name_prefix: String,
    report_type: String,
    field_names: Vec<String>,
    goals: Vec<String>,
    attribution_models: Vec<String>,
    filters: Vec<Filter>,
    processing_mode: ProcessingMode,
}

impl ReportDefinition {
    pub fn new(name_prefix: &str, report_type: &str) -> Self {
        Self {
            name_prefix: name_prefix.to_string(),
            report_type: report_type.to_string(),
            field_names: Vec::new(),
            goals: Vec::new(),
            attribution_models: Vec::new(),
            filters: Vec::new(),
            processing_mode: ProcessingMode::default(),
        }
    }

    /// Sets the output columns, in the order they should appear.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_names = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the goal ids whose conversions should be broken out per column.
    pub fn with_goals<I>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        self.goals = goals.into_iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_attribution_model(mut self, model: &str) -> Self {
        self.attribution_models = vec![model.to_string()];
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.processing_mode = mode;
        self
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub fn report_type(&self) -> &str {
        &self.report_type
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        self.processing_mode
    }

    /// Upstream caches reports by name, so a name reused with the same
    /// parameters returns the old report and one reused with different
    /// parameters is rejected. The request time makes each fetch distinct;
    /// polls within one fetch must keep the name they started with.
    pub fn report_name(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        requested_at: DateTime<Utc>,
    ) -> String {
        format!(
            "{} {}..{} {}",
            self.name_prefix,
            from,
            to,
            requested_at.format("%Y%m%dT%H%M%S%.6f")
        )
    }

    /// Builds the JSON request body for the given window.
    pub fn to_request_body(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        report_name: &str,
    ) -> serde_json::Value {
        let body = RequestBody {
            params: Params {
                selection_criteria: SelectionCriteria {
                    date_from: from.format("%Y-%m-%d").to_string(),
                    date_to: to.format("%Y-%m-%d").to_string(),
                    filter: self
                        .filters
                        .iter()
                        .map(|f| WireFilter {
                            field: f.field.clone(),
                            operator: f.operator,
                            values: f.values.clone(),
                        })
                        .collect(),
                },
                goals: self.goals.clone(),
                attribution_models: self.attribution_models.clone(),
                field_names: self.field_names.clone(),
                report_name: report_name.to_string(),
                report_type: self.report_type.clone(),
                date_range_type: "CUSTOM_DATE",
                format: "TSV",
                include_vat: "YES",
            },
        };
        // Plain structs of strings never fail to serialize.
        serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Serialize)]
struct RequestBody {
    params: Params,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Params {
    selection_criteria: SelectionCriteria,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    goals: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attribution_models: Vec<String>,
    field_names: Vec<String>,
    report_name: String,
    report_type: String,
    date_range_type: &'static str,
    format: &'static str,
    #[serde(rename = "IncludeVAT")]
    include_vat: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SelectionCriteria {
    date_from: String,
    date_to: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    filter: Vec<WireFilter>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireFilter {
    field: String,
    operator: FilterOperator,
    values: Vec<String>,
}
