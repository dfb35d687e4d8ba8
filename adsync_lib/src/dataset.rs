//! Dataset definitions for the synchronized reports.
//!
//! Field lists, filters and processing modes are opaque upstream configuration,
//! so they live in `seed_data/datasets.yml` and are embedded at compile time.

use std::fmt;

use adreports_api::{Filter, ProcessingMode, ReportDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::GoalColumns;
use crate::window::WindowClass;

/// Error types for dataset definition loading.
#[derive(Error, Debug)]
pub enum DatasetConfigError {
    #[error("Failed to parse dataset YAML: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("Dataset defined more than once: {0}")]
    Duplicate(DatasetKind),
    #[error("Dataset definition missing: {0}")]
    Missing(DatasetKind),
    #[error("Dataset {0} has no field names")]
    EmptyFields(DatasetKind),
}

/// The synchronized datasets, in the order a run loads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    CampaignDaily,
    SearchQuery,
    Placement,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [Self::CampaignDaily, Self::SearchQuery, Self::Placement];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CampaignDaily => "campaign_daily",
            Self::SearchQuery => "search_query",
            Self::Placement => "placement",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize, Debug)]
struct DatasetFile {
    datasets: Vec<DatasetSpec>,
}

/// One dataset's report configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct DatasetSpec {
    pub kind: DatasetKind,
    pub report_type: String,
    pub window: WindowClass,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
    pub field_names: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl DatasetSpec {
    /// Builds the upstream report definition, attaching goals only when the
    /// field list asks for per-goal columns.
    pub fn definition(&self, goals: &GoalColumns) -> ReportDefinition {
        let mut definition = ReportDefinition::new(self.kind.as_str(), &self.report_type)
            .with_fields(self.field_names.iter().cloned())
            .with_processing_mode(self.processing_mode);

        let wants_goals = self
            .field_names
            .iter()
            .any(|f| f == "Conversions" || f == "Revenue");
        if wants_goals {
            definition = definition
                .with_goals(goals.goal_ids())
                .with_attribution_model(goals.attribution_model());
        }

        for filter in &self.filters {
            definition = definition.with_filter(filter.clone());
        }
        definition
    }
}

/// Parses dataset definitions and returns them in run order.
///
/// Every [`DatasetKind`] must appear exactly once.
pub fn parse_datasets(yaml_content: &str) -> Result<Vec<DatasetSpec>, DatasetConfigError> {
    let file: DatasetFile = serde_yml::from_str(yaml_content)?;

    let mut specs: Vec<DatasetSpec> = Vec::with_capacity(DatasetKind::ALL.len());
    for spec in file.datasets {
        if specs.iter().any(|s| s.kind == spec.kind) {
            return Err(DatasetConfigError::Duplicate(spec.kind));
        }
        if spec.field_names.is_empty() {
            return Err(DatasetConfigError::EmptyFields(spec.kind));
        }
        specs.push(spec);
    }

    for kind in DatasetKind::ALL {
        if !specs.iter().any(|s| s.kind == kind) {
            return Err(DatasetConfigError::Missing(kind));
        }
    }

    specs.sort_by_key(|s| s.kind);
    Ok(specs)
}

/// Load dataset definitions from the embedded YAML file.
pub fn load_datasets() -> Result<Vec<DatasetSpec>, DatasetConfigError> {
    let yaml_content = include_str!("../../seed_data/datasets.yml");
    parse_datasets(yaml_content)
}
