//! Named summary schemas an LLM response must conform to.

use std::collections::BTreeMap;

use ai_client::StructuredOutput;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, ResearchResult};

/// A typed summary shape with its own semantic checks.
pub trait SummarySchema: JsonSchema + DeserializeOwned + Serialize + Default {
    const NAME: &'static str;

    /// Checks beyond what deserialisation enforces.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Registry entry: schema descriptor, default instance, validating constructor.
#[derive(Clone, Copy)]
pub struct SchemaEntry {
    pub name: &'static str,
    json_schema: fn() -> serde_json::Value,
    default_instance: fn() -> serde_json::Value,
    validate: fn(serde_json::Value) -> ResearchResult<serde_json::Value>,
}

impl SchemaEntry {
    pub fn of<T: SummarySchema>() -> Self {
        Self {
            name: T::NAME,
            json_schema: T::openai_schema,
            default_instance: default_value::<T>,
            validate: validate_value::<T>,
        }
    }

    pub fn json_schema(&self) -> serde_json::Value {
        (self.json_schema)()
    }

    pub fn default_instance(&self) -> serde_json::Value {
        (self.default_instance)()
    }

    /// Deserialise into the typed schema, run its checks, and re-serialise.
    pub fn validate(&self, raw: serde_json::Value) -> ResearchResult<serde_json::Value> {
        (self.validate)(raw)
    }
}

impl std::fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaEntry").field("name", &self.name).finish()
    }
}

fn default_value<T: SummarySchema>() -> serde_json::Value {
    serde_json::to_value(T::default()).unwrap_or(serde_json::Value::Null)
}

fn validate_value<T: SummarySchema>(raw: serde_json::Value) -> ResearchResult<serde_json::Value> {
    let invalid = |reason: String| ResearchError::Validation {
        schema: T::NAME.to_string(),
        reason,
    };
    let typed: T = serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?;
    typed.check().map_err(invalid)?;
    serde_json::to_value(&typed).map_err(|e| invalid(e.to_string()))
}

/// Name → schema lookup, populated at process start.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<&'static str, SchemaEntry>,
}

impl SchemaRegistry {
    pub fn with_defaults() -> Self {
        Self::default()
            .register::<MarketSummary>()
            .register::<ArticleSummary>()
    }

    pub fn register<T: SummarySchema>(mut self) -> Self {
        self.entries.insert(T::NAME, SchemaEntry::of::<T>());
        self
    }

    pub fn get(&self, name: &str) -> ResearchResult<&SchemaEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| ResearchError::UnknownSchema(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

// =============================================================================
// MarketSummary
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Asset,
    Sector,
    Macro,
    #[default]
    General,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetAnalysis {
    /// Ticker or asset identifier.
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SectorAnalysis {
    pub name: String,
    #[serde(default)]
    pub trends: Vec<String>,
    #[serde(default)]
    pub top_performers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MacroAnalysis {
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub implications: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metric {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Classified, quantitative analysis of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketSummary {
    pub analysis_type: AnalysisType,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub market_impact: String,
    #[serde(default)]
    pub trading_implications: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<SectorAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macro_view: Option<MacroAnalysis>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub sources: Vec<String>,
    /// Model confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl SummarySchema for MarketSummary {
    const NAME: &'static str = "MarketSummary";

    fn check(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("summary is empty".to_string());
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(format!("confidence {c} outside [0, 1]"));
            }
        }
        if self.analysis_type == AnalysisType::Asset && self.asset.is_none() {
            return Err("asset analysis without an asset section".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// ArticleSummary
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArticleSummary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl SummarySchema for ArticleSummary {
    const NAME: &'static str = "ArticleSummary";

    fn check(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("summary is empty".to_string());
        }
        Ok(())
    }
}
