use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One entry of a conversation. Never edited once it is in a log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Opaque image reference (URL or `data:` URI) sent alongside the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        rename = "analyticsData",
        skip_serializing_if = "Option::is_none"
    )]
    pub analytics: Option<AnalyticsBundle>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image: None,
            timestamp: Utc::now(),
            analytics: None,
        }
    }

    pub fn user(content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            image,
            ..Self::new(Role::User, content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn with_analytics(mut self, analytics: Option<AnalyticsBundle>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Farm details gathered during onboarding, one field per intake question.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FarmInfo {
    pub farm_name: String,
    pub location: String,
    pub budget: String,
    pub tools_available: String,
    pub fertilizers_available: String,
    pub pesticides_available: String,
}

impl FarmInfo {
    /// Short multi-line description used to ground the assistant persona.
    pub fn summary(&self) -> String {
        format!(
            "Farm: {}\nLocation: {}\nBudget: {}\nFertilizers: {}\nPesticides: {}",
            self.farm_name,
            self.location,
            self.budget,
            self.fertilizers_available,
            self.pesticides_available
        )
    }
}

/// A tillage implement the farmer already owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct OwnedImplement {
    pub name: String,
    #[serde(rename = "type")]
    pub implement_type: String,
    pub working_speed_mph: f64,
    pub soil_type: String,
    pub width_ft: f64,
    pub operating_cost_per_acre: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

/// A tillage pass bought from a co-op or contractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct HiredService {
    pub name: String,
    pub hired_resource: String,
    pub cost_per_acre: f64,
    pub tillage_mechanism: String,
    pub estimated_time_hours_per_acre: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

/// Candidate implement or service. The two shapes are told apart by which
/// cost field is present, so the wire format stays untagged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum TillageOption {
    Owned(OwnedImplement),
    Hired(HiredService),
}

impl TillageOption {
    pub fn name(&self) -> &str {
        match self {
            Self::Owned(owned) => &owned.name,
            Self::Hired(hired) => &hired.name,
        }
    }

    pub fn cost_per_acre(&self) -> f64 {
        match self {
            Self::Owned(owned) => owned.operating_cost_per_acre,
            Self::Hired(hired) => hired.cost_per_acre,
        }
    }

    pub fn is_hired(&self) -> bool {
        matches!(self, Self::Hired(_))
    }

    /// Recorded total cost, or per-acre cost times the worked area.
    pub fn total_cost(&self, area_acres: Option<f64>) -> Option<f64> {
        let recorded = match self {
            Self::Owned(owned) => owned.total_cost,
            Self::Hired(hired) => hired.total_cost,
        };
        recorded.or_else(|| area_acres.map(|area| self.cost_per_acre() * area))
    }
}

/// A bundled farm definition the user can pick instead of typing details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FarmProfile {
    pub name: String,
    pub location: String,
    pub soil_description: String,
    pub total_area_acres: Option<f64>,
    pub tillage_options: Vec<TillageOption>,
}

/// Numeric series behind the profit, revenue and projection charts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsBundle {
    #[schemars(
        description = "Tillage tool names, in the same order as `profits` and `revenue`."
    )]
    pub tillage_names: Vec<String>,

    #[schemars(
        description = "Estimated profit per acre for each tool in USD. Every value must be a positive number."
    )]
    pub profits: Vec<f64>,

    #[schemars(
        description = "Estimated revenue per acre for each tool in USD. Each revenue must be greater than the matching profit."
    )]
    pub revenue: Vec<f64>,

    #[schemars(
        description = "Exactly 6 projected cumulative profit values for the recommended external tool, one per week, trending upward. The last value must be at least 1.2 times the break-even point."
    )]
    pub projected_profits: Vec<f64>,

    #[schemars(
        description = "Cost of the recommended external tool in USD, i.e. the amount its profits must recover."
    )]
    pub break_even_point: f64,
}

impl AnalyticsBundle {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalyticsBundle)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
