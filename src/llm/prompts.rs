// Prompt templates for free chat, tool-profit analysis and chart extraction

use crate::profiles::{find_profile, DEFAULT_SOIL_DESCRIPTION};
use crate::schema::{AnalyticsBundle, FarmInfo, FarmProfile};
use log::warn;

pub const FARMING_ASSISTANT_PERSONA: &str = "You are a knowledgeable farming assistant with expertise in plant and crop analysis. \
When provided with images, analyze them carefully and provide detailed insights about plant health, potential issues, and recommendations. \
Help users with questions about agriculture, crop management, soil health, and sustainable farming practices. \
Provide practical, actionable advice based on scientific principles.";

pub const SYSTEM_PROMPT_ANALYSIS: &str = r#"
You are an advanced agricultural AI assistant specializing in tillage economics.

## YOUR MISSION
Evaluate EVERY tillage tool in the JSON list provided under "My tools" and estimate
the profit of using that tool under the given farm conditions.

## FOR EACH TOOL
- An estimated profit in $ per acre, based on its operating or hire cost and the
  yield improvement you expect on this soil
- A one-line explanation of how you arrived at that estimate, noting whether the
  tool is over or under the stated budget

## THEN
1. Pick the best tool: the one with the HIGHEST estimated profit.
2. Recommend EXACTLY ONE external (third-party) tool that is not in the list and
   would make the operation more efficient. Give its purchase cost, the profit you
   predict it generates, and its weekly profit rate. Justify it using the soil
   description.

## OUTPUT FORMAT (MANDATORY)
End your reply with these four lines, each on its own line, exactly in this form.
Amounts are plain dollar figures such as $120 or $1,250.

Profits: tool1_name: estimated_profit, tool2_name: estimated_profit, ...
Explanations: tool1_name: explanation, tool2_name: explanation, ...
External Tool: tool_name: tool_cost, predicted_profit, weekly_profit_rate
External Explanation: Why the tool is efficient for this farm and soil.

Use the tool names EXACTLY as they appear in the list. Never add commentary inside
these four lines.
"#;

pub const SYSTEM_PROMPT_CHART_EXTRACTION: &str = r#"
You convert a farm tool profit analysis into chart data.

## RULES
- Respond with ONE JSON object and nothing else: no prose, no code fences.
- Fields: tillageNames, profits, revenue, projectedProfits, breakEvenPoint.
- tillageNames, profits and revenue are parallel arrays: entry i of each describes
  the same tool, in the order the analysis lists them.
- Every profit and every revenue value MUST be a positive number (never 0, never
  negative, never a string).
- revenue[i] MUST be greater than profits[i] for every i.
- projectedProfits MUST contain exactly 6 numbers: the cumulative weekly profit of
  the recommended external tool, trending upward.
- breakEvenPoint is the external tool's cost. The last projectedProfits value MUST
  be at least 1.2 times breakEvenPoint.
"#;

/// System and user text for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Farm facts the analysis prompt is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisContext {
    pub farm_name: String,
    pub location: String,
    pub budget: String,
    /// Tool list as structured text (pretty JSON for bundled profiles).
    pub tools: String,
    pub soil_description: String,
    pub fertilizers: String,
    pub pesticides: String,
    pub total_area_acres: Option<f64>,
}

impl AnalysisContext {
    pub fn from_profile(profile: &FarmProfile, farm_info: &FarmInfo) -> Self {
        let tools = profile.tools_json().unwrap_or_else(|e| {
            warn!("Could not serialize tools for {}: {}", profile.name, e);
            farm_info.tools_available.clone()
        });

        Self {
            farm_name: profile.name.clone(),
            location: profile.location.clone(),
            budget: farm_info.budget.clone(),
            tools,
            soil_description: profile.soil_or_default().to_string(),
            fertilizers: farm_info.fertilizers_available.clone(),
            pesticides: farm_info.pesticides_available.clone(),
            total_area_acres: profile.total_area_acres,
        }
    }

    /// Uses the bundled profile when the farm name matches one, otherwise the
    /// free-form answers with a placeholder soil description.
    pub fn from_farm_info(farm_info: &FarmInfo) -> Self {
        if let Some(profile) = find_profile(&farm_info.farm_name) {
            return Self::from_profile(profile, farm_info);
        }

        Self {
            farm_name: farm_info.farm_name.clone(),
            location: farm_info.location.clone(),
            budget: farm_info.budget.clone(),
            tools: farm_info.tools_available.clone(),
            soil_description: DEFAULT_SOIL_DESCRIPTION.to_string(),
            fertilizers: farm_info.fertilizers_available.clone(),
            pesticides: farm_info.pesticides_available.clone(),
            total_area_acres: None,
        }
    }
}

/// Persona for free chat, grounded in the farmer's intake answers when known.
pub fn assistant_system_prompt(farm_info: Option<&FarmInfo>) -> String {
    match farm_info {
        Some(info) => format!(
            "{}\n\nThe farmer you are helping has shared this profile:\n{}\n\
             Tailor every recommendation to this farm.",
            FARMING_ASSISTANT_PERSONA,
            info.summary()
        ),
        None => FARMING_ASSISTANT_PERSONA.to_string(),
    }
}

pub fn analysis_prompt(context: &AnalysisContext) -> PromptPair {
    let mut user = format!(
        "My farm is {}. My location is {}. My budget is {}.\n\
         My tools are:\n{}\n\
         My fertilizers are {}. My pesticides are {}.\n",
        context.farm_name,
        context.location,
        context.budget,
        context.tools,
        context.fertilizers,
        context.pesticides,
    );

    if let Some(area) = context.total_area_acres {
        user.push_str(&format!(
            "The total area I am working with is {} acres.\n",
            area
        ));
    }

    user.push_str(&format!(
        "The description of my soil is: {}\n\n",
        context.soil_description
    ));

    if let Some(area) = context.total_area_acres {
        user.push_str(&format!(
            "Before the final lines, break the tillage project into a day-by-day schedule under a \
             'Schedule:' heading, one line per day in the form \
             'Day N: tool_name(s), area_covered, estimated costs of the day, estimated profits of the day'. \
             The areas MUST add up to {} acres.\n\n",
            area
        ));
    }

    user.push_str(
        "Estimate the per-acre profit of every tool above, pick the most profitable one, \
         and recommend one external tool, following the output format exactly.",
    );

    PromptPair {
        system: SYSTEM_PROMPT_ANALYSIS.trim().to_string(),
        user,
    }
}

pub fn chart_extraction_prompt(analysis_text: &str) -> PromptPair {
    let schema = AnalyticsBundle::schema_as_json().unwrap_or_else(|e| {
        warn!("Could not render chart schema: {}", e);
        String::new()
    });

    let mut system = SYSTEM_PROMPT_CHART_EXTRACTION.trim().to_string();
    if !schema.is_empty() {
        system.push_str("\n\n## JSON SCHEMA\n");
        system.push_str(&schema);
    }

    let user = format!(
        "Extract the chart data from this analysis:\n\n{}\n\n\
         Return ONLY the JSON object, e.g.\n\
         {{\"tillageNames\": [\"Tool A\", \"Tool B\"], \"profits\": [120, 95], \"revenue\": [220, 195], \
         \"projectedProfits\": [500, 1000, 1500, 2000, 2500, 3000], \"breakEvenPoint\": 2500}}",
        analysis_text.trim()
    );

    PromptPair { system, user }
}
