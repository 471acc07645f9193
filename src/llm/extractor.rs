use crate::config::{AnalyticsMode, FarmSmartConfig};
use crate::error::{ChartDecodeError, Result};
use crate::llm::client::CompletionClient;
use crate::llm::prompts::{analysis_prompt, chart_extraction_prompt, AnalysisContext};
use crate::llm::types::CompletionRequest;
use crate::normalizer::ChartNormalizer;
use crate::parser::AnalysisReport;
use crate::schema::AnalyticsBundle;
use crate::utils::clean_json_output;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Result of one profit-analysis round trip.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// The model's analysis, as shown to the farmer.
    pub text: String,
    pub report: AnalysisReport,
    /// Normalized chart data, absent when neither extraction path produced any.
    pub analytics: Option<AnalyticsBundle>,
}

/// Runs the analysis prompt and turns the reply into chart data.
///
/// Chart data comes from a second, JSON-only completion first; when that call
/// fails or its output does not decode, the analysis text itself is parsed.
/// Whatever comes out is normalized before it is returned.
pub struct AnalyticsExtractor {
    client: Arc<dyn CompletionClient>,
    mode: AnalyticsMode,
    analysis_temperature: f32,
    analysis_max_tokens: u32,
    chart_temperature: f32,
    chart_max_tokens: u32,
}

impl AnalyticsExtractor {
    pub fn new(client: Arc<dyn CompletionClient>, config: &FarmSmartConfig) -> Self {
        Self {
            client,
            mode: config.analytics.mode,
            analysis_temperature: config.completion.analysis_temperature,
            analysis_max_tokens: config.completion.analysis_max_tokens,
            chart_temperature: config.completion.chart_temperature,
            chart_max_tokens: config.completion.max_tokens,
        }
    }

    pub fn with_mode(mut self, mode: AnalyticsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fails only when the analysis completion itself fails. Missing chart
    /// data is reported as `analytics: None`.
    pub async fn analyze(&self, context: &AnalysisContext) -> Result<AnalysisOutcome> {
        info!("Running tool profit analysis for {}", context.farm_name);

        let prompt = analysis_prompt(context);
        let request = CompletionRequest::prompt(prompt.system, prompt.user)
            .with_temperature(self.analysis_temperature)
            .with_max_tokens(self.analysis_max_tokens);
        let text = self.client.complete(request).await?;

        let report = AnalysisReport::parse(&text);
        let analytics = self.extract_analytics(&text, &report).await;

        Ok(AnalysisOutcome {
            text,
            report,
            analytics,
        })
    }

    pub async fn extract_analytics(
        &self,
        analysis_text: &str,
        report: &AnalysisReport,
    ) -> Option<AnalyticsBundle> {
        let model_bundle = match self.mode {
            AnalyticsMode::ModelWithTextFallback => self.request_chart(analysis_text).await,
            AnalyticsMode::TextOnly => None,
        };

        let bundle = model_bundle.or_else(|| {
            debug!("Parsing chart data from the analysis text");
            report.to_bundle()
        });

        match bundle {
            Some(bundle) => {
                let (bundle, report) = ChartNormalizer::normalize_with_report(bundle);
                if !report.is_clean() {
                    info!("Chart data needed {} adjustments", report.adjustments.len());
                }
                Some(bundle)
            }
            None => {
                warn!("No chart data could be produced from the analysis");
                None
            }
        }
    }

    async fn request_chart(&self, analysis_text: &str) -> Option<AnalyticsBundle> {
        let prompt = chart_extraction_prompt(analysis_text);
        let request = CompletionRequest::prompt(prompt.system, prompt.user)
            .with_temperature(self.chart_temperature)
            .with_max_tokens(self.chart_max_tokens);

        let raw = match self.client.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Chart extraction request failed: {}", e);
                return None;
            }
        };

        match decode_chart_json(&raw) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

fn field<'a>(object: &'a Map<String, Value>, name: &str) -> std::result::Result<&'a Value, ChartDecodeError> {
    object
        .get(name)
        .ok_or_else(|| ChartDecodeError::Validation(format!("missing field '{}'", name)))
}

fn number_array(object: &Map<String, Value>, name: &str) -> std::result::Result<Vec<f64>, ChartDecodeError> {
    let values = field(object, name)?
        .as_array()
        .ok_or_else(|| ChartDecodeError::Validation(format!("'{}' is not an array", name)))?;

    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value.as_f64().ok_or_else(|| {
                ChartDecodeError::Validation(format!("'{}[{}]' is not a number: {}", name, i, value))
            })
        })
        .collect()
}

/// Strictly decodes a chart-extraction reply.
///
/// All five fields must be present with the right types, and the name and
/// profit series must line up. Range problems (low profits, a short or flat
/// projection) are left for the normalizer.
pub fn decode_chart_json(raw: &str) -> std::result::Result<AnalyticsBundle, ChartDecodeError> {
    let cleaned = clean_json_output(raw);
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| ChartDecodeError::Parse(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ChartDecodeError::Validation("top level is not an object".to_string()))?;

    let tillage_names = field(object, "tillageNames")?
        .as_array()
        .ok_or_else(|| ChartDecodeError::Validation("'tillageNames' is not an array".to_string()))?
        .iter()
        .enumerate()
        .map(|(i, name)| {
            name.as_str().map(str::to_string).ok_or_else(|| {
                ChartDecodeError::Validation(format!("'tillageNames[{}]' is not a string", i))
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let profits = number_array(object, "profits")?;
    let revenue = number_array(object, "revenue")?;
    let projected_profits = number_array(object, "projectedProfits")?;
    let break_even_point = field(object, "breakEvenPoint")?.as_f64().ok_or_else(|| {
        ChartDecodeError::Validation("'breakEvenPoint' is not a number".to_string())
    })?;

    if profits.is_empty() {
        return Err(ChartDecodeError::Validation("no profits".to_string()));
    }
    if tillage_names.len() != profits.len() {
        return Err(ChartDecodeError::Validation(format!(
            "{} tillage names but {} profits",
            tillage_names.len(),
            profits.len()
        )));
    }

    Ok(AnalyticsBundle {
        tillage_names,
        profits,
        revenue,
        projected_profits,
        break_even_point,
    })
}
