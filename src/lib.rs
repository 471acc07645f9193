//! # FarmSmart
//!
//! The conversational core of an AI farming assistant: a farm intake
//! questionnaire, tillage profit analysis through a language model, and chart
//! data that is repaired until it is always safe to draw.
//!
//! ## Core Concepts
//!
//! - **Onboarding**: six fixed questions, or a one-step pick of a bundled farm profile
//! - **Analysis**: the model estimates a profit per tool and recommends one external tool
//! - **Analytics**: profits, revenue, a six-week projection and a break-even point for charts
//! - **Normalization**: floors, revenue margins and projection repair so charts never see bad values
//! - **Conversation Log**: ordered messages with at most one system message
//!
//! ## Example
//!
//! ```rust,ignore
//! use farmsmart::*;
//! use std::sync::Arc;
//!
//! let config = FarmSmartConfig::load()?;
//! let store = Arc::new(JsonFileStore::open(&config.persistence.data_dir).await?);
//! let deps = ChatDependencies {
//!     client: Arc::new(OpenAiClient::new(&config.completion)?),
//!     conversations: store.clone(),
//!     values: store,
//!     config,
//! };
//!
//! let mut session = ChatSession::open(deps, "farmer-42", None).await?;
//! let turn = session.send("1", None).await?;
//! for reply in turn.replies() {
//!     println!("{}", reply.content);
//! }
//! ```

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod normalizer;
pub mod onboarding;
pub mod parser;
pub mod profiles;
pub mod schema;
pub mod store;
pub mod utils;

pub use chat::{ChatDependencies, ChatSession, ChatTurn};
pub use config::{AnalyticsMode, FarmSmartConfig};
pub use conversation::Conversation;
pub use error::{ChartDecodeError, CompletionFailureKind, FarmSmartError, Result};
pub use llm::{
    decode_chart_json, AnalysisContext, AnalysisOutcome, AnalyticsExtractor, CompletionClient,
    CompletionRequest, ModelVariant,
};
#[cfg(feature = "openai")]
pub use llm::{image_data_url, OpenAiClient};
pub use normalizer::{normalize_analytics, ChartNormalizer, NormalizationReport};
pub use onboarding::{Effect, OnboardingSession, OnboardingStage, Question, Transition};
pub use parser::{parse_analytics_text, AnalysisReport, ExternalTool, ToolProfit};
pub use profiles::{find_profile, predefined_farms, profile_for_selection};
pub use schema::*;
pub use store::{ConversationStore, JsonFileStore, KeyValueStore, MemoryStore};

use log::debug;

/// Parses an analysis reply and normalizes the result, without any model call.
pub fn analytics_from_text(text: &str) -> Option<AnalyticsBundle> {
    parse_analytics_text(text).map(ChartNormalizer::normalize)
}

/// Normalizes chart data and confirms every chart invariant holds.
pub fn process_with_verification(bundle: AnalyticsBundle) -> Result<AnalyticsBundle> {
    let (bundle, report) = ChartNormalizer::normalize_with_report(bundle);
    for adjustment in &report.adjustments {
        debug!("Normalization adjustment: {}", adjustment);
    }
    ChartNormalizer::verify(&bundle)?;
    Ok(bundle)
}
