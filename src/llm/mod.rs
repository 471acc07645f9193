pub mod client;
pub mod extractor;
pub mod prompts;
pub mod types;

pub use client::*;
pub use extractor::*;
pub use prompts::{AnalysisContext, PromptPair};
pub use types::*;
