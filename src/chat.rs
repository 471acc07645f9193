use crate::config::FarmSmartConfig;
use crate::conversation::Conversation;
use crate::error::{FarmSmartError, Result};
use crate::llm::client::CompletionClient;
use crate::llm::extractor::{AnalysisOutcome, AnalyticsExtractor};
use crate::llm::prompts::assistant_system_prompt;
use crate::llm::types::CompletionRequest;
use crate::onboarding::{closing_prompt, Effect, OnboardingSession};
use crate::schema::{FarmInfo, Message};
use crate::store::{load_farm_info, ConversationStore, KeyValueStore, PendingWrite, PendingWrites};
use log::{debug, error, info, warn};
use std::sync::Arc;

pub const ANALYTICS_UNAVAILABLE_NOTE: &str =
    "(Chart data could not be generated for this analysis.)";

/// Services a session talks to, built once by the host application.
#[derive(Clone)]
pub struct ChatDependencies {
    pub client: Arc<dyn CompletionClient>,
    pub conversations: Arc<dyn ConversationStore>,
    pub values: Arc<dyn KeyValueStore>,
    pub config: FarmSmartConfig,
}

/// What one `send` added to the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatTurn {
    /// The user's message followed by every assistant message it produced.
    pub messages: Vec<Message>,
    /// Set when the assistant could not be reached during free chat.
    pub error: Option<String>,
}

impl ChatTurn {
    pub fn replies(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().skip(1)
    }
}

pub struct ChatSession {
    deps: ChatDependencies,
    user_id: String,
    conversation: Conversation,
    onboarding: OnboardingSession,
    extractor: AnalyticsExtractor,
    pending: PendingWrites,
}

impl ChatSession {
    /// Resumes `conversation_id` or starts a fresh conversation. A user with
    /// no stored farm details is greeted with the first intake question.
    pub async fn open(
        deps: ChatDependencies,
        user_id: impl Into<String>,
        conversation_id: Option<&str>,
    ) -> Result<Self> {
        let user_id = user_id.into();

        let mut conversation = match conversation_id {
            Some(id) => {
                let conversation = deps.conversations.load(id).await?;
                if conversation.user_id != user_id {
                    return Err(FarmSmartError::ConversationNotFound(id.to_string()));
                }
                conversation
            }
            None => Conversation::new(&user_id),
        };

        let farm_info = match load_farm_info(deps.values.as_ref(), &user_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Could not load farm details for {}: {}", user_id, e);
                None
            }
        };

        let onboarding = match farm_info {
            Some(info) => {
                debug!("Farm details found for {}, skipping intake", user_id);
                if conversation.farm_info.is_none() {
                    conversation.farm_info = Some(info.clone());
                }
                OnboardingSession::completed(info)
            }
            None => {
                let transition = OnboardingSession::new().begin();
                conversation.extend(transition.messages);
                transition.session
            }
        };

        let extractor = AnalyticsExtractor::new(deps.client.clone(), &deps.config);
        let pending = PendingWrites::new(deps.config.persistence.max_write_retries);

        Ok(Self {
            deps,
            user_id,
            conversation,
            onboarding,
            extractor,
            pending,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn onboarding(&self) -> &OnboardingSession {
        &self.onboarding
    }

    pub fn farm_info(&self) -> Option<&FarmInfo> {
        self.onboarding
            .is_complete()
            .then_some(&self.onboarding.farm_info)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Writes still waiting for the store.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Handles one user message end to end. Only an empty free-chat message
    /// is rejected; upstream and storage failures are absorbed into the turn.
    pub async fn send(&mut self, text: &str, image: Option<String>) -> Result<ChatTurn> {
        if self.onboarding.is_complete() && text.trim().is_empty() && image.is_none() {
            return Err(FarmSmartError::InvalidInput("Message is empty".to_string()));
        }

        self.flush_pending().await;

        let mut turn = ChatTurn::default();
        self.append(&mut turn, Message::user(text, image));
        self.conversation.title_from_first_message();

        if self.onboarding.is_complete() {
            self.free_chat(&mut turn).await;
        } else {
            self.onboard(&mut turn, text).await;
        }

        self.pending
            .push(PendingWrite::Conversation(self.conversation.clone()));
        self.flush_pending().await;

        Ok(turn)
    }

    fn append(&mut self, turn: &mut ChatTurn, message: Message) {
        self.conversation.push(message);
        if let Some(appended) = self.conversation.last_message() {
            turn.messages.push(appended.clone());
        }
    }

    async fn onboard(&mut self, turn: &mut ChatTurn, text: &str) {
        let transition = self.onboarding.clone().advance(text);
        self.onboarding = transition.session;

        for message in transition.messages {
            self.append(turn, message);
        }

        let mut analysed = false;
        for effect in transition.effects {
            match effect {
                Effect::PersistFarmInfo(farm_info) => {
                    info!("Intake complete for {} ({})", self.user_id, farm_info.farm_name);
                    self.conversation.farm_info = Some(farm_info.clone());
                    self.pending.push(PendingWrite::FarmInfo {
                        user_id: self.user_id.clone(),
                        farm_info,
                    });
                }
                Effect::RunAnalysis(context) => {
                    analysed = true;
                    match self.extractor.analyze(&context).await {
                        Ok(outcome) => self.append(turn, analysis_message(outcome)),
                        Err(e) => error!("Profit analysis failed, continuing without it: {}", e),
                    }
                }
            }
        }

        if analysed {
            self.append(turn, closing_prompt());
            let persona = assistant_system_prompt(Some(&self.onboarding.farm_info));
            self.conversation.ensure_system_prompt(persona);
        }
    }

    async fn free_chat(&mut self, turn: &mut ChatTurn) {
        let persona = assistant_system_prompt(self.farm_info());
        self.conversation.ensure_system_prompt(persona.clone());
        let system = self
            .conversation
            .system_message()
            .map(|m| m.content.clone())
            .unwrap_or(persona);

        let chat = &self.deps.config.chat;
        let completion = &self.deps.config.completion;
        let messages = self
            .conversation
            .completion_messages(&system, chat.max_context_messages);
        let request = CompletionRequest::from_messages(&messages)
            .with_temperature(completion.chat_temperature)
            .with_max_tokens(completion.max_tokens);

        match self.deps.client.complete(request).await {
            Ok(reply) => self.append(turn, Message::assistant(reply)),
            Err(e) => {
                error!("Chat completion failed: {}", e);
                turn.error = Some(error_banner(&e));
                let fallback = Message::assistant(chat.fallback_reply.clone());
                self.append(turn, fallback);
            }
        }
    }

    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let left = self
            .pending
            .flush(self.deps.conversations.as_ref(), self.deps.values.as_ref())
            .await;
        if left > 0 {
            warn!("{} writes waiting for the store", left);
        }
    }
}

fn analysis_message(outcome: AnalysisOutcome) -> Message {
    let content = match outcome.analytics {
        Some(_) => outcome.text,
        None => format!("{}\n\n{}", outcome.text.trim_end(), ANALYTICS_UNAVAILABLE_NOTE),
    };
    Message::assistant(content).with_analytics(outcome.analytics)
}

fn error_banner(error: &FarmSmartError) -> String {
    match error.completion_kind() {
        Some(kind) => format!("The assistant is unavailable right now ({}). Please try again.", kind),
        None => "The assistant is unavailable right now. Please try again.".to_string(),
    }
}
