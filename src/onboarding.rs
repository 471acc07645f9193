use crate::llm::prompts::AnalysisContext;
use crate::profiles::profile_for_selection;
use crate::schema::{FarmInfo, FarmProfile, Message};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const OTHER_FARM: &str = "Other Farm";
pub const NOT_APPLICABLE: &str = "N/A";
pub const INVALID_SELECTION_NOTICE: &str = "Please reply with 1, 2 or 3 to choose a farm.";
pub const CLOSING_PROMPT: &str =
    "Is there anything else I can help you with on your farm today? You can also send me a photo of your crops.";

/// The intake questions, in the order they are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Question {
    FarmSelection,
    Location,
    Budget,
    Tools,
    Fertilizers,
    Pesticides,
}

impl Question {
    pub const ALL: [Question; 6] = [
        Question::FarmSelection,
        Question::Location,
        Question::Budget,
        Question::Tools,
        Question::Fertilizers,
        Question::Pesticides,
    ];

    pub fn index(&self) -> usize {
        match self {
            Self::FarmSelection => 0,
            Self::Location => 1,
            Self::Budget => 2,
            Self::Tools => 3,
            Self::Fertilizers => 4,
            Self::Pesticides => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn next(&self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::FarmSelection => {
                "Welcome to FarmSmart! Which farm would you like help with?\n\
                 1. Illinois State Farm\n\
                 2. North Dakota State Farm\n\
                 3. Other (I'll enter my own details)\n\
                 Reply with 1, 2 or 3."
            }
            Self::Location => "Where is your farm located?",
            Self::Budget => "What is your budget for tillage this season?",
            Self::Tools => "Which tillage tools or services do you have available? (Reply N/A if none)",
            Self::Fertilizers => "Which fertilizers do you have available? (Reply N/A if none)",
            Self::Pesticides => "Which pesticides do you have available? (Reply N/A if none)",
        }
    }

    /// The `FarmInfo` field this question fills, by its persisted name.
    pub fn key(&self) -> &'static str {
        match self {
            Self::FarmSelection => "farmName",
            Self::Location => "location",
            Self::Budget => "budget",
            Self::Tools => "toolsAvailable",
            Self::Fertilizers => "fertilizersAvailable",
            Self::Pesticides => "pesticidesAvailable",
        }
    }

    fn record(&self, farm_info: &mut FarmInfo, answer: String) {
        let slot = match self {
            Self::FarmSelection => &mut farm_info.farm_name,
            Self::Location => &mut farm_info.location,
            Self::Budget => &mut farm_info.budget,
            Self::Tools => &mut farm_info.tools_available,
            Self::Fertilizers => &mut farm_info.fertilizers_available,
            Self::Pesticides => &mut farm_info.pesticides_available,
        };
        *slot = answer;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "question", rename_all = "snake_case")]
pub enum OnboardingStage {
    NotStarted,
    Asking(Question),
    Complete,
}

/// Work the caller must carry out after a transition, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Store the finished intake under the user's key.
    PersistFarmInfo(FarmInfo),
    /// Run the profit analysis; its reply goes between the acknowledgment and
    /// the closing prompt.
    RunAnalysis(AnalysisContext),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub session: OnboardingSession,
    pub messages: Vec<Message>,
    pub effects: Vec<Effect>,
}

/// Plain intake state. [`OnboardingSession::advance`] returns the next
/// session with the messages to show and the effects the caller must run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingSession {
    pub stage: OnboardingStage,
    pub farm_info: FarmInfo,
}

impl Default for OnboardingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl OnboardingSession {
    pub fn new() -> Self {
        Self {
            stage: OnboardingStage::NotStarted,
            farm_info: FarmInfo::default(),
        }
    }

    /// A session for a user whose intake was persisted earlier.
    pub fn completed(farm_info: FarmInfo) -> Self {
        Self {
            stage: OnboardingStage::Complete,
            farm_info,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage == OnboardingStage::Complete
    }

    pub fn current_question(&self) -> Option<Question> {
        match self.stage {
            OnboardingStage::Asking(question) => Some(question),
            _ => None,
        }
    }

    /// Moves to question 0 and emits its text.
    pub fn begin(self) -> Transition {
        match self.stage {
            OnboardingStage::NotStarted => ask(
                Self {
                    stage: OnboardingStage::Asking(Question::FarmSelection),
                    ..self
                },
                Question::FarmSelection,
            ),
            _ => unchanged(self),
        }
    }

    pub fn advance(self, input: &str) -> Transition {
        match self.stage {
            OnboardingStage::NotStarted => self.begin(),
            OnboardingStage::Complete => unchanged(self),
            OnboardingStage::Asking(Question::FarmSelection) => self.select_farm(input),
            OnboardingStage::Asking(question) => self.answer(question, input),
        }
    }

    fn select_farm(self, input: &str) -> Transition {
        let selection = input.trim();

        if let Some(profile) = profile_for_selection(selection) {
            debug!("Farm selection {} resolved to {}", selection, profile.name);
            let farm_info = farm_info_from_profile(profile);
            let context = AnalysisContext::from_profile(profile, &farm_info);
            return complete(farm_info, context);
        }

        if selection == "3" {
            let mut farm_info = self.farm_info;
            farm_info.farm_name = OTHER_FARM.to_string();
            return ask(
                Self {
                    stage: OnboardingStage::Asking(Question::Location),
                    farm_info,
                },
                Question::Location,
            );
        }

        debug!("Rejected farm selection {:?}", selection);
        Transition {
            messages: vec![
                Message::assistant(INVALID_SELECTION_NOTICE),
                Message::assistant(Question::FarmSelection.text()),
            ],
            session: self,
            effects: Vec::new(),
        }
    }

    /// Stores a non-blank answer exactly as typed.
    fn answer(self, question: Question, input: &str) -> Transition {
        if input.trim().is_empty() {
            return ask(self, question);
        }

        let mut farm_info = self.farm_info;
        question.record(&mut farm_info, input.to_string());

        match question.next() {
            Some(next) => ask(
                Self {
                    stage: OnboardingStage::Asking(next),
                    farm_info,
                },
                next,
            ),
            None => {
                let context = AnalysisContext::from_farm_info(&farm_info);
                complete(farm_info, context)
            }
        }
    }
}

fn ask(session: OnboardingSession, question: Question) -> Transition {
    Transition {
        session,
        messages: vec![Message::assistant(question.text())],
        effects: Vec::new(),
    }
}

fn unchanged(session: OnboardingSession) -> Transition {
    Transition {
        session,
        messages: Vec::new(),
        effects: Vec::new(),
    }
}

fn complete(farm_info: FarmInfo, context: AnalysisContext) -> Transition {
    Transition {
        messages: vec![acknowledgment(&farm_info)],
        effects: vec![
            Effect::PersistFarmInfo(farm_info.clone()),
            Effect::RunAnalysis(context),
        ],
        session: OnboardingSession::completed(farm_info),
    }
}

/// Intake answers for a bundled profile: the profile's location and tools,
/// everything the farmer was not asked set to "N/A".
pub fn farm_info_from_profile(profile: &FarmProfile) -> FarmInfo {
    let tools_available = profile.tools_json().unwrap_or_else(|e| {
        warn!("Could not serialize tools for {}: {}", profile.name, e);
        profile
            .tillage_options
            .iter()
            .map(|option| option.name())
            .collect::<Vec<_>>()
            .join(", ")
    });

    FarmInfo {
        farm_name: profile.name.clone(),
        location: profile.location.clone(),
        budget: NOT_APPLICABLE.to_string(),
        tools_available,
        fertilizers_available: NOT_APPLICABLE.to_string(),
        pesticides_available: NOT_APPLICABLE.to_string(),
    }
}

pub fn acknowledgment(farm_info: &FarmInfo) -> Message {
    Message::assistant(format!(
        "Thank you! I've saved the details for {}. Let me look at the profitability of your tillage options.",
        farm_info.farm_name
    ))
}

pub fn closing_prompt() -> Message {
    Message::assistant(CLOSING_PROMPT)
}
