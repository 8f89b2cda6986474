use serde::{Deserialize, Serialize};

pub const AGENT_AVATAR: &str = "/scoti_avatar.png";
pub const USER_AVATAR: &str = "/user_avatar.png";
pub const GREETING: &str = "Hello! How can I help you?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    User,
    Agent,
}

impl Origin {
    fn avatar(self) -> &'static str {
        match self {
            Origin::User => USER_AVATAR,
            Origin::Agent => AGENT_AVATAR,
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Origin::User => "**User**",
            Origin::Agent => "**Bot**",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub text: String,
    pub origin: Origin,
    pub avatar: String,
}

/// Append-only message sequence for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// A fresh conversation seeded with the agent greeting.
    pub fn new() -> Self {
        let mut conversation = Self {
            messages: Vec::new(),
            next_id: 1,
        };
        conversation.push(Origin::Agent, GREETING);
        conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, origin: Origin, text: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id,
            text: text.into(),
            origin,
            avatar: origin.avatar().to_string(),
        });
        id
    }

    /// Flat text rendering of every turn, in arrival order.
    pub fn render_transcript(&self) -> String {
        self.messages
            .iter()
            .map(|msg| format!("{}: {}", msg.origin.heading(), msg.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// One conversational round trip, built when the user submits the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sent_at: String,
    pub identity_subject: String,
    pub context_file_names: Vec<String>,
    pub user_text: String,
    pub template_kind: crate::TemplateKind,
    pub provider_hint: crate::ProviderHint,
}

/// The complete structured reply to a `QueryRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub received_at: String,
    pub status: String,
    pub reply_text: String,
}
