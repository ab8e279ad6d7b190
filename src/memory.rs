//! Conversation memory
//!
//! Per-user advisory conversation history, trimmed to the most recent
//! exchanges and replayed to the remote model as prior turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::classifier::Intent;
use crate::remote::PromptMessage;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Advisor,
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    pub intent: Option<Intent>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: String, intent: Option<Intent>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            intent,
        }
    }

    fn to_prompt(&self) -> PromptMessage {
        match self.role {
            MessageRole::User => PromptMessage::user(self.content.clone()),
            MessageRole::Advisor => PromptMessage::assistant(self.content.clone()),
        }
    }
}

/// Conversation history for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: VecDeque<ConversationMessage>,
}

impl ConversationHistory {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: VecDeque::new(),
        }
    }

    pub fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push_back(message);
        self.updated_at = Utc::now();
    }

    pub fn messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    /// Drop the oldest messages until at most `keep_count` remain
    pub fn trim_to_recent(&mut self, keep_count: usize) {
        while self.messages.len() > keep_count {
            self.messages.pop_front();
        }
        self.updated_at = Utc::now();
    }

}

/// In-process store of conversation histories keyed by user.
/// Bounded to `max_users` histories.
pub struct ConversationMemory {
    histories: RwLock<HashMap<Uuid, ConversationHistory>>,
    max_turns: usize,
    max_users: usize,
}

impl ConversationMemory {
    /// `max_turns` counts user/advisor exchanges, two messages each
    pub fn new(max_turns: usize, max_users: usize) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            max_turns,
            max_users: max_users.max(1),
        }
    }

    pub async fn record_exchange(
        &self,
        user_id: Uuid,
        user_message: &str,
        advisor_reply: &str,
        intent: Intent,
    ) {
        let mut histories = self.histories.write().await;
        if !histories.contains_key(&user_id) && histories.len() >= self.max_users {
            evict_least_recent(&mut histories);
        }

        let history = histories
            .entry(user_id)
            .or_insert_with(|| ConversationHistory::new(user_id));

        history.add_message(ConversationMessage::new(
            MessageRole::User,
            user_message.to_string(),
            Some(intent),
        ));
        history.add_message(ConversationMessage::new(
            MessageRole::Advisor,
            advisor_reply.to_string(),
            Some(intent),
        ));
        history.trim_to_recent(self.max_turns * 2);
    }

    /// Prior turns, oldest first, as prompt messages
    pub async fn recent_prompt(&self, user_id: Uuid) -> Vec<PromptMessage> {
        let histories = self.histories.read().await;
        histories
            .get(&user_id)
            .map(|h| h.messages().map(ConversationMessage::to_prompt).collect())
            .unwrap_or_default()
    }
}

fn evict_least_recent(histories: &mut HashMap<Uuid, ConversationHistory>) {
    let oldest = histories
        .values()
        .min_by_key(|h| h.updated_at)
        .map(|h| h.user_id);

    if let Some(user_id) = oldest {
        debug!(user_id = %user_id, "Evicting conversation history");
        histories.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ChatRole;
    use std::time::Duration;

    #[test]
    fn test_trim_to_recent() {
        let mut history = ConversationHistory::new(Uuid::new_v4());
        for i in 0..10 {
            history.add_message(ConversationMessage::new(
                MessageRole::User,
                format!("Вопрос {}", i),
                None,
            ));
        }
        history.trim_to_recent(4);
        assert_eq!(history.messages().count(), 4);
        assert_eq!(history.messages().next().unwrap().content, "Вопрос 6");
    }

    #[tokio::test]
    async fn test_memory_keeps_recent_turns() {
        let memory = ConversationMemory::new(2, 100);
        let user = Uuid::new_v4();

        for i in 0..5 {
            memory
                .record_exchange(user, &format!("q{}", i), &format!("a{}", i), Intent::General)
                .await;
        }

        let prompt = memory.recent_prompt(user).await;
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].content, "q3");
        assert_eq!(prompt[0].role, ChatRole::User);
        assert_eq!(prompt[3].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_memory_is_per_user() {
        let memory = ConversationMemory::new(6, 100);
        let alice = Uuid::new_v4();
        memory.record_exchange(alice, "привет", "салам", Intent::Greeting).await;

        assert!(memory.recent_prompt(Uuid::new_v4()).await.is_empty());
        assert_eq!(memory.recent_prompt(alice).await.len(), 2);
        assert_eq!(memory.histories.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_evicts_least_recent_user() {
        let memory = ConversationMemory::new(6, 2);
        let (first, second, third) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        for (user, message) in [(first, "q"), (second, "q"), (first, "q2"), (third, "q")] {
            memory.record_exchange(user, message, "a", Intent::General).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(memory.histories.read().await.len(), 2);
        assert!(memory.recent_prompt(second).await.is_empty());
        assert_eq!(memory.recent_prompt(first).await.len(), 4);
        assert_eq!(memory.recent_prompt(third).await.len(), 2);
    }

    #[tokio::test]
    async fn test_reads_do_not_track_users() {
        let memory = ConversationMemory::new(6, 10);
        for _ in 0..100 {
            assert!(memory.recent_prompt(Uuid::new_v4()).await.is_empty());
        }
        assert_eq!(memory.histories.read().await.len(), 0);
    }
}
