//! # Chat Example
//!
//! A user directory folded from profile and chat events, with two derived
//! channels:
//!
//! - `nameChanges`: one [`NameChange`] per rename, carrying the previous name
//! - `chatLines`: one [`ChatLine`] per message, carrying the author's current
//!   name and every name they used before
//!
//! Both channels are published from the same fold, so a chat line always
//! shows the name that was current when the message was sent.

use std::collections::BTreeMap;
use streamfold_core::{Channel, Derived, Emitter, ReduceError, SplitReducer};

/// A registered user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Contact address, empty until set
    pub email: String,
}

/// Chat state: users plus the names each one used before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    /// Number of events folded
    pub events: u64,
    /// Users by id
    pub users: BTreeMap<String, User>,
    /// Previous names by user id, oldest first
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl ChatState {
    /// Names `user_id` went by before the current one.
    #[must_use]
    pub fn aliases_of(&self, user_id: &str) -> &[String] {
        self.aliases.get(user_id).map_or(&[], Vec::as_slice)
    }
}

/// Input events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Set a user's name, registering the user if new
    SetName {
        /// Target user
        user_id: String,
        /// New display name
        name: String,
    },
    /// Set a user's email, registering the user if new
    SetEmail {
        /// Target user
        user_id: String,
        /// New address
        email: String,
    },
    /// A message from an existing user
    Message {
        /// Author
        user_id: String,
        /// Message text
        text: String,
    },
}

impl ChatEvent {
    /// Shorthand for [`ChatEvent::SetName`]
    #[must_use]
    pub fn set_name(user_id: &str, name: &str) -> Self {
        Self::SetName {
            user_id: user_id.to_string(),
            name: name.to_string(),
        }
    }

    /// Shorthand for [`ChatEvent::Message`]
    #[must_use]
    pub fn message(user_id: &str, text: &str) -> Self {
        Self::Message {
            user_id: user_id.to_string(),
            text: text.to_string(),
        }
    }
}

/// The derived channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatChannel {
    /// Renames
    NameChanges,
    /// Messages
    ChatLines,
}

impl Channel for ChatChannel {
    const ALL: &'static [Self] = &[Self::NameChanges, Self::ChatLines];

    fn name(self) -> &'static str {
        match self {
            Self::NameChanges => "nameChanges",
            Self::ChatLines => "chatLines",
        }
    }
}

/// A rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChange {
    /// Previous name; absent when the user was new
    pub old: Option<String>,
    /// Name after the change
    pub new: String,
}

/// A message as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Message text
    pub message: String,
    /// Author's name at the time
    pub name: String,
    /// Author's earlier names, oldest first
    pub aka: Vec<String>,
}

/// Everything the chat reducer emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutput {
    /// Published on [`ChatChannel::NameChanges`]
    NameChange(NameChange),
    /// Published on [`ChatChannel::ChatLines`]
    ChatLine(ChatLine),
}

impl Derived for ChatOutput {
    type Channel = ChatChannel;

    fn channel(&self) -> ChatChannel {
        match self {
            Self::NameChange(_) => ChatChannel::NameChanges,
            Self::ChatLine(_) => ChatChannel::ChatLines,
        }
    }
}

/// Folds [`ChatEvent`]s and emits [`ChatOutput`]s.
///
/// A message from an unknown user is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatReducer;

impl SplitReducer for ChatReducer {
    type State = ChatState;
    type Event = ChatEvent;
    type Output = ChatOutput;

    fn reduce(
        &self,
        state: &mut ChatState,
        event: &ChatEvent,
        emit: &mut Emitter<ChatOutput>,
    ) -> Result<(), ReduceError> {
        state.events += 1;

        match event {
            ChatEvent::SetName { user_id, name } => {
                let user = state.users.entry(user_id.clone()).or_insert_with(|| User {
                    id: user_id.clone(),
                    ..User::default()
                });
                let old = (!user.name.is_empty()).then(|| user.name.clone());
                user.name.clone_from(name);

                if let Some(old) = &old {
                    state
                        .aliases
                        .entry(user_id.clone())
                        .or_default()
                        .push(old.clone());
                }
                emit.emit(ChatOutput::NameChange(NameChange {
                    old,
                    new: name.clone(),
                }));
            },
            ChatEvent::SetEmail { user_id, email } => {
                let user = state.users.entry(user_id.clone()).or_insert_with(|| User {
                    id: user_id.clone(),
                    ..User::default()
                });
                user.email.clone_from(email);
            },
            ChatEvent::Message { user_id, text } => {
                let user = state
                    .users
                    .get(user_id)
                    .ok_or_else(|| ReduceError::new(format!("User does not exist: {user_id}")))?;
                emit.emit(ChatOutput::ChatLine(ChatLine {
                    message: text.clone(),
                    name: user.name.clone(),
                    aka: state.aliases_of(user_id).to_vec(),
                }));
            },
        }
        Ok(())
    }
}

/// The four-event conversation used by the demo binary.
#[must_use]
pub fn conversation(user_id: &str) -> Vec<ChatEvent> {
    vec![
        ChatEvent::set_name(user_id, "geon"),
        ChatEvent::message(user_id, "hello"),
        ChatEvent::set_name(user_id, "neon"),
        ChatEvent::message(user_id, "world"),
    ]
}
