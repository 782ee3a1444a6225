//! Chat room with a single shared quest, driven one tick at a time.

use std::collections::VecDeque;

use log::info;
use xlink::{Channel, TickHandler, Transport};

/// Author of announcements; never matches a client name, so everyone gets them.
pub const SERVER_NAME: &str = "[SERVER]";

pub const START_QUEST: &str = "\\start-quest";
pub const COMPLETE_QUEST: &str = "\\complete";

const PULL_PASS: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub user: String,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct ChatRoom {
    queue: VecDeque<UserMessage>,
    quest_winner: Option<String>,
    has_active_quest: bool,
}

impl ChatRoom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages queued during the current tick.
    #[cfg(test)]
    pub fn queue(&self) -> impl Iterator<Item = &UserMessage> {
        self.queue.iter()
    }

    #[cfg(test)]
    pub fn quest_winner(&self) -> Option<&str> {
        self.quest_winner.as_deref()
    }

    /// Turns one frame from `author` into a queued message.
    ///
    /// Empty frames are ignored. Returns whether anything was queued.
    pub fn handle_message(&mut self, author: &str, payload: &[u8]) -> bool {
        if payload.is_empty() {
            return false;
        }
        let text = String::from_utf8_lossy(payload);

        let message = match text.as_ref() {
            START_QUEST => {
                self.has_active_quest = true;
                self.quest_winner = None;
                announce(format!(
                    "{} started a quest. Type \"{}\" to complete it!",
                    author, COMPLETE_QUEST
                ))
            }
            COMPLETE_QUEST => announce(self.complete_quest(author)),
            _ => UserMessage {
                user: author.to_string(),
                content: text.into_owned(),
            },
        };

        info!("{}: {}", message.user, message.content);
        self.queue.push_back(message);
        true
    }

    fn complete_quest(&mut self, author: &str) -> String {
        if let Some(winner) = &self.quest_winner {
            return format!(
                "{} completed a quest, though {} has completed it before them!",
                author, winner
            );
        }
        if !self.has_active_quest {
            return format!("{} tried to complete a non-existent quest!", author);
        }

        self.quest_winner = Some(author.to_string());
        format!("{} completed the quest first!", author)
    }

    fn pull<T: Transport>(&mut self, client: &mut Channel<T>) {
        let Some(frame) = client.poll_non_blocking() else {
            return;
        };
        let author = client.to_string();
        self.handle_message(&author, &frame);
    }

    fn push<T: Transport>(&self, client: &mut Channel<T>) {
        for message in &self.queue {
            if client.name() == Some(message.user.as_str()) {
                continue;
            }
            if !client.send(message.content.as_bytes()) {
                break;
            }
        }
    }
}

fn announce(content: String) -> UserMessage {
    UserMessage {
        user: SERVER_NAME.to_string(),
        content,
    }
}

impl<T: Transport> TickHandler<T> for ChatRoom {
    fn on_connect(&mut self, client: &mut Channel<T>) {
        info!("A new client has connected: {}", client);
    }

    fn passes(&self) -> usize {
        2
    }

    fn visit(&mut self, pass: usize, client: &mut Channel<T>) {
        if pass == PULL_PASS {
            self.pull(client);
        } else {
            self.push(client);
        }
    }

    fn end_tick(&mut self) {
        self.queue.clear();
    }
}
