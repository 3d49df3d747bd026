#![forbid(unsafe_code)]

//! Interactive prompt flow: name, then create-or-join, then chat.

use roomchat_protocol::{ClientEnvelope, ServerEnvelope};

pub const NAME_REQUIRED: &str = "name must not be empty";
pub const INVALID_CHOICE: &str = "invalid choice";
pub const ROOM_KEY_REQUIRED: &str = "room key must not be empty";

/// Where the user currently is in the prompt flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptState {
	AwaitingName,
	AwaitingRoomChoice { name: String },
	AwaitingRoomKey { name: String },
	/// `createRoom` was sent; waiting for the key.
	AwaitingRoomKeyReply { name: String },
	/// `confirmed` is false between sending `joinRoom` and the first sign the join worked.
	Chatting { name: String, confirmed: bool },
}

/// What the caller should do after feeding a line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
	Send(ClientEnvelope),
	/// Show the notice and prompt again.
	Reprompt(&'static str),
	Idle,
}

#[derive(Debug, Clone)]
pub struct Prompt {
	state: PromptState,
}

impl Default for Prompt {
	fn default() -> Self {
		Self::new()
	}
}

impl Prompt {
	pub fn new() -> Self {
		Self {
			state: PromptState::AwaitingName,
		}
	}

	pub fn state(&self) -> &PromptState {
		&self.state
	}

	/// Text to show before reading the next line, if any.
	pub fn prompt_text(&self) -> Option<&'static str> {
		match self.state {
			PromptState::AwaitingName => Some("Enter your name: "),
			PromptState::AwaitingRoomChoice { .. } => Some("1) create a new room\n2) join an existing room\nchoice: "),
			PromptState::AwaitingRoomKey { .. } => Some("room key: "),
			PromptState::AwaitingRoomKeyReply { .. } => None,
			PromptState::Chatting { .. } => Some("> "),
		}
	}

	/// Feed one line of user input.
	pub fn on_input(&mut self, line: &str) -> Step {
		let input = line.trim();

		match &self.state {
			PromptState::AwaitingName => {
				if input.is_empty() {
					return Step::Reprompt(NAME_REQUIRED);
				}
				self.state = PromptState::AwaitingRoomChoice { name: input.to_string() };
				Step::Idle
			}
			PromptState::AwaitingRoomChoice { name } => match input {
				"1" => {
					let name = name.clone();
					self.state = PromptState::AwaitingRoomKeyReply { name: name.clone() };
					Step::Send(ClientEnvelope::CreateRoom { name })
				}
				"2" => {
					self.state = PromptState::AwaitingRoomKey { name: name.clone() };
					Step::Idle
				}
				_ => Step::Reprompt(INVALID_CHOICE),
			},
			PromptState::AwaitingRoomKey { name } => {
				if input.is_empty() {
					return Step::Reprompt(ROOM_KEY_REQUIRED);
				}
				let name = name.clone();
				self.state = PromptState::Chatting {
					name: name.clone(),
					confirmed: false,
				};
				Step::Send(ClientEnvelope::JoinRoom {
					name,
					room_key: input.to_string(),
				})
			}
			PromptState::AwaitingRoomKeyReply { .. } => Step::Idle,
			PromptState::Chatting { .. } => {
				// Message text keeps its inner whitespace; only all-blank lines are skipped.
				if input.is_empty() {
					return Step::Idle;
				}
				Step::Send(ClientEnvelope::Message {
					data: line.trim_end_matches(['\r', '\n']).to_string(),
				})
			}
		}
	}

	/// Feed one server envelope.
	pub fn on_server(&mut self, envelope: &ServerEnvelope) {
		let next = match (&self.state, envelope) {
			(PromptState::AwaitingRoomKeyReply { name }, ServerEnvelope::RoomKey { .. }) => PromptState::Chatting {
				name: name.clone(),
				confirmed: true,
			},
			(
				PromptState::Chatting {
					name,
					confirmed: false,
				},
				ServerEnvelope::Error { .. },
			) => PromptState::AwaitingRoomChoice { name: name.clone() },
			(
				PromptState::Chatting {
					name,
					confirmed: false,
				},
				ServerEnvelope::Message { .. },
			) => PromptState::Chatting {
				name: name.clone(),
				confirmed: true,
			},
			_ => return,
		};
		self.state = next;
	}
}
