//! Chat channel and error defines.

/// Chat channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    Say = 0,
    Yell = 1,
    Whisper = 2,
    Party = 3,
    Guild = 4,
    AllChat = 5,
    System = 6,
}

impl Channel {
    pub fn from_id(id: u8) -> Option<Channel> {
        Some(match id {
            0 => Channel::Say,
            1 => Channel::Yell,
            2 => Channel::Whisper,
            3 => Channel::Party,
            4 => Channel::Guild,
            5 => Channel::AllChat,
            6 => Channel::System,
            _ => return None,
        })
    }

    /// Broadcast radius in world units; `None` means channel-wide.
    pub fn radius(self) -> Option<f32> {
        match self {
            Channel::Say => Some(640.0),
            Channel::Yell => Some(1920.0),
            _ => None,
        }
    }
}

/// Chat delivery failure codes (`Server_ChatError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChatError {
    None = 0,
    ChatIgnored = 1,
    PlayerNotFound = 9,
}
