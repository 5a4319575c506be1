//! Protocol-level identifiers shared with the client: entity variables,
//! unit stats, spell data, classes, error codes, quest and chat defines.

pub mod chat;
pub mod npc;
pub mod object;
pub mod player;
pub mod quest;
pub mod spell;
pub mod unit;
