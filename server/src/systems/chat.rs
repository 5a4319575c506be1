//! Chat routing by channel, with per-sender rate limiting and ignore
//! lists. Range-limited channels reach only same-map players inside the
//! channel's radius.

use duskmere_core::defines::chat::{Channel, ChatError};

use crate::context::Ctx;
use crate::packets;

/// Messages allowed inside the rate window.
const RATE_LIMIT_MESSAGES: usize = 5;
/// Rate window in seconds.
const RATE_LIMIT_WINDOW_SECS: i64 = 10;
/// Longest accepted message.
const MAX_MESSAGE_LEN: usize = 255;

/// True when the sender has talked too much inside the window. Records the
/// message time on success.
fn check_rate_limit(timestamps: &mut std::collections::VecDeque<i64>, now: i64) -> bool {
    while let Some(&oldest) = timestamps.front() {
        if now - oldest >= RATE_LIMIT_WINDOW_SECS {
            timestamps.pop_front();
        } else {
            break;
        }
    }
    if timestamps.len() >= RATE_LIMIT_MESSAGES {
        return false;
    }
    timestamps.push_back(now);
    true
}

/// Route one chat message. `target_name` is only meaningful for whispers.
pub fn handle_chat(
    ctx: &mut Ctx,
    sender_guid: u32,
    channel: Channel,
    text: &str,
    target_name: &str,
    now: i64,
) {
    let text: String = text.chars().take(MAX_MESSAGE_LEN).collect();
    if text.trim().is_empty() {
        return;
    }

    let (session_id, sender_name, map_id, x, y) = {
        let Some(sender) = ctx.world.player_mut(sender_guid) else {
            return;
        };
        if !check_rate_limit(&mut sender.chat_timestamps, now) {
            let session_id = sender.session_id;
            ctx.sessions
                .send(session_id, &packets::chat_error(ChatError::ChatIgnored as u8));
            return;
        }
        (
            sender.session_id,
            sender.core.name.clone(),
            sender.core.map_id,
            sender.core.x,
            sender.core.y,
        )
    };

    let frame = packets::chat_msg(channel as u8, sender_guid, &sender_name, &text);

    match channel {
        Channel::Say | Channel::Yell => {
            let radius = channel.radius().unwrap_or(0.0);
            for guid in ctx.world.players_on_map(map_id) {
                let Some(player) = ctx.world.player(guid) else {
                    continue;
                };
                if player.ignore_list.contains(&sender_guid) {
                    continue;
                }
                if radius > 0.0 && player.core.distance_to(x, y) > radius {
                    continue;
                }
                ctx.sessions.send(player.session_id, &frame);
            }
        }
        Channel::Whisper => {
            let target = ctx
                .world
                .player_by_name(target_name)
                .map(|p| (p.guid(), p.session_id, p.ignore_list.contains(&sender_guid)));
            match target {
                Some((_, _, true)) => {
                    ctx.sessions
                        .send(session_id, &packets::chat_error(ChatError::ChatIgnored as u8));
                }
                Some((_, target_session, false)) => {
                    ctx.sessions.send(target_session, &frame);
                    // Echo to the sender so both sides log the whisper.
                    ctx.sessions.send(session_id, &frame);
                }
                None => {
                    ctx.sessions.send(
                        session_id,
                        &packets::chat_error(ChatError::PlayerNotFound as u8),
                    );
                }
            }
        }
        Channel::AllChat => {
            for guid in ctx.world.all_player_guids() {
                let Some(player) = ctx.world.player(guid) else {
                    continue;
                };
                if player.ignore_list.contains(&sender_guid) {
                    continue;
                }
                ctx.sessions.send(player.session_id, &frame);
            }
        }
        // Party and guild routing live with their subsystems; system
        // messages never originate from clients.
        Channel::Party | Channel::Guild | Channel::System => {}
    }
}

/// Toggle a GUID on the sender's ignore list.
pub fn set_ignore(ctx: &mut Ctx, player_guid: u32, target_guid: u32, ignored: bool) {
    if let Some(player) = ctx.world.player_mut(player_guid) {
        if ignored {
            player.ignore_list.insert(target_guid);
        } else {
            player.ignore_list.remove(&target_guid);
        }
    }
}

/// Deliver a server-originated system line to one player.
pub fn system_message(ctx: &mut Ctx, player_guid: u32, text: &str) {
    if let Some(player) = ctx.world.player(player_guid) {
        let session_id = player.session_id;
        ctx.sessions
            .send(session_id, &packets::chat_msg(Channel::System as u8, 0, "", text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn rate_limit_allows_burst_then_blocks() {
        let mut stamps = VecDeque::new();
        for _ in 0..RATE_LIMIT_MESSAGES {
            assert!(check_rate_limit(&mut stamps, 100));
        }
        assert!(!check_rate_limit(&mut stamps, 100));
    }

    #[test]
    fn rate_limit_window_slides() {
        let mut stamps = VecDeque::new();
        for _ in 0..RATE_LIMIT_MESSAGES {
            assert!(check_rate_limit(&mut stamps, 100));
        }
        assert!(!check_rate_limit(&mut stamps, 105));
        assert!(check_rate_limit(&mut stamps, 100 + RATE_LIMIT_WINDOW_SECS));
    }
}
