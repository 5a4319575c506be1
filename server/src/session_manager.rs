//! Session registry: lookup by connection id and account id, the per-tick
//! timeout sweep, duplicate-login eviction, and the player teardown path.
//!
//! The registry is owned and touched only by the world thread, so lookups
//! need no lock; iteration copies ids to a local list before calling back
//! into anything that may mutate the registry.

use std::collections::HashMap;

use duskmere_core::defines::chat::Channel;

use crate::context::Ctx;
use crate::db::characters::save_snapshot;
use crate::packets;
use crate::session::{Session, SessionState};

#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<u32, Session>,
    next_id: u32,
}

impl SessionManager {
    pub fn new() -> SessionManager {
        SessionManager {
            sessions: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn create(&mut self, now: i64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(id, Session::new(id, now));
        log::info!("Session {id} created");
        id
    }

    pub fn remove(&mut self, id: u32) {
        if self.sessions.remove(&id).is_some() {
            log::info!("Session {id} removed");
        }
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// The active session holding this account, if any is at least
    /// authenticated.
    pub fn find_by_account(&self, account_id: i32) -> Option<u32> {
        self.sessions
            .values()
            .find(|s| {
                s.account_id == account_id
                    && !s.is_disconnecting()
                    && s.state() != SessionState::Connected
            })
            .map(|s| s.id())
    }

    pub fn ids(&self) -> Vec<u32> {
        self.sessions.keys().copied().collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Queue a frame on one session; drops silently when the session is
    /// gone or disconnecting.
    pub fn send(&mut self, id: u32, frame: &[u8]) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.queue_frame(frame);
        }
    }
}

// ---------------------------------------------------------------------------
//  Teardown orchestration
// ---------------------------------------------------------------------------

/// Tear down a session's player: despawn with broadcasts, queue the final
/// save, drop the entity, and fall back to character select if the socket
/// is still live. Idempotent, and tolerates a player that never finished
/// spawning.
pub fn clear_player(ctx: &mut Ctx, session_id: u32) {
    let Some(session) = ctx.sessions.get_mut(session_id) else {
        return;
    };
    let guid = session.player_guid;
    if guid == 0 {
        return;
    }
    session.player_guid = 0;

    // Despawn first so observers stop seeing the entity, then capture the
    // save, then drop.
    ctx.world.despawn_player(guid, ctx.sessions);
    if let Some(player) = ctx.world.remove_player(guid) {
        let snapshot = player.snapshot();
        let db = ctx.db.clone();
        let name = player.core.name.clone();
        ctx.saver.queue(Box::new(move || {
            save_snapshot(&db, &snapshot)?;
            log::debug!("Saved player '{name}' on logout");
            Ok(())
        }));
    }

    if let Some(session) = ctx.sessions.get_mut(session_id) {
        if session.state() == SessionState::InWorld && session.is_connected() {
            session.set_state(SessionState::Authenticated);
        }
    }
}

/// Begin disconnecting a session: the reason goes out as a system chat
/// message ahead of the state flip, then the player is torn down. The next
/// sweep removes the session once the socket has drained or died.
pub fn disconnect_session(ctx: &mut Ctx, session_id: u32, reason: &str) {
    let Some(session) = ctx.sessions.get_mut(session_id) else {
        return;
    };
    if session.is_disconnecting() {
        return;
    }
    if !reason.is_empty() {
        session.queue_frame_raw(&packets::chat_msg(Channel::System as u8, 0, "", reason));
    }
    session.begin_disconnect(reason);
    clear_player(ctx, session_id);
}

/// Evict any session already holding this account.
pub fn kick_duplicate_login(ctx: &mut Ctx, account_id: i32, reason: &str) {
    if let Some(existing) = ctx.sessions.find_by_account(account_id) {
        log::info!("Session {existing}: kicked for duplicate login (account {account_id})");
        disconnect_session(ctx, existing, reason);
    }
}

pub fn disconnect_all(ctx: &mut Ctx, reason: &str) {
    let ids = ctx.sessions.ids();
    log::info!("Disconnecting all {} sessions: {}", ids.len(), reason);
    for id in ids {
        disconnect_session(ctx, id, reason);
    }
}

/// Per-tick sweep: disconnect timed-out sessions by lifecycle-specific
/// rules and remove dead ones.
pub fn sweep(ctx: &mut Ctx, now: i64) {
    for id in ctx.sessions.ids() {
        let timed_out = match ctx.sessions.get(id) {
            Some(session) => !session.is_disconnecting() && session.is_timed_out(now),
            None => continue,
        };
        if timed_out {
            disconnect_session(ctx, id, "Connection timeout");
        }
    }

    for id in ctx.sessions.ids() {
        let should_remove = ctx
            .sessions
            .get(id)
            .map(|s| s.should_remove())
            .unwrap_or(false);
        if should_remove {
            // A socket that died without a clean logout still owns a
            // player; tear it down before dropping the session.
            clear_player(ctx, id);
            ctx.sessions.remove(id);
        }
    }
}
