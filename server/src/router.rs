//! Opcode dispatch with session-state gating.
//!
//! Each functional area registers its handlers once at boot. A failure
//! inside a handler is contained here: it is logged with the session id
//! and handler name, and the world keeps running.

use std::collections::HashMap;

use duskmere_core::opcodes::opcode_name;
use duskmere_core::packet_buffer::PacketBuffer;

use crate::context::Ctx;
use crate::session::SessionState;

pub type HandlerFn = fn(&mut Ctx, u32, &mut PacketBuffer) -> anyhow::Result<()>;

struct HandlerEntry {
    handler: HandlerFn,
    required_state: SessionState,
    allow_higher_states: bool,
    name: &'static str,
}

#[derive(Default)]
pub struct PacketRouter {
    handlers: HashMap<u16, HandlerEntry>,
}

impl PacketRouter {
    pub fn new() -> PacketRouter {
        PacketRouter::default()
    }

    pub fn register(
        &mut self,
        opcode: u16,
        handler: HandlerFn,
        required_state: SessionState,
        allow_higher_states: bool,
    ) {
        self.handlers.insert(
            opcode,
            HandlerEntry {
                handler,
                required_state,
                allow_higher_states,
                name: opcode_name(opcode),
            },
        );
    }

    pub fn has_handler(&self, opcode: u16) -> bool {
        self.handlers.contains_key(&opcode)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn dispatch(&self, ctx: &mut Ctx, session_id: u32, opcode: u16, buf: &mut PacketBuffer) {
        let state = match ctx.sessions.get(session_id) {
            Some(session) => session.state(),
            None => return,
        };

        if state == SessionState::Disconnecting {
            log::debug!(
                "Session {session_id}: ignoring packet {} (disconnecting)",
                opcode_name(opcode)
            );
            return;
        }

        let Some(entry) = self.handlers.get(&opcode) else {
            log::warn!(
                "Session {session_id}: unknown opcode {opcode:#06x} ({})",
                opcode_name(opcode)
            );
            return;
        };

        if !check_state(state, entry.required_state, entry.allow_higher_states) {
            log::warn!(
                "Session {session_id}: invalid state for {} (state={}, required={})",
                entry.name,
                state.name(),
                entry.required_state.name()
            );
            return;
        }

        if let Some(session) = ctx.sessions.get_mut(session_id) {
            session.touch(crate::session::wall_now());
        }

        log::debug!(
            "Session {session_id}: handling {} (size={})",
            entry.name,
            buf.len()
        );

        if let Err(e) = (entry.handler)(ctx, session_id, buf) {
            // The session lives on; only the one action is lost.
            log::error!("Session {session_id}: error in handler {}: {e:#}", entry.name);
        }

        if buf.underrun() {
            log::warn!(
                "Session {session_id}: malformed frame for {} (payload underrun)",
                entry.name
            );
        }
    }
}

fn check_state(current: SessionState, required: SessionState, allow_higher: bool) -> bool {
    if current == required {
        return true;
    }
    if allow_higher {
        return current.level() >= required.level();
    }
    false
}
