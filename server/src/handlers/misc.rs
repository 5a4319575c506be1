//! Connection-level handlers valid in any live state.

use anyhow::Result;

use duskmere_core::opcodes;
use duskmere_core::packet_buffer::PacketBuffer;

use crate::context::Ctx;
use crate::packets;
use crate::router::PacketRouter;
use crate::session::{wall_now, SessionState};

pub fn register(router: &mut PacketRouter) {
    router.register(opcodes::MUTUAL_PING, handle_ping, SessionState::Connected, true);
    router.register(opcodes::CL_PING, handle_ping, SessionState::Connected, true);
}

fn handle_ping(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let sequence = buf.read_u32();
    if let Some(session) = ctx.sessions.get_mut(session_id) {
        session.touch_ping(wall_now());
        session.queue_frame(&packets::ping_reply(sequence));
    }
    Ok(())
}
