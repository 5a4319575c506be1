//! Authentication handlers.

use anyhow::Result;

use duskmere_core::opcodes;
use duskmere_core::packet_buffer::PacketBuffer;

use crate::context::Ctx;
use crate::db::accounts::{self, LoginResult};
use crate::packets;
use crate::router::PacketRouter;
use crate::session::SessionState;
use crate::session_manager::kick_duplicate_login;

pub fn register(router: &mut PacketRouter) {
    router.register(
        opcodes::CL_AUTHENTICATE,
        handle_authenticate,
        SessionState::Connected,
        false,
    );
}

fn handle_authenticate(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let username = buf.read_string();
    let password = buf.read_string();

    if username.is_empty() || buf.underrun() {
        ctx.sessions
            .send(session_id, &packets::auth_result(packets::AUTH_BAD_CREDENTIALS, 0));
        return Ok(());
    }

    match accounts::authenticate(ctx.db, &username, &password)? {
        LoginResult::Ok(account) => {
            // An account may hold only one live session; the older one is
            // evicted before this one proceeds.
            kick_duplicate_login(ctx, account.id, "Logged in from another location");

            if let Some(session) = ctx.sessions.get_mut(session_id) {
                session.set_authenticated(account.id, &account.username, account.gm_level);
            }
            ctx.sessions
                .send(session_id, &packets::auth_result(packets::AUTH_OK, account.id));
        }
        LoginResult::BadCredentials => {
            log::info!("Session {session_id}: failed login for '{username}'");
            ctx.sessions
                .send(session_id, &packets::auth_result(packets::AUTH_BAD_CREDENTIALS, 0));
        }
    }
    Ok(())
}
