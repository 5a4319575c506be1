//! One session per client connection: lifecycle state, authenticated
//! identity, the owned player GUID while in world, activity clocks, and
//! the socket with its stream buffers.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{SystemTime, UNIX_EPOCH};

use duskmere_core::packet_buffer::{extract_frame, FrameError, PacketBuffer};

/// Wall time in unix seconds, the timeline session timeouts run on.
pub fn wall_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticated,
    InWorld,
    Disconnecting,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Connected => "Connected",
            SessionState::Authenticated => "Authenticated",
            SessionState::InWorld => "InWorld",
            SessionState::Disconnecting => "Disconnecting",
        }
    }

    /// Numeric gate level for the router's allow-higher-states check.
    pub fn level(self) -> u8 {
        match self {
            SessionState::Disconnecting => 0,
            SessionState::Connected => 1,
            SessionState::Authenticated => 2,
            SessionState::InWorld => 3,
        }
    }
}

/// Seconds allowed to authenticate after connecting.
pub const AUTH_TIMEOUT_SECS: i64 = 30;
/// Seconds allowed in character select.
pub const CHAR_SELECT_TIMEOUT_SECS: i64 = 300;
/// Seconds between pings while in world.
pub const INWORLD_PING_TIMEOUT_SECS: i64 = 120;

pub struct Session {
    id: u32,
    socket: Option<TcpStream>,
    addr: Option<SocketAddr>,
    state: SessionState,
    pub account_id: i32,
    pub username: String,
    pub gm_level: i32,
    /// GUID of the player owned by this session while in world; 0 when
    /// none. The world registry owns the entity itself.
    pub player_guid: u32,
    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
    last_activity: i64,
    last_ping: i64,
    socket_dead: bool,
    marked_for_removal: bool,
    disconnect_reason: String,
}

impl Session {
    pub fn new(id: u32, now: i64) -> Session {
        Session {
            id,
            socket: None,
            addr: None,
            state: SessionState::Connected,
            account_id: 0,
            username: String::new(),
            gm_level: 0,
            player_guid: 0,
            recv_buf: Vec::new(),
            send_buf: Vec::new(),
            last_activity: now,
            last_ping: now,
            socket_dead: false,
            marked_for_removal: false,
            disconnect_reason: String::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_socket(&mut self, socket: TcpStream, addr: SocketAddr) {
        self.socket = Some(socket);
        self.addr = Some(addr);
        self.socket_dead = false;
    }

    pub fn remote_address(&self) -> String {
        self.addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some() && !self.socket_dead
    }

    // ------------------------------------------------------------------
    //  State
    // ------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_disconnecting(&self) -> bool {
        self.state == SessionState::Disconnecting
    }

    pub fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!(
                "Session {}: state change {} -> {}",
                self.id,
                self.state.name(),
                state.name()
            );
            self.state = state;
            self.touch(wall_now());
        }
    }

    pub fn set_authenticated(&mut self, account_id: i32, username: &str, gm_level: i32) {
        self.account_id = account_id;
        self.username = username.to_string();
        self.gm_level = gm_level;
        self.set_state(SessionState::Authenticated);
        log::info!(
            "Session {}: authenticated as '{}' (account {}){}",
            self.id,
            username,
            account_id,
            if gm_level > 0 { " [GM]" } else { "" }
        );
    }

    // ------------------------------------------------------------------
    //  Activity clocks
    // ------------------------------------------------------------------

    pub fn touch(&mut self, now: i64) {
        self.last_activity = now;
    }

    pub fn touch_ping(&mut self, now: i64) {
        self.last_ping = now;
        self.last_activity = now;
    }

    /// Lifecycle-specific timeout check.
    pub fn is_timed_out(&self, now: i64) -> bool {
        match self.state {
            SessionState::Connected => now - self.last_activity > AUTH_TIMEOUT_SECS,
            SessionState::Authenticated => now - self.last_activity > CHAR_SELECT_TIMEOUT_SECS,
            SessionState::InWorld => now - self.last_ping > INWORLD_PING_TIMEOUT_SECS,
            SessionState::Disconnecting => false,
        }
    }

    // ------------------------------------------------------------------
    //  Disconnect
    // ------------------------------------------------------------------

    /// Flag the session for teardown. Player cleanup is orchestrated by
    /// the session registry, which owns the world access this needs.
    pub fn begin_disconnect(&mut self, reason: &str) {
        if self.state == SessionState::Disconnecting {
            return;
        }
        self.disconnect_reason = reason.to_string();
        if reason.is_empty() {
            log::debug!("Session {} disconnecting", self.id);
        } else {
            log::info!("Session {} disconnecting: {}", self.id, reason);
        }
        self.set_state(SessionState::Disconnecting);
    }

    pub fn disconnect_reason(&self) -> &str {
        &self.disconnect_reason
    }

    pub fn mark_for_removal(&mut self) {
        self.marked_for_removal = true;
    }

    pub fn should_remove(&self) -> bool {
        if self.marked_for_removal {
            return true;
        }
        // Disconnecting with nothing left to flush, or a dead socket
        // either way.
        if self.state == SessionState::Disconnecting
            && (self.send_buf.is_empty() || !self.is_connected())
        {
            return true;
        }
        !self.is_connected()
    }

    // ------------------------------------------------------------------
    //  Stream pump
    // ------------------------------------------------------------------

    /// Queue an outbound frame. Sends are refused once disconnecting,
    /// except the disconnect notice itself queued by the registry.
    pub fn queue_frame(&mut self, frame: &[u8]) {
        if self.state == SessionState::Disconnecting {
            return;
        }
        self.queue_frame_raw(frame);
    }

    pub(crate) fn queue_frame_raw(&mut self, frame: &[u8]) {
        if !self.socket_dead {
            self.send_buf.extend_from_slice(frame);
        }
    }

    /// Non-blocking read into the reassembly buffer. Marks the socket dead
    /// on EOF or a hard error.
    pub fn pump_read(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match socket.read(&mut chunk) {
                Ok(0) => {
                    self.socket_dead = true;
                    if self.disconnect_reason.is_empty() {
                        self.disconnect_reason = "Connection closed by peer".to_string();
                    }
                    return;
                }
                Ok(n) => self.recv_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.socket_dead = true;
                    if self.disconnect_reason.is_empty() {
                        self.disconnect_reason = e.to_string();
                    }
                    return;
                }
            }
        }
    }

    /// Non-blocking flush of the outbound queue.
    pub fn pump_write(&mut self) {
        if self.send_buf.is_empty() {
            return;
        }
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        loop {
            if self.send_buf.is_empty() {
                return;
            }
            match socket.write(&self.send_buf) {
                Ok(0) => return,
                Ok(n) => {
                    self.send_buf.drain(..n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.socket_dead = true;
                    if self.disconnect_reason.is_empty() {
                        self.disconnect_reason = e.to_string();
                    }
                    return;
                }
            }
        }
    }

    /// Pull the next complete frame from the reassembly buffer. A framing
    /// violation kills the socket.
    pub fn next_frame(&mut self) -> Option<(u16, PacketBuffer)> {
        match extract_frame(&mut self.recv_buf) {
            Ok(frame) => frame,
            Err(e @ (FrameError::TooShort(_) | FrameError::TooLarge(_))) => {
                log::warn!("Session {}: {e}; closing stream", self.id);
                self.socket_dead = true;
                self.disconnect_reason = e.to_string();
                None
            }
        }
    }

    /// Test hook: feed raw bytes as if they had arrived on the wire.
    #[cfg(test)]
    pub(crate) fn inject_bytes(&mut self, bytes: &[u8]) {
        self.recv_buf.extend_from_slice(bytes);
    }

    /// Outbound bytes not yet flushed; tests decode these.
    pub fn pending_output(&self) -> &[u8] {
        &self.send_buf
    }

    pub fn take_pending_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duskmere_core::packet_buffer::PacketBuffer;

    fn session() -> Session {
        Session::new(1, 1_000)
    }

    #[test]
    fn state_levels_follow_the_gate_order() {
        assert_eq!(SessionState::Disconnecting.level(), 0);
        assert_eq!(SessionState::Connected.level(), 1);
        assert_eq!(SessionState::Authenticated.level(), 2);
        assert_eq!(SessionState::InWorld.level(), 3);
    }

    #[test]
    fn timeouts_are_state_specific() {
        let mut s = session();
        assert!(!s.is_timed_out(1_000 + AUTH_TIMEOUT_SECS));
        assert!(s.is_timed_out(1_000 + AUTH_TIMEOUT_SECS + 1));

        s.set_state(SessionState::Authenticated);
        s.touch(1_000);
        assert!(!s.is_timed_out(1_000 + AUTH_TIMEOUT_SECS + 1));
        assert!(s.is_timed_out(1_000 + CHAR_SELECT_TIMEOUT_SECS + 1));

        s.set_state(SessionState::InWorld);
        s.touch_ping(1_000);
        assert!(!s.is_timed_out(1_000 + INWORLD_PING_TIMEOUT_SECS));
        assert!(s.is_timed_out(1_000 + INWORLD_PING_TIMEOUT_SECS + 1));
    }

    #[test]
    fn disconnecting_never_times_out_again() {
        let mut s = session();
        s.begin_disconnect("test");
        assert!(!s.is_timed_out(i64::MAX));
    }

    #[test]
    fn begin_disconnect_is_idempotent() {
        let mut s = session();
        s.begin_disconnect("first");
        s.begin_disconnect("second");
        assert_eq!(s.disconnect_reason(), "first");
    }

    #[test]
    fn frames_parse_from_injected_bytes() {
        let mut s = session();
        let mut buf = PacketBuffer::new();
        buf.write_u32(77);
        s.inject_bytes(&buf.into_frame(0x0F));

        let (opcode, mut payload) = s.next_frame().unwrap();
        assert_eq!(opcode, 0x0F);
        assert_eq!(payload.read_u32(), 77);
        assert!(s.next_frame().is_none());
    }

    #[test]
    fn framing_violation_kills_the_session() {
        let mut s = session();
        s.inject_bytes(&[0x01, 0x00, 0xFF]);
        assert!(s.next_frame().is_none());
        assert!(s.should_remove());
    }

    #[test]
    fn sends_are_refused_once_disconnecting() {
        let mut s = session();
        // No socket attached: nothing buffers either way, but the state
        // gate is what matters here.
        s.begin_disconnect("bye");
        s.queue_frame(&[1, 2, 3]);
        assert!(s.pending_output().is_empty());
    }
}
