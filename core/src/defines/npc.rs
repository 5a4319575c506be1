//! NPC defines shared with the client.

/// Default movement behavior from `npc_template.movement_type` /
/// `npc.movement_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Movement {
    /// Stand in place.
    None = 0,
    /// Wander randomly around the spawn point.
    Random = 1,
    /// Follow a waypoint path.
    Patrol = 2,
}

impl Movement {
    pub fn from_id(id: i32) -> Movement {
        match id {
            1 => Movement::Random,
            2 => Movement::Patrol,
            _ => Movement::None,
        }
    }
}
