//! Packet handlers, registered once at boot by functional area.

pub mod auth;
pub mod character;
pub mod misc;
pub mod world;

use crate::router::PacketRouter;

pub fn register_all(router: &mut PacketRouter) {
    misc::register(router);
    auth::register(router);
    character::register(router);
    world::register(router);
    log::info!("Packet router initialized with {} handlers", router.handler_count());
}
