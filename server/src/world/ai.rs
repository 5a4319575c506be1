//! NPC AI tick: aggro scans, chase with leash, melee swings, evade, and
//! the idle movement modes (stand, wander, waypoint patrol).

use duskmere_core::defines::npc::Movement;
use duskmere_core::defines::object::Variable;
use duskmere_core::defines::unit::Faction;
use rand::Rng;

use crate::combat::auras;
use crate::combat::spells;
use crate::context::Ctx;
use crate::packets;
use crate::world::npc::{AiState, LEASH_DISTANCE, MELEE_RANGE};

/// Arrival tolerance for waypoints and evade returns.
const ARRIVE_TOLERANCE: f32 = 24.0;
/// Seconds between wander hops, with jitter on top.
const WANDER_PERIOD_MS: i32 = 4000;
/// Radius within which a call for help drags in linked packs.
const HELP_RADIUS: f32 = 480.0;

pub fn update_npcs(ctx: &mut Ctx, dt_secs: f32) {
    let dt_ms = (dt_secs * 1000.0) as i32;

    for guid in ctx.world.all_npc_guids() {
        let state = match ctx.world.npc(guid) {
            Some(npc) if npc.core.spawned => npc.ai_state,
            _ => continue,
        };

        match state {
            AiState::Dead | AiState::Despawned => {}
            AiState::Idle | AiState::Wandering => {
                if !try_aggro(ctx, guid) {
                    idle_movement(ctx, guid, dt_secs, dt_ms);
                }
            }
            AiState::Combat | AiState::Chasing => {
                combat_tick(ctx, guid, dt_secs, dt_ms);
            }
            AiState::Evading => {
                evade_tick(ctx, guid, dt_secs);
            }
        }
    }
}

/// Scan for a hostile player inside the aggro radius; on a hit, seed
/// threat, enter combat, and possibly call nearby pack members for help.
fn try_aggro(ctx: &mut Ctx, guid: u32) -> bool {
    let (map_id, x, y, aggro_radius, entry, faction, call_for_help) = {
        let Some(npc) = ctx.world.npc(guid) else {
            return false;
        };
        if auras::is_stunned(&npc.core) {
            return false;
        }
        let Some(template) = ctx.data.get_npc(npc.entry) else {
            return false;
        };
        if template.faction != Faction::Hostile || template.aggro_radius <= 0.0 {
            return false;
        }
        (
            npc.core.map_id,
            npc.core.x,
            npc.core.y,
            template.aggro_radius,
            npc.entry,
            template.faction,
            npc.call_for_help && !npc.called_for_help,
        )
    };
    debug_assert_eq!(faction, Faction::Hostile);

    let victim = ctx
        .world
        .players_on_map(map_id)
        .into_iter()
        .find(|&player_guid| {
            ctx.world
                .player(player_guid)
                .map(|p| !p.core.dead && p.core.distance_to(x, y) <= aggro_radius)
                .unwrap_or(false)
        });

    let Some(victim) = victim else {
        return false;
    };

    engage(ctx, guid, victim);

    if call_for_help {
        if let Some(npc) = ctx.world.npc_mut(guid) {
            npc.called_for_help = true;
        }
        // Nearby idle packmates of the same entry join in.
        for helper in ctx.world.npcs_on_map(map_id) {
            if helper == guid {
                continue;
            }
            let joins = ctx
                .world
                .npc(helper)
                .map(|n| {
                    n.entry == entry
                        && n.is_alive()
                        && matches!(n.ai_state, AiState::Idle | AiState::Wandering)
                        && n.core.distance_to(x, y) <= HELP_RADIUS
                })
                .unwrap_or(false);
            if joins {
                engage(ctx, helper, victim);
            }
        }
    }

    true
}

fn engage(ctx: &mut Ctx, guid: u32, victim: u32) {
    if let Some(npc) = ctx.world.npc_mut(guid) {
        npc.threat.add(victim, 1);
        npc.ai_state = AiState::Combat;
        npc.core.set_var(Variable::InCombat, 1);
    }
    let frame = packets::aggro_mob(guid, victim);
    ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
}

fn combat_tick(ctx: &mut Ctx, guid: u32, dt_secs: f32, dt_ms: i32) {
    let stunned = ctx
        .world
        .npc(guid)
        .map(|n| auras::is_stunned(&n.core))
        .unwrap_or(true);

    // Pick the highest-threat live target.
    let target = {
        let world = &ctx.world;
        let Some(npc) = world.npc(guid) else {
            return;
        };
        npc.threat.highest(|candidate| {
            world
                .entity_core(candidate)
                .map(|core| !core.dead && core.map_id == npc.core.map_id)
                .unwrap_or(false)
        })
    };

    let Some(target) = target else {
        start_evade(ctx, guid);
        return;
    };

    let (home_distance, target_distance, attack_ready, rooted, move_speed, attack_period) = {
        let Some(npc) = ctx.world.npc(guid) else {
            return;
        };
        let Some(target_core) = ctx.world.entity_core(target) else {
            return;
        };
        let template = ctx.data.get_npc(npc.entry);
        (
            npc.core.distance_to(npc.home_x, npc.home_y),
            npc.core.distance_to_entity(target_core),
            npc.attack_timer_ms <= 0,
            auras::is_rooted(&npc.core),
            template.map(|t| t.move_speed).unwrap_or(150.0),
            template.map(|t| t.attack_period_ms).unwrap_or(2000),
        )
    };

    if home_distance > LEASH_DISTANCE {
        start_evade(ctx, guid);
        return;
    }

    if let Some(npc) = ctx.world.npc_mut(guid) {
        npc.attack_timer_ms = (npc.attack_timer_ms - dt_ms).max(0);
    }

    if stunned {
        return;
    }

    if target_distance <= MELEE_RANGE {
        if attack_ready {
            if let Some(npc) = ctx.world.npc_mut(guid) {
                npc.attack_timer_ms = attack_period;
            }
            if let Some((tx, ty)) = ctx.world.entity_core(target).map(|c| (c.x, c.y)) {
                if let Some(core) = ctx.world.entity_core_mut(guid) {
                    core.orient_towards(tx, ty);
                }
            }
            spells::npc_melee_attack(ctx, guid, target);
        }
    } else if !rooted {
        let (tx, ty) = match ctx.world.entity_core(target) {
            Some(core) => (core.x, core.y),
            None => return,
        };
        step_towards(ctx, guid, tx, ty, move_speed * dt_secs);
    }
}

fn start_evade(ctx: &mut Ctx, guid: u32) {
    if let Some(npc) = ctx.world.npc_mut(guid) {
        npc.ai_state = AiState::Evading;
        npc.threat.clear();
        npc.core.set_var(Variable::InCombat, 0);
    }
}

fn evade_tick(ctx: &mut Ctx, guid: u32, dt_secs: f32) {
    let (home_x, home_y, distance, move_speed) = {
        let Some(npc) = ctx.world.npc(guid) else {
            return;
        };
        let speed = ctx
            .data
            .get_npc(npc.entry)
            .map(|t| t.move_speed)
            .unwrap_or(150.0);
        (
            npc.home_x,
            npc.home_y,
            npc.core.distance_to(npc.home_x, npc.home_y),
            speed,
        )
    };

    if distance <= ARRIVE_TOLERANCE {
        // Home again: full restore, back to normal behavior.
        if let Some(npc) = ctx.world.npc_mut(guid) {
            let max_health = npc.core.max_health();
            let max_mana = npc.core.max_mana();
            npc.core.set_var(Variable::Health, max_health);
            npc.core.set_var(Variable::Mana, max_mana);
            npc.called_for_help = false;
            npc.ai_state = match npc.movement {
                Movement::Random => AiState::Wandering,
                _ => AiState::Idle,
            };
        }
        return;
    }

    // Evading NPCs return at a hurry and ignore walkability checks.
    move_entity(ctx, guid, home_x, home_y, move_speed * 2.0 * dt_secs, false);
}

fn idle_movement(ctx: &mut Ctx, guid: u32, dt_secs: f32, dt_ms: i32) {
    let (movement, rooted) = match ctx.world.npc(guid) {
        Some(npc) => (npc.movement, auras::is_rooted(&npc.core)),
        None => return,
    };
    if rooted {
        return;
    }

    match movement {
        Movement::None => {}
        Movement::Random => wander_tick(ctx, guid, dt_secs, dt_ms),
        Movement::Patrol => waypoint_tick(ctx, guid, dt_secs, dt_ms),
    }
}

fn wander_tick(ctx: &mut Ctx, guid: u32, dt_secs: f32, dt_ms: i32) {
    let (target, home_x, home_y, radius, speed, due) = {
        let Some(npc) = ctx.world.npc(guid) else {
            return;
        };
        let speed = ctx
            .data
            .get_npc(npc.entry)
            .map(|t| t.move_speed)
            .unwrap_or(150.0);
        (
            npc.wander_target,
            npc.home_x,
            npc.home_y,
            npc.wander_radius,
            speed,
            npc.wander_timer_ms <= 0,
        )
    };

    if let Some((tx, ty)) = target {
        let arrived = ctx
            .world
            .npc(guid)
            .map(|npc| npc.core.distance_to(tx, ty) <= ARRIVE_TOLERANCE)
            .unwrap_or(true);
        if arrived {
            if let Some(npc) = ctx.world.npc_mut(guid) {
                npc.wander_target = None;
            }
        } else {
            move_entity(ctx, guid, tx, ty, speed * dt_secs, true);
        }
        return;
    }

    if due && radius > 0.0 {
        // Pick a fresh destination around home every few seconds.
        let (dx, dy, jitter) = {
            let rng = &mut ctx.world.rng;
            (
                rng.gen_range(-radius..=radius),
                rng.gen_range(-radius..=radius),
                rng.gen_range(0..WANDER_PERIOD_MS),
            )
        };
        if let Some(npc) = ctx.world.npc_mut(guid) {
            npc.wander_timer_ms = WANDER_PERIOD_MS + jitter;
            npc.wander_target = Some((home_x + dx, home_y + dy));
        }
    } else if let Some(npc) = ctx.world.npc_mut(guid) {
        npc.wander_timer_ms -= dt_ms;
    }
}

fn waypoint_tick(ctx: &mut Ctx, guid: u32, dt_secs: f32, dt_ms: i32) {
    let (target, speed) = {
        let Some(npc) = ctx.world.npc_mut(guid) else {
            return;
        };
        if npc.waypoints.is_empty() {
            return;
        }
        if npc.waypoint_wait_ms > 0 {
            npc.waypoint_wait_ms -= dt_ms;
            return;
        }

        let wp = npc.waypoints[npc.waypoint_index % npc.waypoints.len()].clone();
        if npc.core.distance_to(wp.x, wp.y) <= ARRIVE_TOLERANCE {
            // Arrived: dwell, then advance to the next point.
            npc.waypoint_wait_ms = wp.wait_ms;
            npc.core.orientation = wp.orientation;
            npc.waypoint_index = (npc.waypoint_index + 1) % npc.waypoints.len();
            return;
        }
        let speed = ctx
            .data
            .get_npc(npc.entry)
            .map(|t| t.move_speed)
            .unwrap_or(150.0);
        ((wp.x, wp.y), speed)
    };

    move_entity(ctx, guid, target.0, target.1, speed * dt_secs, true);
}

fn step_towards(ctx: &mut Ctx, guid: u32, tx: f32, ty: f32, step: f32) {
    move_entity(ctx, guid, tx, ty, step, true);
}

/// Move an NPC one step towards a point, optionally refusing unwalkable
/// destinations, and broadcast the movement.
fn move_entity(ctx: &mut Ctx, guid: u32, tx: f32, ty: f32, step: f32, check_walkable: bool) {
    let (new_x, new_y, map_id) = {
        let Some(core) = ctx.world.entity_core(guid) else {
            return;
        };
        let dx = tx - core.x;
        let dy = ty - core.y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < f32::EPSILON {
            return;
        }
        let t = (step / distance).min(1.0);
        (core.x + dx * t, core.y + dy * t, core.map_id)
    };

    if check_walkable {
        if let Some(map) = ctx.maps.get_loaded(map_id) {
            if !map.is_walkable_world(new_x, new_y) {
                return;
            }
        }
    }

    if let Some(core) = ctx.world.entity_core_mut(guid) {
        core.orient_towards(tx, ty);
        core.set_position(new_x, new_y);
    }
    let frame = packets::unit_spline(guid, new_x, new_y, step);
    ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
}
