//! Experience gain and level-ups.
//!
//! Kill experience scales the NPC's base award by ±10% per level of
//! difference and drops to zero past the maximum delta. A level-up
//! re-applies the class/level stat table combined with equipment and aura
//! bonuses and broadcasts the results.

use duskmere_core::defines::object::{stat_variable, Variable};
use duskmere_core::defines::player::MAX_LEVEL_DIFF_EXP;
use duskmere_core::defines::unit::{Stat, PRIMARY_STATS};

use crate::combat::auras;
use crate::context::Ctx;
use crate::packets;

/// Per-kill award from the level gap. Symmetric ±10% per level, floored at
/// 10% of base, zero beyond the maximum delta on the low side.
pub fn calculate_kill_xp(player_level: i32, npc_level: i32, npc_base_xp: i32) -> i32 {
    if player_level <= 0 || npc_level <= 0 || npc_base_xp <= 0 {
        return 0;
    }
    let diff = npc_level - player_level;
    if diff <= -MAX_LEVEL_DIFF_EXP {
        return 0;
    }
    let multiplier = (1.0 + diff as f32 * 0.1).max(0.1);
    ((npc_base_xp as f32 * multiplier) as i32).max(1)
}

/// Recompute max health/mana and the stat block from the class/level
/// table plus the player's total bonuses, then broadcast the results.
pub fn apply_level_stats(ctx: &mut Ctx, player_guid: u32, preserve_current: bool) {
    let (class, level) = match ctx.world.player(player_guid) {
        Some(player) => (player.class, player.level()),
        None => return,
    };
    let Some(stats) = ctx.data.get_class_stats(class as u8, level) else {
        log::warn!(
            "Experience: missing class stats for class {} level {level}",
            class as u8
        );
        return;
    };

    let base = [
        (Stat::Strength, stats.strength),
        (Stat::Agility, stats.agility),
        (Stat::Willpower, stats.willpower),
        (Stat::Intelligence, stats.intelligence),
        (Stat::Courage, stats.courage),
    ];
    let max_health = stats.health;
    let max_mana = stats.mana;

    let Some(player) = ctx.world.player_mut(player_guid) else {
        return;
    };

    player.core.set_var(Variable::MaxHealth, max_health);
    player.core.set_var(Variable::MaxMana, max_mana);
    let new_health = if preserve_current {
        player.core.health().min(max_health)
    } else {
        max_health
    };
    let new_mana = if preserve_current {
        player.core.mana().min(max_mana)
    } else {
        max_mana
    };
    player.core.set_var(Variable::Health, new_health);
    player.core.set_var(Variable::Mana, new_mana);

    let mut totals = Vec::with_capacity(base.len() + 7);
    for (stat, base_value) in base {
        totals.push((stat, base_value));
    }
    // Derived combat stats have no class base; equipment and auras are
    // their only sources.
    for stat in [
        Stat::ArmorValue,
        Stat::WeaponValue,
        Stat::MeleeCritical,
        Stat::SpellCritical,
        Stat::DodgeRating,
        Stat::BlockRating,
        Stat::ParryRating,
        Stat::ResistFire,
        Stat::ResistFrost,
        Stat::ResistShadow,
        Stat::ResistHoly,
    ] {
        totals.push((stat, 0));
    }

    for (stat, base_value) in totals {
        let bonus = player.invested(stat)
            + player.equipment.stat_bonus(ctx.data, stat)
            + auras::stat_bonus(&player.core, stat);
        player.core.set_var_id(stat_variable(stat), base_value + bonus);
    }

    player.mark_dirty();
}

/// Grant experience, resolve any level-ups, and notify the client.
pub fn give_experience(ctx: &mut Ctx, player_guid: u32, amount: i32) {
    if amount <= 0 {
        return;
    }
    let Some(player) = ctx.world.player_mut(player_guid) else {
        return;
    };

    let old_level = player.level();
    let mut experience = player.core.var(Variable::Experience) + amount;
    let mut level = old_level;
    let max_level = ctx.data.max_level;

    while level < max_level {
        let required = ctx.data.exp_for_level(level);
        if required <= 0 || experience < required {
            break;
        }
        experience -= required;
        level += 1;
    }

    player.core.set_var(Variable::Experience, experience);
    player.core.set_var(Variable::Progression, experience);
    let session_id = player.session_id;

    if level > old_level {
        player.core.set_var(Variable::Level, level);
        // One stat point per level gained.
        player.unspent_stat_points += level - old_level;
        player.mark_dirty();
        apply_level_stats(ctx, player_guid, false);
        log::info!(
            "Experience: '{}' reached level {level}",
            ctx.world.player(player_guid).map(|p| p.core.name.as_str()).unwrap_or("?")
        );
        ctx.sessions
            .send(session_id, &packets::exp_notify(amount, level));
    } else {
        player.mark_dirty();
        ctx.sessions.send(session_id, &packets::exp_notify(amount, 0));
    }
}

/// Kill credit entry point: compute and grant the award.
pub fn on_npc_killed(ctx: &mut Ctx, player_guid: u32, npc_level: i32) {
    let player_level = match ctx.world.player(player_guid) {
        Some(player) => player.level(),
        None => return,
    };
    let base = ctx.data.kill_base_exp(npc_level);
    let xp = calculate_kill_xp(player_level, npc_level, base);
    if xp > 0 {
        give_experience(ctx, player_guid, xp);
    }
}

/// Spend one earned point on a primary stat and acknowledge with the new
/// value.
pub fn invest_stat_point(ctx: &mut Ctx, player_guid: u32, stat: Stat) -> bool {
    if !PRIMARY_STATS.contains(&stat) {
        return false;
    }
    let Some(player) = ctx.world.player_mut(player_guid) else {
        return false;
    };
    if !player.invest_point(stat) {
        return false;
    }
    let session_id = player.session_id;
    apply_level_stats(ctx, player_guid, true);

    let Some(player) = ctx.world.player(player_guid) else {
        return true;
    };
    ctx.sessions.send(
        session_id,
        &packets::lvl_response(stat as u16, player.stat_value(stat), player.unspent_stat_points),
    );
    true
}

/// Refund all invested points.
pub fn respec(ctx: &mut Ctx, player_guid: u32) {
    let Some(player) = ctx.world.player_mut(player_guid) else {
        return;
    };
    let refunded = player.respec();
    let session_id = player.session_id;
    if refunded > 0 {
        apply_level_stats(ctx, player_guid, true);
    }
    let unspent = ctx
        .world
        .player(player_guid)
        .map(|p| p.unspent_stat_points)
        .unwrap_or(0);
    ctx.sessions
        .send(session_id, &packets::lvl_response(0, 0, unspent));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_level_pays_base() {
        assert_eq!(calculate_kill_xp(5, 5, 100), 100);
    }

    #[test]
    fn each_level_shifts_ten_percent() {
        assert_eq!(calculate_kill_xp(5, 6, 100), 110);
        assert_eq!(calculate_kill_xp(5, 4, 100), 90);
        assert_eq!(calculate_kill_xp(5, 8, 100), 130);
    }

    #[test]
    fn low_side_floors_then_zeroes() {
        // Nine levels below: floored at 10%.
        assert_eq!(calculate_kill_xp(10, 1, 100), 10);
        // At the maximum delta the kill is worthless.
        assert_eq!(calculate_kill_xp(15, 5, 100), 0);
        assert_eq!(calculate_kill_xp(20, 5, 100), 0);
    }

    #[test]
    fn degenerate_inputs_pay_nothing() {
        assert_eq!(calculate_kill_xp(0, 5, 100), 0);
        assert_eq!(calculate_kill_xp(5, 0, 100), 0);
        assert_eq!(calculate_kill_xp(5, 5, 0), 0);
    }
}
