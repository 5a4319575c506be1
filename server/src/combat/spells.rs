//! Spell casting: validation, the cast state machine, target resolution,
//! effect application, and the damage/heal/death paths everything else
//! funnels through.

use duskmere_core::defines::object::Variable;
use duskmere_core::defines::player::WorldError;
use duskmere_core::defines::spell::{
    static_spells, AuraType, EffectKind, HitResult, InterruptFlags, School, SpellAttributes,
    TargetType,
};
use duskmere_core::defines::unit::Stat;

use crate::combat::auras::{self, Aura, AuraEventKind};
use crate::combat::cooldowns::DEFAULT_GCD_MS;
use crate::combat::expr::StatRef;
use crate::combat::formulas::{self, DamageInput, HitInput};
use crate::context::Ctx;
use crate::db::game_data::{SpellEffect, SpellTemplate};
use crate::packets;
use crate::systems::{experience, loot, quests};
use crate::world::entity::is_npc_guid;
use crate::world::npc::{AiState, MELEE_RANGE};
use crate::world::player::PendingCast;

/// Melee swings reuse the spell pipeline under this synthetic cooldown.
const MELEE_SWING_MS: i32 = 2000;

fn resist_stat(school: School) -> Option<Stat> {
    match school {
        School::Fire => Some(Stat::ResistFire),
        School::Frost => Some(Stat::ResistFrost),
        School::Shadow => Some(Stat::ResistShadow),
        School::Holy => Some(Stat::ResistHoly),
        _ => None,
    }
}

fn stat_of(ctx: &Ctx, guid: u32, stat: Stat) -> i32 {
    ctx.world
        .entity_core(guid)
        .map(|core| core.var_id(duskmere_core::defines::object::stat_variable(stat)))
        .unwrap_or(0)
}

/// Evaluate an effect's payload against the caster.
fn effect_base(ctx: &mut Ctx, caster_guid: u32, effect: &SpellEffect) -> i32 {
    if let Some(program) = &effect.formula {
        let world = &ctx.world;
        let value = program.eval(&|stat| match stat {
            StatRef::Level => world
                .entity_core(caster_guid)
                .map(|c| c.level() as f64)
                .unwrap_or(0.0),
            StatRef::Stat(stat) => world
                .entity_core(caster_guid)
                .map(|c| c.var_id(duskmere_core::defines::object::stat_variable(stat)) as f64)
                .unwrap_or(0.0),
        });
        return value as i32;
    }
    let mut base = effect.base_points;
    if effect.random_points > 0 {
        base += rand::Rng::gen_range(&mut ctx.world.rng, 0..=effect.random_points);
    }
    base
}

// ---------------------------------------------------------------------------
//  Validation
// ---------------------------------------------------------------------------

/// The primary target a spell wants, from its first targeted effect.
fn required_target_type(spell: &SpellTemplate) -> TargetType {
    for effect in &spell.effects {
        match effect.target_type {
            TargetType::None | TargetType::Caster => continue,
            other => return other,
        }
    }
    TargetType::Caster
}

/// Resolve the concrete primary target GUID for validation.
fn primary_target(
    ctx: &Ctx,
    caster_guid: u32,
    spell: &SpellTemplate,
    requested: u32,
) -> Result<u32, WorldError> {
    match required_target_type(spell) {
        TargetType::Caster => Ok(caster_guid),
        TargetType::Friendly | TargetType::AreaFriendly => {
            if requested != 0 && !is_npc_guid(requested) {
                Ok(requested)
            } else {
                Ok(caster_guid)
            }
        }
        TargetType::Hostile | TargetType::AreaHostile | TargetType::Ground => {
            if requested == 0 {
                return Err(WorldError::InvalidTarget);
            }
            Ok(requested)
        }
        TargetType::Any | TargetType::Item | TargetType::None => {
            if requested == 0 {
                Ok(caster_guid)
            } else {
                Ok(requested)
            }
        }
    }
    .and_then(|guid| {
        if guid == caster_guid && spell.attributes.contains(SpellAttributes::CANT_TARGET_SELF) {
            Err(WorldError::InvalidTarget)
        } else {
            Ok(guid)
        }
    })
}

/// The full validation gauntlet for a player cast.
fn validate_cast(
    ctx: &Ctx,
    caster_guid: u32,
    spell: &SpellTemplate,
    target_guid: u32,
) -> Result<(), WorldError> {
    let Some(caster) = ctx.world.player(caster_guid) else {
        return Err(WorldError::CasterDead);
    };

    if caster.core.dead {
        return Err(WorldError::CasterDead);
    }
    if auras::is_stunned(&caster.core) {
        return Err(WorldError::Stunned);
    }
    if auras::is_silenced(&caster.core) {
        return Err(WorldError::Silenced);
    }
    if caster.pending_cast.is_some() {
        return Err(WorldError::CastInProgress);
    }
    if !caster
        .cooldowns
        .is_ready(spell.entry, spell.category, ctx.clock.now_ms())
    {
        return Err(WorldError::SpellNotReady);
    }
    if caster.core.mana() < spell.mana_cost {
        return Err(WorldError::NotEnoughMana);
    }

    let target_guid = primary_target(ctx, caster_guid, spell, target_guid)?;
    if target_guid != caster_guid {
        let Some(target) = ctx.world.entity_core(target_guid) else {
            return Err(WorldError::InvalidTarget);
        };
        if target.map_id != caster.core.map_id {
            return Err(WorldError::InvalidTarget);
        }
        if target.dead && !spell.attributes.contains(SpellAttributes::CAN_TARGET_DEAD) {
            return Err(WorldError::TargetDead);
        }
        if spell.range > 0.0 && caster.core.distance_to_entity(target) > spell.range {
            return Err(WorldError::OutOfRange);
        }
        if !spell.attributes.contains(SpellAttributes::IGNORE_LOS) {
            if let Some(map) = ctx.maps.get_loaded(caster.core.map_id) {
                if !map.in_line_of_sight(caster.core.x, caster.core.y, target.x, target.y) {
                    return Err(WorldError::LineOfSight);
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
//  Cast state machine
// ---------------------------------------------------------------------------

/// Entry point for a client cast request: validate, then either resolve
/// immediately (instant spells) or start the cast bar.
pub fn try_cast(
    ctx: &mut Ctx,
    caster_guid: u32,
    spell_id: i32,
    requested_target: u32,
) -> Result<(), WorldError> {
    if spell_id == static_spells::MELEE {
        return melee_attack(ctx, caster_guid, requested_target);
    }

    let Some(spell) = ctx.data.get_spell(spell_id) else {
        return Err(WorldError::InvalidTarget);
    };
    validate_cast(ctx, caster_guid, spell, requested_target)?;
    let target_guid = primary_target(ctx, caster_guid, spell, requested_target)?;
    let cast_time_ms = spell.cast_time_ms;

    if cast_time_ms <= 0 {
        resolve_spell(ctx, caster_guid, spell_id, target_guid);
        return Ok(());
    }

    if let Some(caster) = ctx.world.player_mut(caster_guid) {
        caster.pending_cast = Some(PendingCast {
            spell_id,
            target_guid,
            remaining_ms: cast_time_ms,
        });
    }
    let frame = packets::cast_start(caster_guid, spell_id, cast_time_ms, target_guid);
    ctx.world
        .broadcast_to_visible(ctx.sessions, caster_guid, &frame, true);
    Ok(())
}

/// Cancel a pending cast; `announce` emits the cast-stop broadcast.
pub fn cancel_cast(ctx: &mut Ctx, caster_guid: u32, announce: bool) {
    let had_cast = ctx
        .world
        .player_mut(caster_guid)
        .and_then(|p| p.pending_cast.take())
        .is_some();
    if had_cast && announce {
        let frame = packets::cast_stop(caster_guid);
        ctx.world
            .broadcast_to_visible(ctx.sessions, caster_guid, &frame, true);
    }
}

/// Movement interrupts every cast except those flagged to survive it.
pub fn interrupt_on_move(ctx: &mut Ctx, caster_guid: u32) {
    let interrupts = ctx
        .world
        .player(caster_guid)
        .and_then(|p| p.pending_cast)
        .and_then(|cast| ctx.data.get_spell(cast.spell_id))
        .map(|spell| !spell.attributes.contains(SpellAttributes::NO_CANCEL_ON_MOVE))
        .unwrap_or(false);
    if interrupts {
        cancel_cast(ctx, caster_guid, true);
    }
}

/// Incoming damage interrupts casts flagged interruptible-by-damage.
fn interrupt_on_damage(ctx: &mut Ctx, victim_guid: u32) {
    if is_npc_guid(victim_guid) {
        return;
    }
    let interrupts = ctx
        .world
        .player(victim_guid)
        .and_then(|p| p.pending_cast)
        .and_then(|cast| ctx.data.get_spell(cast.spell_id))
        .map(|spell| spell.interrupt_flags.contains(InterruptFlags::TAKE_DAMAGE))
        .unwrap_or(false);
    if interrupts {
        cancel_cast(ctx, victim_guid, true);
    }
}

/// Per-tick cast-bar progression: decrement, and on completion re-check
/// the target before resolving: a target that died mid-cast cancels
/// instead of resolving.
pub fn update_casts(ctx: &mut Ctx, dt_ms: i32) {
    for guid in ctx.world.all_player_guids() {
        let finished = {
            let Some(player) = ctx.world.player_mut(guid) else {
                continue;
            };
            let done = match player.pending_cast.as_mut() {
                Some(cast) => {
                    cast.remaining_ms -= dt_ms;
                    cast.remaining_ms <= 0
                }
                None => false,
            };
            if done {
                player.pending_cast.take()
            } else {
                None
            }
        };

        let Some(cast) = finished else {
            continue;
        };

        let target_still_valid = cast.target_guid == guid
            || ctx
                .world
                .entity_core(cast.target_guid)
                .map(|core| {
                    let Some(spell) = ctx.data.get_spell(cast.spell_id) else {
                        return false;
                    };
                    if core.dead && !spell.attributes.contains(SpellAttributes::CAN_TARGET_DEAD) {
                        return false;
                    }
                    // Without auto-approach, a target that slipped out of
                    // range invalidates the cast.
                    if spell.range > 0.0
                        && !spell.attributes.contains(SpellAttributes::AUTO_APPROACH)
                    {
                        if let Some(caster) = ctx.world.entity_core(guid) {
                            if caster.distance_to_entity(core) > spell.range {
                                return false;
                            }
                        }
                    }
                    true
                })
                .unwrap_or(false);

        if target_still_valid {
            resolve_spell(ctx, guid, cast.spell_id, cast.target_guid);
        } else {
            let frame = packets::cast_stop(guid);
            ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
        }
    }
}

// ---------------------------------------------------------------------------
//  Resolution
// ---------------------------------------------------------------------------

/// Targets for one effect slot.
fn effect_targets(ctx: &Ctx, caster_guid: u32, primary: u32, effect: &SpellEffect, radius: f32) -> Vec<u32> {
    let Some(caster) = ctx.world.entity_core(caster_guid) else {
        return Vec::new();
    };
    let map_id = caster.map_id;
    let radius = if radius > 0.0 { radius } else { MELEE_RANGE * 2.0 };

    match effect.target_type {
        TargetType::None => Vec::new(),
        TargetType::Caster => vec![caster_guid],
        TargetType::Friendly => vec![primary],
        TargetType::Hostile | TargetType::Any | TargetType::Item => vec![primary],
        TargetType::AreaFriendly => {
            let mut targets = Vec::new();
            for guid in ctx.world.players_on_map(map_id) {
                if let Some(core) = ctx.world.entity_core(guid) {
                    if !core.dead && caster.distance_to_entity(core) <= radius {
                        targets.push(guid);
                    }
                }
            }
            targets
        }
        TargetType::AreaHostile | TargetType::Ground => {
            // Area around the primary target (or the caster for a bare
            // point cast).
            let center = ctx
                .world
                .entity_core(primary)
                .map(|c| (c.x, c.y))
                .unwrap_or((caster.x, caster.y));
            let mut targets = Vec::new();
            for guid in ctx.world.npcs_on_map(map_id) {
                if let Some(core) = ctx.world.entity_core(guid) {
                    if !core.dead && core.distance_to(center.0, center.1) <= radius {
                        targets.push(guid);
                    }
                }
            }
            targets
        }
    }
}

fn hit_input(ctx: &Ctx, attacker: u32, defender: u32) -> HitInput {
    HitInput {
        attacker_level: ctx
            .world
            .entity_core(attacker)
            .map(|c| c.level())
            .unwrap_or(1),
        attacker_weapon_skill: stat_of(ctx, attacker, Stat::WeaponValue)
            + ctx
                .world
                .entity_core(attacker)
                .map(|c| c.level() * 5)
                .unwrap_or(0),
        attacker_crit_rating: stat_of(ctx, attacker, Stat::MeleeCritical)
            .max(stat_of(ctx, attacker, Stat::SpellCritical)),
        defender_level: ctx
            .world
            .entity_core(defender)
            .map(|c| c.level())
            .unwrap_or(1),
        defender_dodge_rating: stat_of(ctx, defender, Stat::DodgeRating),
        defender_parry_rating: stat_of(ctx, defender, Stat::ParryRating),
        defender_block_rating: stat_of(ctx, defender, Stat::BlockRating),
    }
}

/// Consume costs and apply every effect slot to its computed target set.
pub fn resolve_spell(ctx: &mut Ctx, caster_guid: u32, spell_id: i32, primary_target: u32) {
    let Some(spell) = ctx.data.get_spell(spell_id) else {
        return;
    };
    let mana_cost = spell.mana_cost;
    let gcd_ms = if spell.gcd_ms > 0 { spell.gcd_ms } else { DEFAULT_GCD_MS };
    let now_ms = ctx.clock.now_ms();

    if let Some(caster) = ctx.world.player_mut(caster_guid) {
        let mana = caster.core.mana();
        caster.core.set_mana(mana - mana_cost);
        caster.cooldowns.set(spell_id, now_ms, spell.cooldown_ms);
        caster
            .cooldowns
            .set_category(spell.category, now_ms, spell.category_cooldown_ms);
        caster.cooldowns.set_gcd(now_ms, gcd_ms);
        let session_id = caster.session_id;
        ctx.sessions.send(
            session_id,
            &packets::cooldown(spell_id, spell.cooldown_ms, spell.category, spell.category_cooldown_ms),
        );
    }

    let frame = packets::spell_go(caster_guid, spell_id, primary_target);
    ctx.world
        .broadcast_to_visible(ctx.sessions, caster_guid, &frame, true);

    let effects: Vec<SpellEffect> = spell
        .effects
        .iter()
        .filter(|e| e.kind != EffectKind::None)
        .cloned()
        .collect();
    let radius = spell.radius;

    for effect in &effects {
        let targets = effect_targets(ctx, caster_guid, primary_target, effect, radius);
        for target in targets {
            apply_effect(ctx, caster_guid, target, spell_id, effect);
        }
    }

    if !is_npc_guid(caster_guid) {
        quests::on_spell_cast(ctx, caster_guid, spell_id);
    }
}

fn apply_effect(ctx: &mut Ctx, caster: u32, target: u32, spell_id: i32, effect: &SpellEffect) {
    let Some(spell) = ctx.data.get_spell(spell_id) else {
        return;
    };
    let school = spell.school;
    let attributes = spell.attributes;
    let crit_multiplier = spell.crit_multiplier;
    let threat_override = spell.threat_override;
    let duration_ms = spell.duration_ms;
    let max_stacks = spell.max_stacks;

    match effect.kind {
        EffectKind::SchoolDamage | EffectKind::WeaponDamage | EffectKind::MeleeAttack => {
            let mut base = effect_base(ctx, caster, effect);
            if effect.kind != EffectKind::SchoolDamage {
                base += weapon_roll(ctx, caster);
            }

            let input = hit_input(ctx, caster, target);
            let result = formulas::roll_hit(&mut ctx.world.rng, &input, attributes);

            let resistance = resist_stat(school)
                .map(|stat| stat_of(ctx, target, stat))
                .unwrap_or(0);
            let armor = stat_of(ctx, target, Stat::ArmorValue);

            let damage = formulas::compute_damage(&DamageInput {
                base,
                school,
                result,
                crit_multiplier,
                target_resistance: resistance,
                target_armor: armor,
                ignore_armor: attributes.contains(SpellAttributes::IGNORE_ARMOR),
                ignore_resistances: attributes.contains(SpellAttributes::IGNORE_RESISTANCES),
            });

            deal_damage(ctx, caster, target, damage, school, spell_id, result, threat_override);
        }
        EffectKind::Heal => {
            let base = effect_base(ctx, caster, effect);
            let crit = {
                let input = hit_input(ctx, caster, target);
                let chances = formulas::hit_chances(&input, attributes);
                rand::Rng::gen_range(&mut ctx.world.rng, 0.0..100.0) < chances[4]
            };
            let dealt_pct = if attributes.contains(SpellAttributes::NO_HEAL_BONUS) {
                0
            } else {
                ctx.world
                    .entity_core(caster)
                    .map(|c| auras::pct_modifier(c, AuraType::ModifyHealingDealtPct))
                    .unwrap_or(0)
            };
            let recv_pct = ctx
                .world
                .entity_core(target)
                .map(|c| auras::pct_modifier(c, AuraType::ModifyHealingRecvPct))
                .unwrap_or(0);
            let amount = formulas::compute_heal(base, crit, dealt_pct, recv_pct);
            apply_heal(ctx, caster, target, amount, crit, spell_id);
        }
        EffectKind::RestoreMana => {
            let amount = effect_base(ctx, caster, effect);
            if let Some(core) = ctx.world.entity_core_mut(target) {
                let mana = core.mana();
                core.set_mana(mana + amount);
            }
        }
        EffectKind::ApplyAura => {
            let amount = effect_base(ctx, caster, effect);
            let aura = Aura {
                spell_id,
                caster_guid: caster,
                aura_type: effect.aura,
                amount,
                misc: effect.misc,
                school,
                duration_ms,
                remaining_ms: duration_ms,
                stacks: 1,
                max_stacks,
                period_ms: effect.aura_period_ms,
                next_tick_ms: effect.aura_period_ms,
                absorb_remaining: if effect.aura == AuraType::AbsorbDamage {
                    amount
                } else {
                    0
                },
                persists_through_death: attributes
                    .contains(SpellAttributes::PERSISTS_THROUGH_DEATH),
                caster_agnostic: attributes.contains(SpellAttributes::SAME_STACK_FOR_ALL_CASTERS),
            };
            if let Some(core) = ctx.world.entity_core_mut(target) {
                auras::apply(core, aura);
                let frame = packets::unit_auras(target, &core.auras);
                ctx.world
                    .broadcast_to_visible(ctx.sessions, target, &frame, true);
            }
        }
        EffectKind::Threat => {
            let amount = effect_base(ctx, caster, effect);
            if let Some(npc) = ctx.world.npc_mut(target) {
                npc.threat.add(caster, amount as i64);
            }
        }
        EffectKind::InterruptCast => {
            cancel_cast(ctx, target, true);
        }
        EffectKind::None => {}
    }
}

fn weapon_roll(ctx: &mut Ctx, attacker: u32) -> i32 {
    if is_npc_guid(attacker) {
        let (min, max) = ctx
            .world
            .npc(attacker)
            .and_then(|npc| ctx.data.get_npc(npc.entry))
            .map(|t| (t.min_damage.max(1), t.max_damage.max(1)))
            .unwrap_or((1, 2));
        rand::Rng::gen_range(&mut ctx.world.rng, min..=max.max(min))
    } else {
        let (min, max) = ctx
            .world
            .player(attacker)
            .map(|p| p.equipment.weapon_damage(ctx.data))
            .unwrap_or((1, 2));
        rand::Rng::gen_range(&mut ctx.world.rng, min..=max.max(min))
    }
}

// ---------------------------------------------------------------------------
//  Damage, healing, death
// ---------------------------------------------------------------------------

/// Apply damage to an entity: absorb shields first, then health, threat,
/// cast interruption, and the death path on reaching zero. Returns the
/// health actually removed.
#[allow(clippy::too_many_arguments)]
pub fn deal_damage(
    ctx: &mut Ctx,
    attacker: u32,
    victim: u32,
    amount: i32,
    school: School,
    spell_id: i32,
    result: HitResult,
    threat_override: i32,
) -> i32 {
    // Damage-dealt and damage-received percent auras scale the incoming
    // amount before shields see it.
    let dealt_pct = ctx
        .world
        .entity_core(attacker)
        .map(|c| auras::pct_modifier(c, AuraType::ModifyDamageDealtPct))
        .unwrap_or(0);
    let recv_pct = ctx
        .world
        .entity_core(victim)
        .map(|c| auras::pct_modifier(c, AuraType::ModifyDamageReceivedPct))
        .unwrap_or(0);
    let amount = ((amount as f32
        * (1.0 + dealt_pct as f32 / 100.0)
        * (1.0 + recv_pct as f32 / 100.0)) as i32)
        .max(0);

    let Some(core) = ctx.world.entity_core_mut(victim) else {
        return 0;
    };
    if core.dead {
        return 0;
    }

    if core.invulnerable {
        let frame = packets::combat_msg(
            attacker,
            victim,
            spell_id,
            HitResult::Immune as u8,
            0,
            school as u8,
            false,
        );
        ctx.world.broadcast_to_visible(ctx.sessions, victim, &frame, true);
        return 0;
    }

    let absorbed = auras::consume_absorb(core, amount);
    let final_amount = (amount - absorbed).max(0);
    let health = core.health();
    let new_health = (health - final_amount).max(0);
    core.set_var(Variable::Health, new_health);
    let lethal = new_health == 0 && health > 0;

    let shown_result = if absorbed > 0 && final_amount == 0 {
        HitResult::Absorb
    } else {
        result
    };
    let frame = packets::combat_msg(
        attacker,
        victim,
        spell_id,
        shown_result as u8,
        final_amount,
        school as u8,
        lethal,
    );
    ctx.world.broadcast_to_visible(ctx.sessions, victim, &frame, true);

    if final_amount > 0 {
        interrupt_on_damage(ctx, victim);
    }

    // Threat: damage adds its amount (or the spell's declared override).
    if is_npc_guid(victim) {
        let threat = if threat_override > 0 {
            threat_override as i64
        } else {
            final_amount as i64
        };
        let mut entered_combat = false;
        if let Some(npc) = ctx.world.npc_mut(victim) {
            npc.threat.add(attacker, threat.max(1));
            if matches!(npc.ai_state, AiState::Idle | AiState::Wandering) {
                npc.ai_state = AiState::Combat;
                entered_combat = true;
            }
            npc.core.set_var(Variable::InCombat, 1);
        }
        if entered_combat {
            let frame = packets::aggro_mob(victim, attacker);
            ctx.world.broadcast_to_visible(ctx.sessions, victim, &frame, true);
        }
    }
    if !is_npc_guid(victim) {
        if let Some(core) = ctx.world.entity_core_mut(victim) {
            core.set_var(Variable::InCombat, 1);
        }
    }

    if lethal {
        on_death(ctx, victim, attacker);
    }

    final_amount
}

/// Heal an entity, clamped to its missing health, and credit threat to
/// every NPC engaged with the healer or the target.
pub fn apply_heal(ctx: &mut Ctx, healer: u32, target: u32, amount: i32, crit: bool, spell_id: i32) {
    let healed = {
        let Some(core) = ctx.world.entity_core_mut(target) else {
            return;
        };
        if core.dead {
            return;
        }
        let missing = core.max_health() - core.health();
        let healed = amount.min(missing).max(0);
        let health = core.health();
        core.set_var(Variable::Health, health + healed);
        healed
    };

    let result = if crit { HitResult::Crit } else { HitResult::Normal };
    let frame = packets::combat_msg(
        healer,
        target,
        spell_id,
        result as u8,
        -healed,
        School::Holy as u8,
        false,
    );
    ctx.world.broadcast_to_visible(ctx.sessions, target, &frame, true);

    if healed > 0 {
        let threat = (healed / 2).max(1) as i64;
        for npc_guid in ctx.world.all_npc_guids() {
            if let Some(npc) = ctx.world.npc_mut(npc_guid) {
                if npc.is_alive()
                    && (npc.threat.get(healer) > 0 || npc.threat.get(target) > 0)
                {
                    npc.threat.add(healer, threat);
                }
            }
        }
    }
}

/// The death path: flags, cast cancel, aura wipe, threat wipe, and then
/// the kind-specific follow-up (players await respawn, NPCs hand out XP,
/// quest credit, loot, and a respawn timer).
pub fn on_death(ctx: &mut Ctx, victim: u32, killer: u32) {
    if let Some(core) = ctx.world.entity_core_mut(victim) {
        core.dead = true;
        core.set_var(Variable::IsDead, 1);
        core.set_var(Variable::InCombat, 0);
        auras::clear_on_death(core);
    }

    if !is_npc_guid(victim) {
        cancel_cast(ctx, victim, true);
    }

    // Casts aimed at the victim cancel in the same tick, unless the spell
    // may target the dead.
    for caster_guid in ctx.world.all_player_guids() {
        let aimed_at_victim = ctx
            .world
            .player(caster_guid)
            .and_then(|p| p.pending_cast)
            .filter(|cast| cast.target_guid == victim)
            .and_then(|cast| ctx.data.get_spell(cast.spell_id))
            .map(|spell| !spell.attributes.contains(SpellAttributes::CAN_TARGET_DEAD))
            .unwrap_or(false);
        if aimed_at_victim {
            cancel_cast(ctx, caster_guid, true);
        }
    }

    // Every NPC hunting the victim forgets it.
    for npc_guid in ctx.world.all_npc_guids() {
        if npc_guid == victim {
            continue;
        }
        if let Some(npc) = ctx.world.npc_mut(npc_guid) {
            npc.threat.remove(victim);
            if npc.ai_state == AiState::Combat && !npc.threat.has_threat() {
                npc.ai_state = AiState::Evading;
            }
        }
    }

    if is_npc_guid(victim) {
        let (entry, npc_level, spawn_id, respawn_secs) = match ctx.world.npc_mut(victim) {
            Some(npc) => {
                npc.ai_state = AiState::Dead;
                npc.threat.clear();
                (npc.entry, npc.core.level(), npc.spawn_id, npc.respawn_secs)
            }
            None => return,
        };

        if !is_npc_guid(killer) {
            experience::on_npc_killed(ctx, killer, npc_level);
            quests::on_npc_killed(ctx, killer, entry);
            loot::populate_corpse(ctx, victim, killer);
        }

        if spawn_id > 0 {
            ctx.spawner.record_death(ctx.data, spawn_id, respawn_secs);
        }
        log::debug!("NPC {entry} ({victim:#x}) died");
    } else {
        log::info!(
            "Player '{}' died",
            ctx.world
                .player(victim)
                .map(|p| p.core.name.as_str())
                .unwrap_or("?")
        );
    }
}

// ---------------------------------------------------------------------------
//  Melee
// ---------------------------------------------------------------------------

/// The static melee swing: weapon damage through the full hit table, gated
/// by the swing timer in the cooldown table.
pub fn melee_attack(ctx: &mut Ctx, attacker: u32, target: u32) -> Result<(), WorldError> {
    let Some(caster) = ctx.world.player(attacker) else {
        return Err(WorldError::CasterDead);
    };
    if caster.core.dead {
        return Err(WorldError::CasterDead);
    }
    if auras::is_stunned(&caster.core) {
        return Err(WorldError::Stunned);
    }
    let now_ms = ctx.clock.now_ms();
    if !caster.cooldowns.is_ready(static_spells::MELEE, 0, now_ms) {
        return Err(WorldError::SpellNotReady);
    }
    let Some(victim) = ctx.world.entity_core(target) else {
        return Err(WorldError::InvalidTarget);
    };
    if victim.dead {
        return Err(WorldError::TargetDead);
    }
    if !caster.core.in_range(victim, MELEE_RANGE) {
        return Err(WorldError::OutOfRange);
    }

    if let Some(player) = ctx.world.player_mut(attacker) {
        player.cooldowns.set(static_spells::MELEE, now_ms, MELEE_SWING_MS);
    }

    let base = weapon_roll(ctx, attacker);
    let input = hit_input(ctx, attacker, target);
    let result = formulas::roll_hit(&mut ctx.world.rng, &input, SpellAttributes::empty());
    let armor = stat_of(ctx, target, Stat::ArmorValue);
    let damage = formulas::compute_damage(&DamageInput {
        base,
        school: School::Physical,
        result,
        crit_multiplier: 2.0,
        target_resistance: 0,
        target_armor: armor,
        ignore_armor: false,
        ignore_resistances: false,
    });
    deal_damage(
        ctx,
        attacker,
        target,
        damage,
        School::Physical,
        static_spells::MELEE,
        result,
        0,
    );
    Ok(())
}

/// An NPC's melee swing against its combat target.
pub fn npc_melee_attack(ctx: &mut Ctx, npc_guid: u32, target: u32) {
    let base = weapon_roll(ctx, npc_guid);
    let input = hit_input(ctx, npc_guid, target);
    let result = formulas::roll_hit(&mut ctx.world.rng, &input, SpellAttributes::empty());
    let armor = stat_of(ctx, target, Stat::ArmorValue);
    let damage = formulas::compute_damage(&DamageInput {
        base,
        school: School::Physical,
        result,
        crit_multiplier: 2.0,
        target_resistance: 0,
        target_armor: armor,
        ignore_armor: false,
        ignore_resistances: false,
    });
    deal_damage(
        ctx,
        npc_guid,
        target,
        damage,
        School::Physical,
        static_spells::MELEE,
        result,
        0,
    );
}

// ---------------------------------------------------------------------------
//  Aura ticks
// ---------------------------------------------------------------------------

/// Advance every entity's auras and apply periodic effects. Runs on the
/// world tick after cast progression.
pub fn update_auras(ctx: &mut Ctx, dt_ms: i32) {
    let mut all: Vec<u32> = ctx.world.all_player_guids();
    all.extend(ctx.world.all_npc_guids());

    for guid in all {
        let events = {
            let Some(core) = ctx.world.entity_core_mut(guid) else {
                continue;
            };
            auras::update(core, dt_ms)
        };
        if events.is_empty() {
            continue;
        }

        let mut auras_changed = false;
        for event in events {
            match event.kind {
                AuraEventKind::PeriodicDamage { amount, school } => {
                    deal_damage(
                        ctx,
                        event.caster_guid,
                        guid,
                        amount,
                        school,
                        event.spell_id,
                        HitResult::Normal,
                        0,
                    );
                }
                AuraEventKind::PeriodicHeal { amount } => {
                    apply_heal(ctx, event.caster_guid, guid, amount, false, event.spell_id);
                }
                AuraEventKind::PeriodicMana { amount } => {
                    if let Some(core) = ctx.world.entity_core_mut(guid) {
                        let mana = core.mana();
                        core.set_mana(mana + amount);
                    }
                }
                AuraEventKind::Expired => auras_changed = true,
            }
        }

        if auras_changed {
            if let Some(core) = ctx.world.entity_core(guid) {
                let frame = packets::unit_auras(guid, &core.auras);
                ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
            }
        }
    }
}
