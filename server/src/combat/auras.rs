//! Timed effects attached to entities.
//!
//! Auras stack by (spell id, caster GUID) unless the spell shares one slot
//! across casters. Re-application refreshes the duration and bumps the
//! stack count up to the template cap. Periodic variants fire their
//! sub-effect every tick period; on the expiry tick the final period fires
//! before the aura is removed.

use duskmere_core::defines::object::Variable;
use duskmere_core::defines::spell::{AuraType, Mechanic, School};
use duskmere_core::defines::unit::Stat;

use crate::world::entity::EntityCore;

#[derive(Debug, Clone)]
pub struct Aura {
    pub spell_id: i32,
    pub caster_guid: u32,
    pub aura_type: AuraType,
    /// Per-stack payload: damage/heal per period, stat delta, percent
    /// modifier, absorb capacity, model id.
    pub amount: i32,
    /// Variant-specific discriminator: mechanic id for control auras, stat
    /// id for stat modifiers.
    pub misc: i32,
    pub school: School,
    pub duration_ms: i32,
    pub remaining_ms: i32,
    pub stacks: i32,
    pub max_stacks: i32,
    pub period_ms: i32,
    pub next_tick_ms: i32,
    pub absorb_remaining: i32,
    pub persists_through_death: bool,
    pub caster_agnostic: bool,
}

impl Aura {
    /// Effective payload across current stacks.
    pub fn effective_amount(&self) -> i32 {
        self.amount.saturating_mul(self.stacks)
    }

    fn matches(&self, spell_id: i32, caster_guid: u32) -> bool {
        self.spell_id == spell_id && (self.caster_agnostic || self.caster_guid == caster_guid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuraEventKind {
    PeriodicDamage { amount: i32, school: School },
    PeriodicHeal { amount: i32 },
    PeriodicMana { amount: i32 },
    Expired,
}

#[derive(Debug, Clone)]
pub struct AuraEvent {
    pub spell_id: i32,
    pub caster_guid: u32,
    pub kind: AuraEventKind,
}

/// Apply or refresh an aura on `core`. Returns true when a new slot was
/// created, false when an existing one was refreshed.
pub fn apply(core: &mut EntityCore, mut aura: Aura) -> bool {
    if let Some(existing) = core
        .auras
        .iter_mut()
        .find(|a| a.matches(aura.spell_id, aura.caster_guid))
    {
        existing.remaining_ms = existing.duration_ms;
        existing.stacks = (existing.stacks + 1).min(existing.max_stacks);
        existing.caster_guid = aura.caster_guid;
        existing.absorb_remaining = aura.absorb_remaining;
        refresh_control_flags(core);
        return false;
    }

    aura.stacks = aura.stacks.max(1);
    if aura.period_ms > 0 && aura.next_tick_ms <= 0 {
        aura.next_tick_ms = aura.period_ms;
    }
    core.auras.push(aura);
    refresh_control_flags(core);
    true
}

/// Advance every aura by `dt_ms`, collecting periodic firings and
/// expirations in slot order.
pub fn update(core: &mut EntityCore, dt_ms: i32) -> Vec<AuraEvent> {
    let mut events = Vec::new();

    for aura in core.auras.iter_mut() {
        aura.remaining_ms -= dt_ms;

        if aura.period_ms > 0 {
            aura.next_tick_ms -= dt_ms;
            while aura.next_tick_ms <= 0 {
                aura.next_tick_ms += aura.period_ms;
                let kind = match aura.aura_type {
                    AuraType::PeriodicDamage => AuraEventKind::PeriodicDamage {
                        amount: aura.effective_amount(),
                        school: aura.school,
                    },
                    AuraType::PeriodicHeal => AuraEventKind::PeriodicHeal {
                        amount: aura.effective_amount(),
                    },
                    AuraType::PeriodicRestoreMana => AuraEventKind::PeriodicMana {
                        amount: aura.effective_amount(),
                    },
                    _ => continue,
                };
                events.push(AuraEvent {
                    spell_id: aura.spell_id,
                    caster_guid: aura.caster_guid,
                    kind,
                });
            }
        }
    }

    let mut expired = Vec::new();
    core.auras.retain(|aura| {
        if aura.remaining_ms <= 0 {
            expired.push(AuraEvent {
                spell_id: aura.spell_id,
                caster_guid: aura.caster_guid,
                kind: AuraEventKind::Expired,
            });
            false
        } else {
            true
        }
    });
    events.extend(expired);

    if !events.is_empty() {
        refresh_control_flags(core);
    }
    events
}

/// Remove one aura by spell id (and caster, unless caster-agnostic).
pub fn remove(core: &mut EntityCore, spell_id: i32, caster_guid: u32) -> Option<Aura> {
    let index = core
        .auras
        .iter()
        .position(|a| a.matches(spell_id, caster_guid))?;
    let aura = core.auras.remove(index);
    refresh_control_flags(core);
    Some(aura)
}

/// Death wipes everything except auras flagged to persist.
pub fn clear_on_death(core: &mut EntityCore) -> Vec<Aura> {
    let mut removed = Vec::new();
    let mut kept = Vec::new();
    for aura in core.auras.drain(..) {
        if aura.persists_through_death {
            kept.push(aura);
        } else {
            removed.push(aura);
        }
    }
    core.auras = kept;
    refresh_control_flags(core);
    removed
}

// ------------------------------------------------------------------
//  Queries
// ------------------------------------------------------------------

pub fn has_mechanic(core: &EntityCore, mechanic: Mechanic) -> bool {
    core.auras.iter().any(|a| {
        a.aura_type == AuraType::InflictMechanic && Mechanic::from_id(a.misc) == mechanic
    })
}

pub fn is_stunned(core: &EntityCore) -> bool {
    has_mechanic(core, Mechanic::Stun)
}

pub fn is_silenced(core: &EntityCore) -> bool {
    has_mechanic(core, Mechanic::Silence)
}

pub fn is_rooted(core: &EntityCore) -> bool {
    has_mechanic(core, Mechanic::Root)
}

/// Summed percent modifier across auras of the given type.
pub fn pct_modifier(core: &EntityCore, aura_type: AuraType) -> i32 {
    core.auras
        .iter()
        .filter(|a| a.aura_type == aura_type)
        .map(Aura::effective_amount)
        .sum()
}

/// Summed flat stat bonus from stat-modifier auras.
pub fn stat_bonus(core: &EntityCore, stat: Stat) -> i32 {
    core.auras
        .iter()
        .filter(|a| a.aura_type == AuraType::ModifyStat && a.misc == stat as i32)
        .map(Aura::effective_amount)
        .sum()
}

/// Feed `amount` of incoming damage through absorb shields, oldest first.
/// Returns how much was absorbed; depleted shields are removed.
pub fn consume_absorb(core: &mut EntityCore, amount: i32) -> i32 {
    let mut left = amount;
    for aura in core.auras.iter_mut() {
        if left <= 0 {
            break;
        }
        if aura.aura_type != AuraType::AbsorbDamage || aura.absorb_remaining <= 0 {
            continue;
        }
        let soaked = left.min(aura.absorb_remaining);
        aura.absorb_remaining -= soaked;
        left -= soaked;
    }
    core.auras
        .retain(|a| a.aura_type != AuraType::AbsorbDamage || a.absorb_remaining > 0);
    amount - left
}

/// Mirror aura-derived state into the broadcast variables: control
/// mechanics, movement speed, and model overrides. Removal reverses each
/// modification because the values are recomputed from what remains.
pub fn refresh_control_flags(core: &mut EntityCore) {
    let stunned = is_stunned(core) as i32;
    let silenced = is_silenced(core) as i32;
    let rooted = is_rooted(core) as i32;
    core.set_var(Variable::IsStunned, stunned);
    core.set_var(Variable::IsSilenced, silenced);
    core.set_var(Variable::IsRooted, rooted);

    let speed = 100 + pct_modifier(core, AuraType::ModifyMoveSpeedPct);
    core.set_var(Variable::Speed, speed.max(0));

    let model = core
        .auras
        .iter()
        .rev()
        .find(|a| a.aura_type == AuraType::Model)
        .map(|a| a.misc)
        .unwrap_or(core.base_model_id);
    core.set_var(Variable::ModelId, model);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::entity::EntityKind;

    fn target() -> EntityCore {
        EntityCore::new(10, EntityKind::Npc, "Goblin")
    }

    fn dot(spell_id: i32, caster: u32) -> Aura {
        Aura {
            spell_id,
            caster_guid: caster,
            aura_type: AuraType::PeriodicDamage,
            amount: 5,
            misc: 0,
            school: School::Fire,
            duration_ms: 3000,
            remaining_ms: 3000,
            stacks: 1,
            max_stacks: 3,
            period_ms: 1000,
            next_tick_ms: 1000,
            absorb_remaining: 0,
            persists_through_death: false,
            caster_agnostic: false,
        }
    }

    #[test]
    fn reapplication_refreshes_and_stacks() {
        let mut core = target();
        assert!(apply(&mut core, dot(101, 1)));

        update(&mut core, 2000);
        assert_eq!(core.auras[0].remaining_ms, 1000);

        assert!(!apply(&mut core, dot(101, 1)));
        assert_eq!(core.auras.len(), 1);
        assert_eq!(core.auras[0].remaining_ms, 3000);
        assert_eq!(core.auras[0].stacks, 2);

        // Stacks cap at the template maximum.
        apply(&mut core, dot(101, 1));
        apply(&mut core, dot(101, 1));
        assert_eq!(core.auras[0].stacks, 3);
    }

    #[test]
    fn different_casters_get_separate_slots() {
        let mut core = target();
        apply(&mut core, dot(101, 1));
        apply(&mut core, dot(101, 2));
        assert_eq!(core.auras.len(), 2);
    }

    #[test]
    fn caster_agnostic_spells_share_a_slot() {
        let mut core = target();
        let mut a = dot(101, 1);
        a.caster_agnostic = true;
        let mut b = dot(101, 2);
        b.caster_agnostic = true;

        apply(&mut core, a);
        apply(&mut core, b);
        assert_eq!(core.auras.len(), 1);
        assert_eq!(core.auras[0].stacks, 2);
        // Latest caster owns the shared slot.
        assert_eq!(core.auras[0].caster_guid, 2);
    }

    #[test]
    fn periodic_fires_every_period() {
        let mut core = target();
        apply(&mut core, dot(101, 1));

        let events = update(&mut core, 1000);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            AuraEventKind::PeriodicDamage { amount: 5, .. }
        ));

        let events = update(&mut core, 999);
        assert!(events.is_empty());
    }

    #[test]
    fn final_tick_fires_before_expiry() {
        let mut core = target();
        apply(&mut core, dot(101, 1));

        update(&mut core, 1000);
        update(&mut core, 1000);
        let events = update(&mut core, 1000);

        // The last periodic tick lands in the same update as the removal,
        // and precedes it.
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, AuraEventKind::PeriodicDamage { .. }));
        assert_eq!(events[1].kind, AuraEventKind::Expired);
        assert!(core.auras.is_empty());
    }

    #[test]
    fn remaining_duration_stays_positive_while_live() {
        let mut core = target();
        apply(&mut core, dot(101, 1));
        update(&mut core, 2999);
        assert_eq!(core.auras.len(), 1);
        assert!(core.auras[0].remaining_ms > 0);
        assert!(core.auras[0].remaining_ms <= core.auras[0].duration_ms);
    }

    #[test]
    fn mechanic_auras_mirror_into_variables() {
        let mut core = target();
        let mut stun = dot(200, 1);
        stun.aura_type = AuraType::InflictMechanic;
        stun.misc = Mechanic::Stun as i32;
        stun.period_ms = 0;
        apply(&mut core, stun);

        assert!(is_stunned(&core));
        assert_eq!(core.var(Variable::IsStunned), 1);

        remove(&mut core, 200, 1);
        assert!(!is_stunned(&core));
        assert_eq!(core.var(Variable::IsStunned), 0);
    }

    #[test]
    fn death_keeps_only_persistent_auras() {
        let mut core = target();
        apply(&mut core, dot(101, 1));
        let mut keep = dot(102, 1);
        keep.persists_through_death = true;
        apply(&mut core, keep);

        let removed = clear_on_death(&mut core);
        assert_eq!(removed.len(), 1);
        assert_eq!(core.auras.len(), 1);
        assert_eq!(core.auras[0].spell_id, 102);
    }

    #[test]
    fn absorb_shields_soak_in_order_and_deplete() {
        let mut core = target();
        let mut shield = dot(300, 1);
        shield.aura_type = AuraType::AbsorbDamage;
        shield.period_ms = 0;
        shield.absorb_remaining = 20;
        apply(&mut core, shield);

        assert_eq!(consume_absorb(&mut core, 15), 15);
        assert_eq!(core.auras[0].absorb_remaining, 5);
        assert_eq!(consume_absorb(&mut core, 15), 5);
        assert!(core.auras.is_empty());
    }

    #[test]
    fn stat_and_pct_queries_sum_across_stacks() {
        let mut core = target();
        let mut buff = dot(400, 1);
        buff.aura_type = AuraType::ModifyStat;
        buff.misc = Stat::Strength as i32;
        buff.amount = 4;
        buff.period_ms = 0;
        apply(&mut core, buff.clone());
        apply(&mut core, buff);

        assert_eq!(stat_bonus(&core, Stat::Strength), 8);
        assert_eq!(stat_bonus(&core, Stat::Agility), 0);
    }
}
