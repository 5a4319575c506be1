//! Worn-item loadout: equip/unequip gates and stat aggregation.
//!
//! The equip gates (slot type, required level, class mask) are checked
//! here; moving items between the loadout and the inventory is the
//! handler's job so a failed gate never half-moves an item.

use duskmere_core::defines::player::WorldError;
use duskmere_core::defines::unit::{EquipSlot, Stat, NUM_EQUIP_SLOTS};

use crate::db::characters::ItemRow;
use crate::db::game_data::{GameData, ItemTemplate};
use crate::systems::inventory::ItemSlot;

#[derive(Debug, Clone, Default)]
pub struct Equipment {
    slots: [Option<ItemSlot>; NUM_EQUIP_SLOTS],
}

impl Equipment {
    pub fn new() -> Equipment {
        Equipment::default()
    }

    pub fn worn(&self, slot: EquipSlot) -> Option<&ItemSlot> {
        self.slots[slot.id() as usize].as_ref()
    }

    pub fn set(&mut self, slot: EquipSlot, item: Option<ItemSlot>) {
        self.slots[slot.id() as usize] = item;
    }

    pub fn take(&mut self, slot: EquipSlot) -> Option<ItemSlot> {
        self.slots[slot.id() as usize].take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EquipSlot, &ItemSlot)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.as_ref()
                .and_then(|item| EquipSlot::from_id(i as u8).map(|slot| (slot, item)))
        })
    }

    /// Check the class, level, and slot-type gates for wearing `item`.
    pub fn can_equip(
        template: &ItemTemplate,
        class_id: u8,
        level: i32,
    ) -> Result<EquipSlot, WorldError> {
        let Some(slot) = template.equip_slot else {
            return Err(WorldError::CantEquipItem);
        };
        if template.required_level > level {
            return Err(WorldError::NotHighEnoughLevel);
        }
        if template.allowed_classes != 0 && template.allowed_classes & (1 << class_id) == 0 {
            return Err(WorldError::WrongClass);
        }
        Ok(slot)
    }

    /// Sum a stat across every worn item, including armor and weapon value
    /// derived from the template's dedicated columns.
    pub fn stat_bonus(&self, data: &GameData, stat: Stat) -> i32 {
        let mut total = 0;
        for (_, item) in self.iter() {
            let Some(template) = data.get_item(item.entry) else {
                continue;
            };
            match stat {
                Stat::ArmorValue => total += template.armor,
                Stat::WeaponValue => total += template.max_damage,
                _ => {}
            }
            for item_stat in &template.stats {
                if item_stat.stat == stat {
                    total += item_stat.amount;
                }
            }
        }
        total
    }

    /// Average weapon damage roll bounds from the worn weapon, fists
    /// otherwise.
    pub fn weapon_damage(&self, data: &GameData) -> (i32, i32) {
        if let Some(weapon) = self.worn(EquipSlot::Weapon) {
            if let Some(template) = data.get_item(weapon.entry) {
                return (template.min_damage.max(1), template.max_damage.max(1));
            }
        }
        (1, 2)
    }

    pub fn to_rows(&self) -> Vec<ItemRow> {
        self.iter()
            .map(|(slot, item)| ItemRow {
                slot: slot.id() as i32,
                item_entry: item.entry,
                stack_count: 1,
                durability: item.durability,
            })
            .collect()
    }

    pub fn load_rows(&mut self, rows: &[ItemRow]) {
        self.slots = Default::default();
        for row in rows {
            if let Some(slot) = EquipSlot::from_id(row.slot as u8) {
                self.slots[slot.id() as usize] = Some(ItemSlot {
                    entry: row.item_entry,
                    count: 1,
                    durability: row.durability,
                });
            }
        }
    }
}
