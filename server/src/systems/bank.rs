//! Bank storage: an independent slot array plus the transfers between it
//! and the inventory.

use duskmere_core::defines::player::BANK_SLOTS;

use crate::systems::inventory::Inventory;

pub fn new_bank() -> Inventory {
    Inventory::new(BANK_SLOTS)
}

/// Move a whole stack from one store to the first free slot of another.
/// Fails without mutating when the source slot is empty or the destination
/// is full.
pub fn transfer_slot(source: &mut Inventory, dest: &mut Inventory, slot: usize) -> bool {
    let Some(free) = dest.first_free() else {
        return false;
    };
    match source.take_slot(slot) {
        Some(item) => {
            dest.set_slot(free, Some(item));
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::inventory::ItemSlot;

    #[test]
    fn transfer_moves_the_stack() {
        let mut inv = Inventory::new(4);
        let mut bank = new_bank();
        inv.set_slot(1, Some(ItemSlot { entry: 10, count: 5, durability: 0 }));

        assert!(transfer_slot(&mut inv, &mut bank, 1));
        assert!(inv.slot(1).is_none());
        assert_eq!(bank.slot(0).unwrap().count, 5);
    }

    #[test]
    fn transfer_refuses_empty_source_and_full_dest() {
        let mut inv = Inventory::new(2);
        let mut bank = Inventory::new(1);
        bank.set_slot(0, Some(ItemSlot { entry: 1, count: 1, durability: 0 }));
        inv.set_slot(0, Some(ItemSlot { entry: 2, count: 1, durability: 0 }));

        assert!(!transfer_slot(&mut inv, &mut bank, 1));
        assert!(!transfer_slot(&mut inv, &mut bank, 0));
        assert_eq!(inv.slot(0).unwrap().entry, 2);
    }
}
