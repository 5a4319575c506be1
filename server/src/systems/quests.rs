//! Quest log and progression.
//!
//! The quest manager is the source of truth for availability (prerequisite
//! chain, level gate) and for progress resolution on kills, item counts,
//! and spell casts. Progress lives in four objective slots matching the
//! quest template.

use std::collections::HashMap;

use duskmere_core::defines::object::{GossipStatus, Variable};
use duskmere_core::defines::player::{WorldError, MAX_ACTIVE_QUESTS};
use duskmere_core::defines::quest::{QuestStatus, TallyType, NUM_OBJECTIVES, QUEST_FLAG_REPEATABLE};

use crate::context::Ctx;
use crate::db::characters::QuestRow;
use crate::db::game_data::{GameData, QuestTemplate};
use crate::packets;
use crate::systems::experience;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestState {
    pub status: QuestStatus,
    pub progress: [i32; NUM_OBJECTIVES],
}

#[derive(Debug, Clone, Default)]
pub struct QuestLog {
    quests: HashMap<i32, QuestState>,
    dirty: bool,
}

impl QuestLog {
    pub fn new() -> QuestLog {
        QuestLog::default()
    }

    pub fn get(&self, quest_id: i32) -> Option<&QuestState> {
        self.quests.get(&quest_id)
    }

    pub fn get_mut(&mut self, quest_id: i32) -> Option<&mut QuestState> {
        self.quests.get_mut(&quest_id)
    }

    pub fn insert(&mut self, quest_id: i32, state: QuestState) {
        self.quests.insert(quest_id, state);
        self.dirty = true;
    }

    pub fn remove(&mut self, quest_id: i32) -> Option<QuestState> {
        let removed = self.quests.remove(&quest_id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn set_status(&mut self, quest_id: i32, status: QuestStatus) {
        if let Some(state) = self.quests.get_mut(&quest_id) {
            state.status = status;
            self.dirty = true;
        }
    }

    /// Active (accepted, not yet rewarded) quest count.
    pub fn active_count(&self) -> usize {
        self.quests
            .values()
            .filter(|s| s.status != QuestStatus::Rewarded)
            .count()
    }

    pub fn quest_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.quests.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn to_rows(&self) -> Vec<QuestRow> {
        let mut rows: Vec<QuestRow> = self
            .quests
            .iter()
            .map(|(&id, state)| QuestRow {
                quest_id: id,
                status: state.status as u8,
                progress: state.progress,
            })
            .collect();
        rows.sort_by_key(|r| r.quest_id);
        rows
    }

    pub fn load_rows(&mut self, rows: &[QuestRow]) {
        self.quests.clear();
        for row in rows {
            self.quests.insert(
                row.quest_id,
                QuestState {
                    status: QuestStatus::from_id(row.status),
                    progress: row.progress,
                },
            );
        }
        self.dirty = false;
    }
}

// ---------------------------------------------------------------------------
//  Objectives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Objective {
    pub tally: TallyType,
    pub target: i32,
    pub required: i32,
    pub slot: usize,
}

/// The up-to-four objectives a template declares, slot-aligned.
pub fn objectives(quest: &QuestTemplate) -> Vec<Objective> {
    let mut list = Vec::with_capacity(NUM_OBJECTIVES);
    for slot in 0..NUM_OBJECTIVES {
        let required = quest.req_count[slot].max(1);
        if quest.req_item[slot] > 0 {
            list.push(Objective {
                tally: TallyType::Item,
                target: quest.req_item[slot],
                required,
                slot,
            });
        } else if quest.req_npc[slot] > 0 {
            list.push(Objective {
                tally: TallyType::Npc,
                target: quest.req_npc[slot],
                required,
                slot,
            });
        } else if quest.req_spell[slot] > 0 {
            list.push(Objective {
                tally: TallyType::Spell,
                target: quest.req_spell[slot],
                required,
                slot,
            });
        }
    }
    list
}

pub fn objectives_complete(quest: &QuestTemplate, progress: &[i32; NUM_OBJECTIVES]) -> bool {
    objectives(quest)
        .iter()
        .all(|o| progress[o.slot] >= o.required)
}

fn is_repeatable(quest: &QuestTemplate) -> bool {
    quest.flags & QUEST_FLAG_REPEATABLE != 0
}

// ---------------------------------------------------------------------------
//  Availability
// ---------------------------------------------------------------------------

pub fn is_available(data: &GameData, log: &QuestLog, player_level: i32, quest_id: i32) -> bool {
    let Some(quest) = data.get_quest(quest_id) else {
        return false;
    };
    if player_level < quest.min_level {
        return false;
    }
    if log.get(quest_id).is_some() {
        return false;
    }
    for &prev in &quest.prev_quests {
        if prev <= 0 {
            continue;
        }
        match log.get(prev) {
            Some(state) if state.status == QuestStatus::Rewarded => {}
            _ => return false,
        }
    }
    true
}

/// Quest offers and turn-ins this NPC has for this player.
pub fn quests_for_npc(
    data: &GameData,
    log: &QuestLog,
    player_level: i32,
    npc_entry: i32,
) -> (Vec<i32>, Vec<i32>) {
    let mut offers = Vec::new();
    let mut turnins = Vec::new();

    let mut quest_ids: Vec<i32> = data.quests.keys().copied().collect();
    quest_ids.sort_unstable();

    for quest_id in quest_ids {
        let quest = &data.quests[&quest_id];
        if quest.start_npc == npc_entry && is_available(data, log, player_level, quest_id) {
            offers.push(quest_id);
        }
        if quest.end_npc == npc_entry {
            if let Some(state) = log.get(quest_id) {
                if state.status == QuestStatus::Complete {
                    turnins.push(quest_id);
                }
            }
        }
    }

    (offers, turnins)
}

pub fn gossip_status(
    data: &GameData,
    log: &QuestLog,
    player_level: i32,
    npc_entry: i32,
    is_quest_giver: bool,
) -> GossipStatus {
    if !is_quest_giver {
        return GossipStatus::None;
    }
    let (offers, turnins) = quests_for_npc(data, log, player_level, npc_entry);
    if !turnins.is_empty() {
        GossipStatus::QuestComplete
    } else if !offers.is_empty() {
        GossipStatus::QuestAvailable
    } else {
        GossipStatus::GossipAvailable
    }
}

/// Resend every quest-giver's gossip indicator to one player; their quest
/// state just changed so the markers may have too.
pub fn refresh_gossip_statuses(ctx: &mut Ctx, player_guid: u32) {
    let Some(player) = ctx.world.player(player_guid) else {
        return;
    };
    let session_id = player.session_id;
    let level = player.level();
    let map_id = player.core.map_id;

    for npc_guid in ctx.world.npcs_on_map(map_id) {
        let Some(npc) = ctx.world.npc(npc_guid) else {
            continue;
        };
        let Some(template) = ctx.data.get_npc(npc.entry) else {
            continue;
        };
        let is_giver = template
            .flags
            .contains(duskmere_core::defines::unit::NpcFlags::QUEST_GIVER);
        if !is_giver {
            continue;
        }
        let log = &ctx.world.player(player_guid).expect("fetched above").quest_log;
        let status = gossip_status(ctx.data, log, level, npc.entry, true);
        ctx.sessions.send(
            session_id,
            &packets::object_variable(npc_guid, Variable::DynGossipStatus.id(), status as i32),
        );
    }
}

// ---------------------------------------------------------------------------
//  Operations
// ---------------------------------------------------------------------------

pub fn accept_quest(ctx: &mut Ctx, player_guid: u32, quest_id: i32) -> Result<(), WorldError> {
    let Some(player) = ctx.world.player(player_guid) else {
        return Err(WorldError::QuestNotAvailable);
    };
    if !is_available(ctx.data, &player.quest_log, player.level(), quest_id) {
        return Err(WorldError::QuestNotAvailable);
    }
    if player.quest_log.active_count() >= MAX_ACTIVE_QUESTS {
        return Err(WorldError::QuestNotAvailable);
    }

    let session_id = player.session_id;
    let player = ctx.world.player_mut(player_guid).expect("checked above");
    player.quest_log.insert(
        quest_id,
        QuestState {
            status: QuestStatus::InProgress,
            progress: [0; NUM_OBJECTIVES],
        },
    );
    player.mark_dirty();
    ctx.sessions.send(session_id, &packets::accepted_quest(quest_id));

    // Collection objectives may already be satisfied by carried items.
    on_inventory_changed(ctx, player_guid);
    refresh_gossip_statuses(ctx, player_guid);
    Ok(())
}

pub fn abandon_quest(ctx: &mut Ctx, player_guid: u32, quest_id: i32) {
    let Some(player) = ctx.world.player_mut(player_guid) else {
        return;
    };
    let Some(state) = player.quest_log.get(quest_id) else {
        return;
    };
    if state.status == QuestStatus::Rewarded {
        return;
    }
    player.quest_log.remove(quest_id);
    player.mark_dirty();
    let session_id = player.session_id;
    ctx.sessions.send(session_id, &packets::abandon_quest(quest_id));
    refresh_gossip_statuses(ctx, player_guid);
}

/// Turn in a completed quest at its end NPC: checks, rewards, reward
/// notification, and the log update.
pub fn complete_quest(
    ctx: &mut Ctx,
    player_guid: u32,
    quest_id: i32,
    npc_entry: i32,
) -> Result<(), WorldError> {
    let Some(quest) = ctx.data.get_quest(quest_id) else {
        return Err(WorldError::QuestNotAvailable);
    };
    if quest.end_npc != npc_entry {
        return Err(WorldError::InvalidTarget);
    }
    let reward_xp = quest.reward_xp;
    let reward_gold = quest.reward_gold;
    let reward_item = quest.reward_item;
    let reward_item_count = quest.reward_item_count.max(1);
    let repeatable = is_repeatable(quest);

    let Some(player) = ctx.world.player_mut(player_guid) else {
        return Err(WorldError::QuestNotAvailable);
    };
    match player.quest_log.get(quest_id) {
        Some(state) if state.status == QuestStatus::Complete => {}
        Some(_) => return Err(WorldError::QuestNotDone),
        None => return Err(WorldError::QuestNotAvailable),
    }

    // The reward item must fit before anything is handed out.
    if reward_item > 0 {
        let max_stack = ctx
            .data
            .get_item(reward_item)
            .map(|t| t.max_stack)
            .unwrap_or(1);
        if !player
            .inventory
            .can_fit(reward_item, reward_item_count, max_stack)
        {
            return Err(WorldError::InventoryFull);
        }
    }

    let session_id = player.session_id;
    if repeatable {
        player.quest_log.remove(quest_id);
    } else {
        player.quest_log.set_status(quest_id, QuestStatus::Rewarded);
    }
    if reward_gold > 0 {
        player.add_gold(reward_gold);
    }
    if reward_item > 0 {
        let (max_stack, durability) = ctx
            .data
            .get_item(reward_item)
            .map(|t| (t.max_stack, t.max_durability))
            .unwrap_or((1, 0));
        player
            .inventory
            .add(reward_item, reward_item_count, max_stack, durability);
        ctx.sessions.send(
            session_id,
            &packets::notify_item_add(reward_item, reward_item_count),
        );
    }
    ctx.world
        .player_mut(player_guid)
        .expect("checked above")
        .mark_dirty();

    ctx.sessions.send(session_id, &packets::rewarded_quest(quest_id));
    if reward_xp > 0 {
        experience::give_experience(ctx, player_guid, reward_xp);
    }

    on_inventory_changed(ctx, player_guid);
    refresh_gossip_statuses(ctx, player_guid);
    Ok(())
}

fn send_tally(ctx: &mut Ctx, player_guid: u32, quest_id: i32, objective: &Objective, tally: i32) {
    if let Some(player) = ctx.world.player(player_guid) {
        ctx.sessions.send(
            player.session_id,
            &packets::quest_tally(quest_id, objective.tally as u8, objective.target, tally),
        );
    }
}

/// Flip a quest between in-progress and complete as objectives move.
fn update_completion(ctx: &mut Ctx, player_guid: u32, quest_id: i32) {
    let Some(quest) = ctx.data.get_quest(quest_id) else {
        return;
    };
    let Some(player) = ctx.world.player_mut(player_guid) else {
        return;
    };
    let Some(state) = player.quest_log.get(quest_id) else {
        return;
    };

    let complete = objectives_complete(quest, &state.progress);
    let status = state.status;
    let session_id = player.session_id;

    if complete && status == QuestStatus::InProgress {
        player.quest_log.set_status(quest_id, QuestStatus::Complete);
        player.mark_dirty();
        ctx.sessions
            .send(session_id, &packets::quest_complete(quest_id, true));
        refresh_gossip_statuses(ctx, player_guid);
    } else if !complete && status == QuestStatus::Complete {
        player.quest_log.set_status(quest_id, QuestStatus::InProgress);
        player.mark_dirty();
        ctx.sessions
            .send(session_id, &packets::quest_complete(quest_id, false));
        refresh_gossip_statuses(ctx, player_guid);
    }
}

/// Kill credit: advance matching NPC objectives on in-progress quests.
pub fn on_npc_killed(ctx: &mut Ctx, player_guid: u32, npc_entry: i32) {
    let quest_ids = match ctx.world.player(player_guid) {
        Some(player) => player.quest_log.quest_ids(),
        None => return,
    };

    for quest_id in quest_ids {
        let Some(quest) = ctx.data.get_quest(quest_id) else {
            continue;
        };
        let mut tallies = Vec::new();
        {
            let Some(player) = ctx.world.player_mut(player_guid) else {
                return;
            };
            let Some(state) = player.quest_log.get_mut(quest_id) else {
                continue;
            };
            if state.status != QuestStatus::InProgress {
                continue;
            }
            for objective in objectives(quest) {
                if objective.tally != TallyType::Npc || objective.target != npc_entry {
                    continue;
                }
                let current = state.progress[objective.slot];
                let next = (current + 1).min(objective.required);
                if next != current {
                    state.progress[objective.slot] = next;
                    tallies.push((objective, next));
                }
            }
            if !tallies.is_empty() {
                player.quest_log.mark_dirty();
                player.mark_dirty();
            }
        }

        if !tallies.is_empty() {
            for (objective, tally) in &tallies {
                send_tally(ctx, player_guid, quest_id, objective, *tally);
            }
            update_completion(ctx, player_guid, quest_id);
        }
    }
}

/// Item-count objectives track the inventory exactly: progress is the
/// carried count, so dropping quest items can regress a completed quest.
pub fn on_inventory_changed(ctx: &mut Ctx, player_guid: u32) {
    let quest_ids = match ctx.world.player(player_guid) {
        Some(player) => player.quest_log.quest_ids(),
        None => return,
    };

    for quest_id in quest_ids {
        let Some(quest) = ctx.data.get_quest(quest_id) else {
            continue;
        };
        let mut tallies = Vec::new();
        {
            let Some(player) = ctx.world.player_mut(player_guid) else {
                return;
            };
            let Some(state) = player.quest_log.get(quest_id) else {
                continue;
            };
            if state.status == QuestStatus::Rewarded {
                continue;
            }
            let mut new_progress = state.progress;
            for objective in objectives(quest) {
                if objective.tally != TallyType::Item {
                    continue;
                }
                let carried = player
                    .inventory
                    .count_of(objective.target)
                    .min(objective.required);
                if carried != new_progress[objective.slot] {
                    new_progress[objective.slot] = carried;
                    tallies.push((objective, carried));
                }
            }
            if !tallies.is_empty() {
                let state = player.quest_log.get_mut(quest_id).expect("checked above");
                state.progress = new_progress;
                player.quest_log.mark_dirty();
                player.mark_dirty();
            }
        }

        if !tallies.is_empty() {
            for (objective, tally) in &tallies {
                send_tally(ctx, player_guid, quest_id, objective, *tally);
            }
            update_completion(ctx, player_guid, quest_id);
        }
    }
}

/// Spell-cast objectives advance once per successful cast.
pub fn on_spell_cast(ctx: &mut Ctx, player_guid: u32, spell_id: i32) {
    let quest_ids = match ctx.world.player(player_guid) {
        Some(player) => player.quest_log.quest_ids(),
        None => return,
    };

    for quest_id in quest_ids {
        let Some(quest) = ctx.data.get_quest(quest_id) else {
            continue;
        };
        let mut tallies = Vec::new();
        {
            let Some(player) = ctx.world.player_mut(player_guid) else {
                return;
            };
            let Some(state) = player.quest_log.get_mut(quest_id) else {
                continue;
            };
            if state.status != QuestStatus::InProgress {
                continue;
            }
            for objective in objectives(quest) {
                if objective.tally != TallyType::Spell || objective.target != spell_id {
                    continue;
                }
                let current = state.progress[objective.slot];
                let next = (current + 1).min(objective.required);
                if next != current {
                    state.progress[objective.slot] = next;
                    tallies.push((objective, next));
                }
            }
            if !tallies.is_empty() {
                player.quest_log.mark_dirty();
                player.mark_dirty();
            }
        }

        if !tallies.is_empty() {
            for (objective, tally) in &tallies {
                send_tally(ctx, player_guid, quest_id, objective, *tally);
            }
            update_completion(ctx, player_guid, quest_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kill_quest() -> QuestTemplate {
        QuestTemplate {
            entry: 42,
            title: "Cull the Goblins".to_string(),
            min_level: 3,
            start_npc: 3001,
            end_npc: 3001,
            req_npc: [2001, 0, 0, 0],
            req_count: [3, 0, 0, 0],
            reward_xp: 200,
            reward_gold: 50,
            ..Default::default()
        }
    }

    #[test]
    fn objectives_align_to_slots() {
        let quest = kill_quest();
        let list = objectives(&quest);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].tally, TallyType::Npc);
        assert_eq!(list[0].target, 2001);
        assert_eq!(list[0].required, 3);
        assert_eq!(list[0].slot, 0);

        assert!(!objectives_complete(&quest, &[2, 0, 0, 0]));
        assert!(objectives_complete(&quest, &[3, 0, 0, 0]));
    }

    #[test]
    fn availability_honors_level_and_prereqs() {
        let mut data = GameData::default();
        let mut quest = kill_quest();
        quest.prev_quests = [41, 0, 0];
        data.quests.insert(42, quest);

        let mut log = QuestLog::new();
        assert!(!is_available(&data, &log, 2, 42), "level gate");
        assert!(!is_available(&data, &log, 5, 42), "missing prereq");

        log.insert(
            41,
            QuestState {
                status: QuestStatus::Complete,
                progress: [0; 4],
            },
        );
        assert!(!is_available(&data, &log, 5, 42), "prereq not rewarded");

        log.set_status(41, QuestStatus::Rewarded);
        assert!(is_available(&data, &log, 5, 42));

        log.insert(
            42,
            QuestState {
                status: QuestStatus::InProgress,
                progress: [0; 4],
            },
        );
        assert!(!is_available(&data, &log, 5, 42), "already in log");
    }

    #[test]
    fn npc_offers_and_turnins() {
        let mut data = GameData::default();
        data.quests.insert(42, kill_quest());

        let mut log = QuestLog::new();
        let (offers, turnins) = quests_for_npc(&data, &log, 5, 3001);
        assert_eq!(offers, vec![42]);
        assert!(turnins.is_empty());

        log.insert(
            42,
            QuestState {
                status: QuestStatus::Complete,
                progress: [3, 0, 0, 0],
            },
        );
        let (offers, turnins) = quests_for_npc(&data, &log, 5, 3001);
        assert!(offers.is_empty());
        assert_eq!(turnins, vec![42]);

        assert_eq!(
            gossip_status(&data, &log, 5, 3001, true),
            GossipStatus::QuestComplete
        );
    }

    #[test]
    fn rows_round_trip() {
        let mut log = QuestLog::new();
        log.insert(
            42,
            QuestState {
                status: QuestStatus::InProgress,
                progress: [2, 0, 0, 0],
            },
        );
        assert!(log.is_dirty());

        let rows = log.to_rows();
        let mut other = QuestLog::new();
        other.load_rows(&rows);
        assert_eq!(other.get(42).unwrap().progress[0], 2);
        assert!(!other.is_dirty());
    }
}
