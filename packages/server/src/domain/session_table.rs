//! Fixed-capacity table of active lobby slots.

use serde::Serialize;

use super::{
    connection::ConnectionHandle,
    error::{PoolFull, PoolKind},
    wait_pool::SlotRef,
};

/// Chat bubble shown above a participant until it expires
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBubble {
    pub msg: String,
    pub expires_at: i64,
}

/// Ephemeral presentation state. Transported, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub posx: f64,
    pub posy: f64,
    pub tarx: f64,
    pub tary: f64,
    pub chat: Option<ChatBubble>,
}

/// One lobby participant
#[derive(Debug)]
pub struct SessionSlot {
    local_index: usize,
    generation: u64,
    occupied: bool,
    account_id: String,
    connection: Option<ConnectionHandle>,
    joined_at: i64,
    presence: Presence,
}

impl SessionSlot {
    fn vacant(local_index: usize) -> Self {
        Self {
            local_index,
            generation: 0,
            occupied: false,
            account_id: String::new(),
            connection: None,
            joined_at: 0,
            presence: Presence::default(),
        }
    }

    pub fn local_index(&self) -> usize {
        self.local_index
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn joined_at(&self) -> i64 {
        self.joined_at
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    fn slot_ref(&self) -> SlotRef {
        SlotRef {
            index: self.local_index,
            generation: self.generation,
        }
    }
}

/// What remains of a slot after it was vacated
#[derive(Debug)]
pub struct Vacated {
    pub local_index: usize,
    pub account_id: String,
    pub connection: Option<ConnectionHandle>,
}

/// Bounded table of active sessions
#[derive(Debug)]
pub struct SessionTable {
    slots: Vec<SessionSlot>,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(SessionSlot::vacant).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }

    /// Count of unoccupied slots
    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.occupied_count()
    }

    /// Seat `account_id` in the lowest unoccupied slot.
    pub fn allocate(
        &mut self,
        account_id: &str,
        connection: ConnectionHandle,
        now: i64,
    ) -> Result<SlotRef, PoolFull> {
        let Some(slot) = self.slots.iter_mut().find(|s| !s.occupied) else {
            return Err(PoolFull {
                pool: PoolKind::SessionTable,
                connection,
            });
        };

        slot.generation += 1;
        slot.occupied = true;
        slot.account_id = account_id.to_string();
        slot.connection = Some(connection);
        slot.joined_at = now;
        slot.presence = Presence::default();

        Ok(slot.slot_ref())
    }

    /// Live slot for `slot`, or `None` if vacated or reassigned
    pub fn get(&self, slot: SlotRef) -> Option<&SessionSlot> {
        self.slots
            .get(slot.index)
            .filter(|s| s.occupied && s.generation == slot.generation)
    }

    pub fn presence_mut(&mut self, slot: SlotRef) -> Option<&mut Presence> {
        self.slots
            .get_mut(slot.index)
            .filter(|s| s.occupied && s.generation == slot.generation)
            .map(|s| &mut s.presence)
    }

    /// Reset a slot to unoccupied. Idempotent: stale refs return `None`.
    pub fn vacate(&mut self, slot: SlotRef) -> Option<Vacated> {
        let target = self
            .slots
            .get_mut(slot.index)
            .filter(|s| s.occupied && s.generation == slot.generation)?;

        target.occupied = false;
        target.joined_at = 0;
        target.presence = Presence::default();
        Some(Vacated {
            local_index: target.local_index,
            account_id: std::mem::take(&mut target.account_id),
            connection: target.connection.take(),
        })
    }

    pub fn contains_account(&self, account_id: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.occupied && s.account_id == account_id)
    }

    /// Drop chat bubbles that expired at or before `now`
    pub fn clear_expired_chat(&mut self, now: i64) -> usize {
        let mut cleared = 0;
        for slot in self.slots.iter_mut().filter(|s| s.occupied) {
            if slot
                .presence
                .chat
                .as_ref()
                .is_some_and(|bubble| bubble.expires_at <= now)
            {
                slot.presence.chat = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Occupied slots in index order
    pub fn occupied(&self) -> impl Iterator<Item = (SlotRef, &SessionSlot)> + '_ {
        self.slots
            .iter()
            .filter(|s| s.occupied)
            .map(|s| (s.slot_ref(), s))
    }
}
