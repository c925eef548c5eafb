//! Fixed-capacity pool of connections waiting for authentication.
//!
//! Slots are addressed by [`SlotRef`] (index + generation). Every reservation
//! bumps the slot's generation, so a reference held across an await point
//! (e.g. an in-flight auth lookup) is recognised as stale once the slot has
//! been released or handed to another connection.

use serde::Serialize;

use super::{
    connection::ConnectionHandle,
    error::{PoolFull, PoolKind, StageError},
};

/// Admission stage of a waiting slot.
///
/// Valid edges: `Inactive → AwaitingLogin → Checking → Ready → Inactive`,
/// plus `* → Inactive` on disconnect and `Checking → Inactive` on rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Inactive,
    AwaitingLogin,
    Checking,
    Ready,
}

/// Stable address of a slot in a fixed pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub index: usize,
    pub generation: u64,
}

/// One waiting slot
#[derive(Debug)]
pub struct WaitEntry {
    generation: u64,
    connection: Option<ConnectionHandle>,
    account_id: String,
    stage: Stage,
    entered_at: i64,
}

impl WaitEntry {
    fn vacant() -> Self {
        Self {
            generation: 0,
            connection: None,
            account_id: String::new(),
            stage: Stage::Inactive,
            entered_at: 0,
        }
    }

    /// Back to `Inactive`, keeping the generation counter
    fn reset(&mut self) -> Option<ConnectionHandle> {
        self.account_id.clear();
        self.stage = Stage::Inactive;
        self.entered_at = 0;
        self.connection.take()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Account id resolved by the auth lookup; empty until `Ready`
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn entered_at(&self) -> i64 {
        self.entered_at
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }
}

/// Bounded pool of pending connections
#[derive(Debug)]
pub struct WaitPool {
    entries: Vec<WaitEntry>,
}

impl WaitPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| WaitEntry::vacant()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of slots not `Inactive`
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.stage != Stage::Inactive)
            .count()
    }

    /// Claim the lowest free slot for `connection`.
    pub fn reserve(&mut self, connection: ConnectionHandle, now: i64) -> Result<SlotRef, PoolFull> {
        let Some(index) = self.entries.iter().position(|e| e.stage == Stage::Inactive) else {
            return Err(PoolFull {
                pool: PoolKind::WaitPool,
                connection,
            });
        };

        let entry = &mut self.entries[index];
        entry.reset();
        entry.generation += 1;
        entry.connection = Some(connection);
        entry.stage = Stage::AwaitingLogin;
        entry.entered_at = now;

        Ok(SlotRef {
            index,
            generation: entry.generation,
        })
    }

    /// Live entry for `slot`, or `None` if the reference is stale
    pub fn get(&self, slot: SlotRef) -> Option<&WaitEntry> {
        self.entries
            .get(slot.index)
            .filter(|e| e.generation == slot.generation && e.stage != Stage::Inactive)
    }

    fn transition(&mut self, slot: SlotRef, from: Stage, to: Stage) -> Result<&mut WaitEntry, StageError> {
        let entry = self
            .entries
            .get_mut(slot.index)
            .filter(|e| e.generation == slot.generation && e.stage != Stage::Inactive)
            .ok_or(StageError::Stale { index: slot.index })?;

        if entry.stage != from {
            return Err(StageError::Conflict {
                index: slot.index,
                expected: from,
                actual: entry.stage,
            });
        }
        entry.stage = to;
        Ok(entry)
    }

    /// `AwaitingLogin → Checking`. Any other stage means a second login attempt.
    pub fn record_login_attempt(&mut self, slot: SlotRef) -> Result<(), StageError> {
        self.transition(slot, Stage::AwaitingLogin, Stage::Checking)
            .map(|_| ())
    }

    /// `Checking → Ready`, storing the account id resolved by the lookup.
    pub fn mark_ready(&mut self, slot: SlotRef, account_id: &str) -> Result<(), StageError> {
        let entry = self.transition(slot, Stage::Checking, Stage::Ready)?;
        entry.account_id = account_id.to_string();
        Ok(())
    }

    /// `Checking → Inactive`. The connection is handed back, not closed.
    pub fn mark_rejected(&mut self, slot: SlotRef) -> Result<ConnectionHandle, StageError> {
        let entry = self.transition(slot, Stage::Checking, Stage::Inactive)?;
        entry
            .reset()
            .ok_or(StageError::Stale { index: slot.index })
    }

    /// Reset to `Inactive` from any stage. Idempotent: stale refs are a no-op.
    pub fn release(&mut self, slot: SlotRef) -> Option<ConnectionHandle> {
        self.entries
            .get_mut(slot.index)
            .filter(|e| e.generation == slot.generation && e.stage != Stage::Inactive)
            .and_then(WaitEntry::reset)
    }

    /// Hand the connection of a `Ready` entry to `admit`.
    ///
    /// If `admit` gives the connection back, the entry stays `Ready` with the
    /// connection restored; otherwise the entry is reset to `Inactive`. Either
    /// way exactly one owner holds the connection when this returns.
    pub fn hand_over<T, E>(
        &mut self,
        slot: SlotRef,
        admit: impl FnOnce(&str, ConnectionHandle) -> Result<T, (E, ConnectionHandle)>,
    ) -> Result<Result<T, E>, StageError> {
        let entry = self
            .entries
            .get_mut(slot.index)
            .filter(|e| e.generation == slot.generation && e.stage != Stage::Inactive)
            .ok_or(StageError::Stale { index: slot.index })?;
        if entry.stage != Stage::Ready {
            return Err(StageError::Conflict {
                index: slot.index,
                expected: Stage::Ready,
                actual: entry.stage,
            });
        }
        let connection = entry
            .connection
            .take()
            .ok_or(StageError::Stale { index: slot.index })?;

        match admit(&entry.account_id, connection) {
            Ok(admitted) => {
                entry.reset();
                Ok(Ok(admitted))
            }
            Err((error, connection)) => {
                entry.connection = Some(connection);
                Ok(Err(error))
            }
        }
    }

    /// Slots currently `Ready`, in increasing index order.
    ///
    /// Lazy and finite; call again to restart the scan.
    pub fn scan_ready(&self) -> impl Iterator<Item = SlotRef> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.stage == Stage::Ready)
            .map(|(index, e)| SlotRef {
                index,
                generation: e.generation,
            })
    }

    /// `AwaitingLogin` slots that entered before `deadline`
    pub fn scan_stale(&self, deadline: i64) -> impl Iterator<Item = SlotRef> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.stage == Stage::AwaitingLogin && e.entered_at < deadline)
            .map(|(index, e)| SlotRef {
                index,
                generation: e.generation,
            })
    }

    /// All slots with their index, including `Inactive` ones
    pub fn entries(&self) -> impl Iterator<Item = (usize, &WaitEntry)> + '_ {
        self.entries.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::{ConnectionId, Outbound};
    use tokio::sync::mpsc;

    fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(ConnectionId::generate(), tx), rx)
    }

    fn reserve(pool: &mut WaitPool) -> SlotRef {
        let (handle, _rx) = connection();
        pool.reserve(handle, 1_000).unwrap()
    }

    #[test]
    fn test_reserve_initializes_entry() {
        // テスト項目: reserve で AwaitingLogin の枠が確保される
        // given (前提条件):
        let mut pool = WaitPool::new(2);
        let (handle, _rx) = connection();
        let id = handle.id();

        // when (操作):
        let slot = pool.reserve(handle, 1_000).unwrap();

        // then (期待する結果):
        let entry = pool.get(slot).unwrap();
        assert_eq!(slot.index, 0);
        assert_eq!(entry.stage(), Stage::AwaitingLogin);
        assert_eq!(entry.entered_at(), 1_000);
        assert_eq!(entry.account_id(), "");
        assert_eq!(entry.connection().map(|c| c.id()), Some(id));
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_reserve_when_full_returns_connection() {
        // テスト項目: 満杯の場合は接続が呼び出し元に返される
        // given (前提条件):
        let mut pool = WaitPool::new(2);
        reserve(&mut pool);
        reserve(&mut pool);
        let (handle, _rx) = connection();
        let id = handle.id();

        // when (操作):
        let result = pool.reserve(handle, 1_000);

        // then (期待する結果):
        let full = result.unwrap_err();
        assert_eq!(full.pool, PoolKind::WaitPool);
        assert_eq!(full.connection.id(), id);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_full_stage_cycle() {
        // テスト項目: Inactive → AwaitingLogin → Checking → Ready → Inactive の遷移
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let slot = reserve(&mut pool);

        // when (操作):
        pool.record_login_attempt(slot).unwrap();
        let checking = pool.get(slot).unwrap().stage();
        pool.mark_ready(slot, "alice").unwrap();
        let ready = pool.get(slot).unwrap().stage();
        let released = pool.release(slot);

        // then (期待する結果):
        assert_eq!(checking, Stage::Checking);
        assert_eq!(ready, Stage::Ready);
        assert!(released.is_some());
        assert!(pool.get(slot).is_none());
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_second_login_attempt_is_conflict() {
        // テスト項目: Checking 中の二重ログインはエラーになり状態は変わらない
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let slot = reserve(&mut pool);
        pool.record_login_attempt(slot).unwrap();

        // when (操作):
        let result = pool.record_login_attempt(slot);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(StageError::Conflict {
                index: 0,
                expected: Stage::AwaitingLogin,
                actual: Stage::Checking,
            })
        );
        assert_eq!(pool.get(slot).unwrap().stage(), Stage::Checking);
    }

    #[test]
    fn test_mark_ready_requires_checking() {
        // テスト項目: AwaitingLogin から直接 Ready にはできない
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let slot = reserve(&mut pool);

        // when (操作):
        let result = pool.mark_ready(slot, "alice");

        // then (期待する結果):
        assert!(matches!(result, Err(StageError::Conflict { .. })));
        assert_eq!(pool.get(slot).unwrap().stage(), Stage::AwaitingLogin);
    }

    #[test]
    fn test_mark_rejected_hands_back_connection() {
        // テスト項目: 拒否で枠は Inactive に戻り、接続は閉じられずに返される
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let (handle, mut rx) = connection();
        let id = handle.id();
        let slot = pool.reserve(handle, 0).unwrap();
        pool.record_login_attempt(slot).unwrap();

        // when (操作):
        let returned = pool.mark_rejected(slot).unwrap();

        // then (期待する結果):
        assert_eq!(returned.id(), id);
        assert!(pool.get(slot).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_reference_after_reuse() {
        // テスト項目: 解放後に再利用された枠への古い参照は無効になる
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let old = reserve(&mut pool);
        pool.record_login_attempt(old).unwrap();
        pool.release(old);
        let new = reserve(&mut pool);
        pool.record_login_attempt(new).unwrap();

        // when (操作):
        let result = pool.mark_ready(old, "mallory");

        // then (期待する結果):
        assert_eq!(old.index, new.index);
        assert_eq!(result, Err(StageError::Stale { index: 0 }));
        assert_eq!(pool.get(new).unwrap().stage(), Stage::Checking);
    }

    #[test]
    fn test_release_is_idempotent() {
        // テスト項目: release は何度呼んでも安全
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let slot = reserve(&mut pool);

        // when (操作):
        let first = pool.release(slot);
        let second = pool.release(slot);

        // then (期待する結果):
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_scan_ready_in_index_order() {
        // テスト項目: scan_ready は Ready の枠だけをインデックス昇順で返す
        // given (前提条件):
        let mut pool = WaitPool::new(4);
        let slots: Vec<SlotRef> = (0..4).map(|_| reserve(&mut pool)).collect();
        for slot in [slots[3], slots[1]] {
            pool.record_login_attempt(slot).unwrap();
            pool.mark_ready(slot, "someone").unwrap();
        }
        pool.record_login_attempt(slots[2]).unwrap();

        // when (操作):
        let ready: Vec<usize> = pool.scan_ready().map(|s| s.index).collect();
        let again: Vec<usize> = pool.scan_ready().map(|s| s.index).collect();

        // then (期待する結果):
        assert_eq!(ready, vec![1, 3]);
        assert_eq!(again, ready);
    }

    #[test]
    fn test_hand_over_success_resets_entry() {
        // テスト項目: hand_over が成功すると接続が移り、枠は Inactive になる
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let slot = reserve(&mut pool);
        pool.record_login_attempt(slot).unwrap();
        pool.mark_ready(slot, "alice").unwrap();

        // when (操作):
        let result = pool.hand_over(slot, |account, connection| {
            Ok::<_, ((), ConnectionHandle)>((account.to_string(), connection))
        });

        // then (期待する結果):
        let (account, _connection) = result.unwrap().unwrap();
        assert_eq!(account, "alice");
        assert!(pool.get(slot).is_none());
    }

    #[test]
    fn test_hand_over_refused_restores_connection() {
        // テスト項目: 受け入れ側が拒否した場合、接続は枠に戻り Ready のまま
        // given (前提条件):
        let mut pool = WaitPool::new(1);
        let slot = reserve(&mut pool);
        pool.record_login_attempt(slot).unwrap();
        pool.mark_ready(slot, "alice").unwrap();

        // when (操作):
        let result = pool.hand_over(slot, |_, connection| Err::<(), _>(("full", connection)));

        // then (期待する結果):
        assert_eq!(result, Ok(Err("full")));
        let entry = pool.get(slot).unwrap();
        assert_eq!(entry.stage(), Stage::Ready);
        assert!(entry.connection().is_some());
    }

    #[test]
    fn test_scan_stale_only_awaiting_login() {
        // テスト項目: scan_stale は期限切れの AwaitingLogin だけを返す
        // given (前提条件):
        let mut pool = WaitPool::new(3);
        let (h0, _r0) = connection();
        let (h1, _r1) = connection();
        let (h2, _r2) = connection();
        let old_waiting = pool.reserve(h0, 100).unwrap();
        let old_checking = pool.reserve(h1, 100).unwrap();
        let _fresh = pool.reserve(h2, 900).unwrap();
        pool.record_login_attempt(old_checking).unwrap();

        // when (操作):
        let stale: Vec<SlotRef> = pool.scan_stale(500).collect();

        // then (期待する結果):
        assert_eq!(stale, vec![old_waiting]);
    }
}
