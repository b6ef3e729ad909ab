//! In-process store used by tests and by `serve --memory`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{PropertyStore, Range, Row, SheetInfo, TabularStore};
use crate::error::{OrgError, OrgResult};
use crate::permission::Permission;
use crate::permission::access::AccessMirror;

#[derive(Debug)]
struct MemorySheet {
    info: SheetInfo,
    cells: BTreeMap<(u32, u32), Value>,
}

#[derive(Debug, Default)]
struct MemoryState {
    // Vec keeps creation order.
    sheets: Vec<MemorySheet>,
    properties: HashMap<String, String>,
    grants: BTreeMap<String, Permission>,
}

impl MemoryState {
    fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets
            .iter()
            .find(|s| s.info.name == name)
    }

    fn sheet_mut(&mut self, name: &str) -> OrgResult<&mut MemorySheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.info.name == name)
            .ok_or_else(|| OrgError::StoreAccess(format!("sheet {name:?} not found")))
    }
}

/// A [`TabularStore`], [`PropertyStore`] and [`AccessMirror`] held in memory.
///
/// Calls can be made to fail with [`MemoryStore::set_available`],
/// [`MemoryStore::fail_next`] and [`MemoryStore::set_grants_failing`].
/// [`MemoryStore::set_yielding`] makes every call suspend once before it
/// runs, so concurrent callers interleave the way they would against a
/// remote store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
    grants_failing: AtomicBool,
    yielding: AtomicBool,
    faults: Mutex<HashMap<&'static str, String>>,
    range_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `false`, every store call fails with `StoreAccess`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make the next call to the `TabularStore`/`PropertyStore` method named
    /// `op` fail once with `StoreAccess(message)`.
    pub fn fail_next(&self, op: &'static str, message: &str) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op, message.to_string());
    }

    /// When `true`, every store call yields to the runtime before running.
    pub fn set_yielding(&self, yielding: bool) {
        self.yielding.store(yielding, Ordering::SeqCst);
    }

    /// When `true`, every access-mirror call fails.
    pub fn set_grants_failing(&self, failing: bool) {
        self.grants_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `read_range` calls served so far.
    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    /// Snapshot of the mirrored storage-level grants.
    pub fn grants(&self) -> BTreeMap<String, Permission> {
        self.lock_unchecked().grants.clone()
    }

    /// Gate for every store call: applies yielding, outages and one-shot
    /// faults for `op`.
    async fn enter(&self, op: &'static str) -> OrgResult<()> {
        if self.yielding.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OrgError::StoreAccess("store unavailable".to_string()));
        }
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(op);
        match fault {
            Some(message) => Err(OrgError::StoreAccess(message)),
            None => Ok(()),
        }
    }

    async fn lock(&self, op: &'static str) -> OrgResult<MutexGuard<'_, MemoryState>> {
        self.enter(op).await?;
        Ok(self.lock_unchecked())
    }

    fn lock_unchecked(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn list_sheets(&self) -> OrgResult<Vec<SheetInfo>> {
        let state = self.lock("list_sheets").await?;
        Ok(state.sheets.iter().map(|s| s.info.clone()).collect())
    }

    async fn sheet(&self, name: &str) -> OrgResult<Option<SheetInfo>> {
        let state = self.lock("sheet").await?;
        Ok(state.sheet(name).map(|s| s.info.clone()))
    }

    async fn create_sheet(&self, name: &str, hidden: bool) -> OrgResult<SheetInfo> {
        let mut state = self.lock("create_sheet").await?;
        if state.sheet(name).is_some() {
            return Err(OrgError::StoreAccess(format!("sheet {name:?} already exists")));
        }
        let info = SheetInfo {
            name: name.to_string(),
            hidden,
            protected: false,
        };
        state.sheets.push(MemorySheet {
            info: info.clone(),
            cells: BTreeMap::new(),
        });
        Ok(info)
    }

    async fn copy_sheet(&self, from: &str, to: &str) -> OrgResult<SheetInfo> {
        let mut state = self.lock("copy_sheet").await?;
        if state.sheet(to).is_some() {
            return Err(OrgError::StoreAccess(format!("sheet {to:?} already exists")));
        }
        let cells = state
            .sheet(from)
            .map(|s| s.cells.clone())
            .ok_or_else(|| OrgError::StoreAccess(format!("sheet {from:?} not found")))?;
        let info = SheetInfo {
            name: to.to_string(),
            hidden: false,
            protected: false,
        };
        state.sheets.push(MemorySheet {
            info: info.clone(),
            cells,
        });
        Ok(info)
    }

    async fn rename_sheet(&self, from: &str, to: &str) -> OrgResult<()> {
        let mut state = self.lock("rename_sheet").await?;
        if state.sheet(to).is_some() {
            return Err(OrgError::StoreAccess(format!("sheet {to:?} already exists")));
        }
        state.sheet_mut(from)?.info.name = to.to_string();
        Ok(())
    }

    async fn delete_sheet(&self, name: &str) -> OrgResult<bool> {
        let mut state = self.lock("delete_sheet").await?;
        let before = state.sheets.len();
        state
            .sheets
            .retain(|s| s.info.name != name);
        Ok(state.sheets.len() < before)
    }

    async fn protect_sheet(&self, name: &str, _note: &str) -> OrgResult<()> {
        let mut state = self.lock("protect_sheet").await?;
        state.sheet_mut(name)?.info.protected = true;
        Ok(())
    }

    async fn read_range(&self, name: &str, range: Range) -> OrgResult<Vec<Row>> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.lock("read_range").await?;
        let sheet = state
            .sheet(name)
            .ok_or_else(|| OrgError::StoreAccess(format!("sheet {name:?} not found")))?;
        let rows = (range.top..range.top + range.rows)
            .map(|r| {
                (range.left..range.left + range.cols)
                    .map(|c| sheet.cells.get(&(r, c)).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    async fn write_range(&self, name: &str, top: u32, left: u32, rows: &[Row]) -> OrgResult<()> {
        let mut state = self.lock("write_range").await?;
        let sheet = state.sheet_mut(name)?;
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let key = (top + r as u32, left + c as u32);
                if value.is_null() {
                    sheet.cells.remove(&key);
                } else {
                    sheet.cells.insert(key, value.clone());
                }
            }
        }
        Ok(())
    }

    async fn clear_range(&self, name: &str, range: Range) -> OrgResult<()> {
        let mut state = self.lock("clear_range").await?;
        let sheet = state.sheet_mut(name)?;
        sheet.cells.retain(|&(r, c), _| !range.contains(r, c));
        Ok(())
    }

    async fn append_row(&self, name: &str, row: Row) -> OrgResult<u32> {
        let mut state = self.lock("append_row").await?;
        let sheet = state.sheet_mut(name)?;
        let target = sheet.cells.keys().map(|&(r, _)| r).max().unwrap_or(0) + 1;
        for (c, value) in row.into_iter().enumerate() {
            if !value.is_null() {
                sheet.cells.insert((target, c as u32 + 1), value);
            }
        }
        Ok(target)
    }

    async fn delete_row(&self, name: &str, row: u32) -> OrgResult<()> {
        let mut state = self.lock("delete_row").await?;
        let sheet = state.sheet_mut(name)?;
        sheet.cells = std::mem::take(&mut sheet.cells)
            .into_iter()
            .filter(|&((r, _), _)| r != row)
            .map(|((r, c), v)| if r > row { ((r - 1, c), v) } else { ((r, c), v) })
            .collect();
        Ok(())
    }

    async fn last_row(&self, name: &str) -> OrgResult<u32> {
        let state = self.lock("last_row").await?;
        let sheet = state
            .sheet(name)
            .ok_or_else(|| OrgError::StoreAccess(format!("sheet {name:?} not found")))?;
        Ok(sheet.cells.keys().map(|&(r, _)| r).max().unwrap_or(0))
    }
}

#[async_trait]
impl PropertyStore for MemoryStore {
    async fn get(&self, key: &str) -> OrgResult<Option<String>> {
        Ok(self.lock("get").await?.properties.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> OrgResult<()> {
        self.lock("set").await?
            .properties
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> OrgResult<bool> {
        Ok(self.lock("delete").await?.properties.remove(key).is_some())
    }
}

#[async_trait]
impl AccessMirror for MemoryStore {
    async fn grant(&self, email: &str, permission: Permission) -> anyhow::Result<()> {
        if self.grants_failing.load(Ordering::SeqCst) {
            anyhow::bail!("grant rejected for {email}");
        }
        self.lock_unchecked()
            .grants
            .insert(email.to_string(), permission);
        Ok(())
    }

    async fn revoke(&self, email: &str) -> anyhow::Result<()> {
        if self.grants_failing.load(Ordering::SeqCst) {
            anyhow::bail!("revoke rejected for {email}");
        }
        self.lock_unchecked().grants.remove(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_read_and_clear() {
        let store = MemoryStore::new();
        store.create_sheet("p", false).await.unwrap();
        store
            .write_range("p", 2, 1, &[vec![json!("a"), json!(1)], vec![json!("b")]])
            .await
            .unwrap();

        let rows = store.read_range("p", Range::new(2, 1, 2, 3)).await.unwrap();
        assert_eq!(
            rows,
            vec![
                vec![json!("a"), json!(1), Value::Null],
                vec![json!("b"), Value::Null, Value::Null],
            ]
        );
        assert_eq!(store.last_row("p").await.unwrap(), 3);

        store.clear_range("p", Range::new(3, 1, 1, 3)).await.unwrap();
        assert_eq!(store.last_row("p").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_row_shifts_up_without_skipping() {
        let store = MemoryStore::new();
        store.create_sheet("t", true).await.unwrap();
        for v in ["a", "b", "c"] {
            store.append_row("t", vec![json!(v)]).await.unwrap();
        }
        store.delete_row("t", 1).await.unwrap();
        let rows = store.read_range("t", Range::new(1, 1, 3, 1)).await.unwrap();
        assert_eq!(rows, vec![vec![json!("b")], vec![json!("c")], vec![Value::Null]]);
    }

    #[tokio::test]
    async fn copy_keeps_order_and_resets_flags() {
        let store = MemoryStore::new();
        store.create_sheet("_template", true).await.unwrap();
        store.protect_sheet("_template", "locked").await.unwrap();
        store
            .write_range("_template", 1, 1, &[vec![json!("name")]])
            .await
            .unwrap();

        let copy = store.copy_sheet("_template", "q1").await.unwrap();
        assert!(!copy.hidden && !copy.protected);
        let names: Vec<_> = store
            .list_sheets()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["_template", "q1"]);
        assert!(store.copy_sheet("missing", "q2").await.is_err());

        store.rename_sheet("q1", "q2").await.unwrap();
        assert!(store.sheet("q1").await.unwrap().is_none());
        let rows = store.read_range("q2", Range::new(1, 1, 1, 1)).await.unwrap();
        assert_eq!(rows, vec![vec![json!("name")]]);
        assert!(store.rename_sheet("q2", "_template").await.is_err());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.list_sheets().await,
            Err(OrgError::StoreAccess(_))
        ));
        assert!(PropertyStore::get(&store, "k").await.is_err());
        store.set_available(true);
        assert!(store.list_sheets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_fault_fails_one_call() {
        let store = MemoryStore::new();
        store.create_sheet("p", false).await.unwrap();
        store.fail_next("protect_sheet", "timeout");

        let err = store.protect_sheet("p", "note").await.unwrap_err();
        assert!(matches!(err, OrgError::StoreAccess(ref m) if m == "timeout"));
        assert!(store.sheet("p").await.unwrap().is_some());
        store.protect_sheet("p", "note").await.unwrap();
        assert!(store.sheet("p").await.unwrap().unwrap().protected);
    }
}
