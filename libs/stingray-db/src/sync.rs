//! Reconciliation of related record sets
//!
//! Both algorithms report desirable entries first, in their given order, then
//! the existing entries no desirable entry matched. Operations run one after
//! another; each write must be visible to the next one.

use crate::error::DbResult;
use crate::executor::Executor;
use crate::model::Record;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Inserted,
    Updated,
    Untouched,
    Deleted,
    Restored,
}

/// What the synchronizer did to one related record
#[derive(Debug, Clone)]
pub struct SyncResultItem {
    /// Record state after the operation
    pub to: Option<Record>,
    /// Snapshot of the existing record before the operation
    pub from: Option<Record>,
    pub state: SyncState,
    pub index_in_desirable: Option<usize>,
    pub index_in_existing: Option<usize>,
}

/// Match by identifier: insert new, update changed, soft delete missing
pub async fn one_to_many_sync(
    db: &dyn Executor,
    existing: &mut [Record],
    desirable: &mut [Record],
    user_id: Option<&str>,
    columns: &[&str],
) -> DbResult<Vec<SyncResultItem>> {
    let mut result = Vec::with_capacity(desirable.len() + existing.len());

    for (i, wanted) in desirable.iter_mut().enumerate() {
        let matched = wanted
            .id()
            .and_then(|id| existing.iter().position(|e| e.id() == Some(id)));

        let Some(j) = matched else {
            wanted.insert(db, user_id).await?;
            result.push(SyncResultItem {
                to: Some(wanted.clone()),
                from: None,
                state: SyncState::Inserted,
                index_in_desirable: Some(i),
                index_in_existing: None,
            });
            continue;
        };

        let from = existing[j].clone();
        let state = if wanted.differs(&existing[j], columns)? {
            wanted.update(db, None, user_id, columns).await?;
            SyncState::Updated
        } else {
            SyncState::Untouched
        };

        let to = match state {
            SyncState::Updated => wanted.clone(),
            _ => existing[j].clone(),
        };
        result.push(SyncResultItem {
            to: Some(to),
            from: Some(from),
            state,
            index_in_desirable: Some(i),
            index_in_existing: Some(j),
        });
    }

    for (j, current) in existing.iter_mut().enumerate() {
        let still_present = current
            .id()
            .is_some_and(|id| desirable.iter().any(|d| d.id() == Some(id)));
        if still_present {
            continue;
        }

        result.push(remove_unmatched(db, current, j, user_id).await?);
    }

    Ok(result)
}

/// Match by value equality over `columns`: insert new, restore deleted matches,
/// soft delete missing. Duplicate desirable entries all match the first equal existing one.
pub async fn many_to_many_sync(
    db: &dyn Executor,
    existing: &mut [Record],
    desirable: &mut [Record],
    user_id: Option<&str>,
    columns: &[&str],
) -> DbResult<Vec<SyncResultItem>> {
    let mut result = Vec::with_capacity(desirable.len() + existing.len());

    for (i, wanted) in desirable.iter_mut().enumerate() {
        let mut matched = None;
        for (j, candidate) in existing.iter().enumerate() {
            if !candidate.differs(wanted, columns)? {
                matched = Some(j);
                break;
            }
        }

        let Some(j) = matched else {
            wanted.insert(db, user_id).await?;
            result.push(SyncResultItem {
                to: Some(wanted.clone()),
                from: None,
                state: SyncState::Inserted,
                index_in_desirable: Some(i),
                index_in_existing: None,
            });
            continue;
        };

        let from = existing[j].clone();
        let state = if existing[j].is_deleted() {
            existing[j].restore(db, user_id).await?;
            SyncState::Restored
        } else {
            SyncState::Untouched
        };

        result.push(SyncResultItem {
            to: Some(existing[j].clone()),
            from: Some(from),
            state,
            index_in_desirable: Some(i),
            index_in_existing: Some(j),
        });
    }

    for (j, current) in existing.iter_mut().enumerate() {
        let mut still_present = false;
        for wanted in desirable.iter() {
            if !wanted.differs(current, columns)? {
                still_present = true;
                break;
            }
        }
        if still_present {
            continue;
        }

        result.push(remove_unmatched(db, current, j, user_id).await?);
    }

    Ok(result)
}

async fn remove_unmatched(
    db: &dyn Executor,
    current: &mut Record,
    index: usize,
    user_id: Option<&str>,
) -> DbResult<SyncResultItem> {
    let from = current.clone();
    let state = if current.is_deleted() {
        SyncState::Untouched
    } else {
        current.delete(db, user_id).await?;
        SyncState::Deleted
    };

    Ok(SyncResultItem {
        to: Some(current.clone()),
        from: Some(from),
        state,
        index_in_desirable: None,
        index_in_existing: Some(index),
    })
}
