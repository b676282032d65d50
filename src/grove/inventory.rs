//! Per-user fruit ledger. Quantities are stored as big-endian u64 under
//! `user:item`; a missing row reads as zero and no write ever goes below zero.

use std::collections::BTreeMap;

use log::debug;
use sled::transaction::TransactionalTree;

use super::errors::{abort, GroveError};
use super::storage::{tx, GroveStore, TxResult};
use crate::validation::{validate_item_name, validate_user_id};

pub(crate) fn inventory_key(user_id: &str, item: &str) -> Vec<u8> {
    format!("{}:{}", user_id, item).into_bytes()
}

fn user_prefix(user_id: &str) -> Vec<u8> {
    format!("{}:", user_id).into_bytes()
}

fn decode_quantity(bytes: &[u8]) -> Result<u64, GroveError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| GroveError::Internal(format!("corrupt quantity ({} bytes)", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

pub(crate) fn tx_quantity(inventory: &TransactionalTree, user_id: &str, item: &str) -> TxResult<u64> {
    match inventory.get(inventory_key(user_id, item))? {
        Some(bytes) => tx(decode_quantity(&bytes)),
        None => Ok(0),
    }
}

pub(crate) fn tx_credit(
    inventory: &TransactionalTree,
    user_id: &str,
    item: &str,
    n: u64,
) -> TxResult<u64> {
    let updated = tx_quantity(inventory, user_id, item)?.saturating_add(n);
    inventory.insert(inventory_key(user_id, item), updated.to_be_bytes().to_vec())?;
    Ok(updated)
}

pub(crate) fn tx_debit(
    inventory: &TransactionalTree,
    user_id: &str,
    item: &str,
    n: u64,
) -> TxResult<u64> {
    let available = tx_quantity(inventory, user_id, item)?;
    if available < n {
        return abort(GroveError::InsufficientQuantity {
            user: user_id.to_string(),
            item: item.to_string(),
            available,
            requested: n,
        });
    }
    let updated = available - n;
    inventory.insert(inventory_key(user_id, item), updated.to_be_bytes().to_vec())?;
    Ok(updated)
}

impl GroveStore {
    /// Add `n` of `item` to a user's ledger, creating the row if needed. Returns the new quantity.
    pub fn credit(&self, user_id: &str, item: &str, n: u64) -> Result<u64, GroveError> {
        validate_user_id(user_id)?;
        let item = validate_item_name(item)?;
        if n == 0 {
            return Err(GroveError::InvalidQuantity);
        }
        let updated = self
            .inventory
            .transaction(|inventory| tx_credit(inventory, user_id, &item, n))?;
        self.persist()?;
        debug!("Credited {} {} to {} (now {})", n, item, user_id, updated);
        Ok(updated)
    }

    /// Remove `n` of `item`; fails with `InsufficientQuantity` rather than going negative.
    pub fn debit(&self, user_id: &str, item: &str, n: u64) -> Result<u64, GroveError> {
        validate_user_id(user_id)?;
        let item = validate_item_name(item)?;
        if n == 0 {
            return Err(GroveError::InvalidQuantity);
        }
        let updated = self
            .inventory
            .transaction(|inventory| tx_debit(inventory, user_id, &item, n))?;
        self.persist()?;
        debug!("Debited {} {} from {} (now {})", n, item, user_id, updated);
        Ok(updated)
    }

    /// Current quantity; a missing row is zero.
    pub fn quantity(&self, user_id: &str, item: &str) -> Result<u64, GroveError> {
        let item = validate_item_name(item)?;
        match self.inventory.get(inventory_key(user_id, &item))? {
            Some(bytes) => decode_quantity(&bytes),
            None => Ok(0),
        }
    }

    /// Everything a user holds, zero rows omitted.
    pub fn inventory_for(&self, user_id: &str) -> Result<BTreeMap<String, u64>, GroveError> {
        let prefix = user_prefix(user_id);
        let mut items = BTreeMap::new();
        for entry in self.inventory.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let quantity = decode_quantity(&value)?;
            if quantity == 0 {
                continue;
            }
            let item = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            items.insert(item, quantity);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_row_reads_as_zero() {
        let dir = TempDir::new().expect("tempdir");
        let store = GroveStore::open(dir.path()).expect("store");
        assert_eq!(store.quantity("alice", "apple").expect("qty"), 0);
        assert!(store.inventory_for("alice").expect("inv").is_empty());
    }

    #[test]
    fn credit_then_debit_to_zero_keeps_row_hidden() {
        let dir = TempDir::new().expect("tempdir");
        let store = GroveStore::open(dir.path()).expect("store");
        assert_eq!(store.credit("alice", "Apple", 3).expect("credit"), 3);
        assert_eq!(store.debit("alice", "apple", 3).expect("debit"), 0);
        assert_eq!(store.quantity("alice", "apple").expect("qty"), 0);
        assert!(store.inventory_for("alice").expect("inv").is_empty());
    }

    #[test]
    fn overdraw_is_rejected_without_change() {
        let dir = TempDir::new().expect("tempdir");
        let store = GroveStore::open(dir.path()).expect("store");
        store.credit("bob", "cherry", 2).expect("credit");
        let err = store.debit("bob", "cherry", 5).unwrap_err();
        match err {
            GroveError::InsufficientQuantity {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 2);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientQuantity, got {:?}", other),
        }
        assert_eq!(store.quantity("bob", "cherry").expect("qty"), 2);
    }

    #[test]
    fn prefixes_do_not_leak_between_users() {
        let dir = TempDir::new().expect("tempdir");
        let store = GroveStore::open(dir.path()).expect("store");
        store.credit("al", "apple", 1).expect("credit");
        store.credit("alice", "peach", 4).expect("credit");
        let al = store.inventory_for("al").expect("inv");
        assert_eq!(al.len(), 1);
        assert_eq!(al.get("apple"), Some(&1));
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let dir = TempDir::new().expect("tempdir");
        let store = GroveStore::open(dir.path()).expect("store");
        assert!(matches!(
            store.credit("alice", "apple", 0),
            Err(GroveError::InvalidQuantity)
        ));
    }
}
