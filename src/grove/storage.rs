use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::{IVec, Transactional};

use crate::grove::errors::{abort, GroveError};
use crate::grove::types::{
    CheckInRecord, FruitInstance, GroveRules, TradeOffer, TreeRecord, CHECK_IN_SCHEMA_VERSION,
    FRUIT_SCHEMA_VERSION, TRADE_SCHEMA_VERSION, TREE_SCHEMA_VERSION,
};
use crate::validation::validate_user_id;

const TREE_TREES: &str = "grove_trees";
const TREE_OWNERS: &str = "grove_tree_owners";
const TREE_CHECK_INS: &str = "grove_check_ins";
const TREE_FRUITS: &str = "grove_fruits";
const TREE_TREE_FRUITS: &str = "grove_tree_fruits";
const TREE_SPAWN_STATE: &str = "grove_spawn_state";
const TREE_INVENTORY: &str = "grove_inventory";
const TREE_TRADES: &str = "grove_trades";

pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<GroveError>>;

/// Records stored with a schema byte that must match on read.
pub(crate) trait Versioned {
    const ENTITY: &'static str;
    const VERSION: u8;
    fn schema_version(&self) -> u8;
}

impl Versioned for TreeRecord {
    const ENTITY: &'static str = "tree";
    const VERSION: u8 = TREE_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

impl Versioned for CheckInRecord {
    const ENTITY: &'static str = "check_in";
    const VERSION: u8 = CHECK_IN_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

impl Versioned for FruitInstance {
    const ENTITY: &'static str = "fruit";
    const VERSION: u8 = FRUIT_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

impl Versioned for TradeOffer {
    const ENTITY: &'static str = "trade";
    const VERSION: u8 = TRADE_SCHEMA_VERSION;
    fn schema_version(&self) -> u8 {
        self.schema_version
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, GroveError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GroveError> {
    Ok(bincode::deserialize::<T>(bytes)?)
}

pub(crate) fn decode_record<T: DeserializeOwned + Versioned>(bytes: &[u8]) -> Result<T, GroveError> {
    let record: T = decode(bytes)?;
    if record.schema_version() != T::VERSION {
        return Err(GroveError::SchemaMismatch {
            entity: T::ENTITY,
            expected: T::VERSION,
            found: record.schema_version(),
        });
    }
    Ok(record)
}

/// Lift a plain result into a transaction result, aborting on error.
pub(crate) fn tx<T>(result: Result<T, GroveError>) -> TxResult<T> {
    result.or_else(abort)
}

pub(crate) fn tx_load_tree(trees: &TransactionalTree, tree_id: &str) -> TxResult<TreeRecord> {
    match trees.get(tree_id.as_bytes())? {
        Some(bytes) => tx(decode_record(&bytes)),
        None => abort(GroveError::NotFound(format!("tree: {}", tree_id))),
    }
}

pub(crate) fn tx_store_tree(trees: &TransactionalTree, tree: &TreeRecord) -> TxResult<()> {
    trees.insert(tree.id.as_bytes(), tx(encode(tree))?)?;
    Ok(())
}

/// Helper builder so tests can easily create throwaway stores with custom paths and rules.
pub struct GroveStoreBuilder {
    path: PathBuf,
    rules: GroveRules,
}

impl GroveStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rules: GroveRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: GroveRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn open(self) -> Result<GroveStore, GroveError> {
        GroveStore::open_with_rules(self.path, self.rules)
    }
}

/// Row counts for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub trees: usize,
    pub check_ins: usize,
    pub fruits: usize,
    pub inventory_rows: usize,
    pub trades: usize,
}

/// Sled-backed persistence for trees, check-ins, fruit, inventories and trades.
///
/// Safe to share across threads (`Arc<GroveStore>`); every multi-record
/// mutation commits in a single sled transaction.
pub struct GroveStore {
    db: sled::Db,
    pub(crate) trees: sled::Tree,
    pub(crate) owners: sled::Tree,
    pub(crate) check_ins: sled::Tree,
    pub(crate) fruits: sled::Tree,
    pub(crate) tree_fruits: sled::Tree,
    pub(crate) spawn_state: sled::Tree,
    pub(crate) inventory: sled::Tree,
    pub(crate) trades: sled::Tree,
    pub(crate) rules: GroveRules,
}

impl GroveStore {
    /// Open (or create) the store rooted at `path` with default rules.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GroveError> {
        Self::open_with_rules(path, GroveRules::default())
    }

    fn open_with_rules<P: AsRef<Path>>(path: P, mut rules: GroveRules) -> Result<Self, GroveError> {
        rules.spawn = rules.spawn.normalized()?;
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let store = Self {
            trees: db.open_tree(TREE_TREES)?,
            owners: db.open_tree(TREE_OWNERS)?,
            check_ins: db.open_tree(TREE_CHECK_INS)?,
            fruits: db.open_tree(TREE_FRUITS)?,
            tree_fruits: db.open_tree(TREE_TREE_FRUITS)?,
            spawn_state: db.open_tree(TREE_SPAWN_STATE)?,
            inventory: db.open_tree(TREE_INVENTORY)?,
            trades: db.open_tree(TREE_TRADES)?,
            db,
            rules,
        };
        store.restage_trees()?;
        debug!("Opened grove store at {}", path_ref.display());
        Ok(store)
    }

    /// Bring every cached stage in line with the current thresholds.
    fn restage_trees(&self) -> Result<usize, GroveError> {
        let stages = &self.rules.growth.stages;
        let mut changed = 0;
        for entry in self.trees.iter() {
            let (key, bytes) = entry?;
            let mut tree: TreeRecord = decode_record(&bytes)?;
            if let Some((before, after)) = tree.restage(stages) {
                self.trees.insert(key, encode(&tree)?)?;
                debug!("Tree {} restaged {} -> {}", tree.id, before, after);
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist()?;
            info!("Restaged {} tree(s) under the configured thresholds", changed);
        }
        Ok(changed)
    }

    pub fn rules(&self) -> &GroveRules {
        &self.rules
    }

    /// Flush pending writes to disk.
    pub(crate) fn persist(&self) -> Result<(), GroveError> {
        self.db.flush()?;
        Ok(())
    }

    /// Plant a tree for `owner_id`, or return the one they already have.
    pub fn plant_tree(&self, owner_id: &str, is_public: bool) -> Result<TreeRecord, GroveError> {
        self.plant_tree_at(owner_id, is_public, Utc::now())
    }

    pub fn plant_tree_at(
        &self,
        owner_id: &str,
        is_public: bool,
        now: DateTime<Utc>,
    ) -> Result<TreeRecord, GroveError> {
        validate_user_id(owner_id)?;
        let (tree, created) = (&self.trees, &self.owners).transaction(|(trees, owners)| -> TxResult<(TreeRecord, bool)> {
            if let Some(existing_id) = owners.get(owner_id.as_bytes())? {
                let existing_id = key_string(&existing_id);
                return Ok((tx_load_tree(trees, &existing_id)?, false));
            }
            let tree = TreeRecord::new(owner_id, is_public, now);
            tx_store_tree(trees, &tree)?;
            owners.insert(owner_id.as_bytes(), tree.id.as_bytes())?;
            Ok((tree, true))
        })?;
        if created {
            self.persist()?;
            info!("Planted tree {} for {}", tree.id, owner_id);
        }
        Ok(tree)
    }

    pub fn get_tree(&self, tree_id: &str) -> Result<TreeRecord, GroveError> {
        let Some(bytes) = self.trees.get(tree_id.as_bytes())? else {
            return Err(GroveError::NotFound(format!("tree: {}", tree_id)));
        };
        decode_record(&bytes)
    }

    pub fn tree_for_user(&self, user_id: &str) -> Result<TreeRecord, GroveError> {
        let Some(tree_id) = self.owners.get(user_id.as_bytes())? else {
            return Err(GroveError::NotFound(format!("tree for user: {}", user_id)));
        };
        self.get_tree(&key_string(&tree_id))
    }

    /// List all tree ids currently stored.
    pub fn list_tree_ids(&self) -> Result<Vec<String>, GroveError> {
        let mut ids = Vec::new();
        for entry in self.trees.iter() {
            let (key, _) = entry?;
            ids.push(key_string(&key));
        }
        Ok(ids)
    }

    /// Public trees, highest score first.
    pub fn list_public_trees(&self) -> Result<Vec<TreeRecord>, GroveError> {
        let mut public = Vec::new();
        for entry in self.trees.iter() {
            let (_, bytes) = entry?;
            let tree: TreeRecord = decode_record(&bytes)?;
            if tree.is_public {
                public.push(tree);
            }
        }
        public.sort_by(|a, b| b.mood_score().cmp(&a.mood_score()));
        Ok(public)
    }

    pub fn set_tree_visibility(
        &self,
        tree_id: &str,
        user_id: &str,
        is_public: bool,
    ) -> Result<TreeRecord, GroveError> {
        let now = Utc::now();
        let tree = self.trees.transaction(|trees| -> TxResult<TreeRecord> {
            let mut tree = tx_load_tree(trees, tree_id)?;
            if tree.owner_id != user_id {
                return abort(GroveError::NotOwner(format!("tree {}", tree_id)));
            }
            tree.is_public = is_public;
            tree.updated_at = now;
            tx_store_tree(trees, &tree)?;
            Ok(tree)
        })?;
        self.persist()?;
        Ok(tree)
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            trees: self.trees.len(),
            check_ins: self.check_ins.len(),
            fruits: self.fruits.len(),
            inventory_rows: self.inventory.len(),
            trades: self.trades.len(),
        }
    }
}

/// Raw key bytes to an owned string.
pub(crate) fn key_string(key: &IVec) -> String {
    String::from_utf8_lossy(key).into_owned()
}
