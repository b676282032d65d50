//! Peer-to-peer fruit barter.
//!
//! Offers escrow nothing. Both parties' holdings are checked again inside the
//! acceptance transaction, and the four ledger movements plus the status flip
//! commit together or not at all.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use sled::transaction::TransactionalTree;
use sled::Transactional;

use super::errors::{abort, GroveError};
use super::inventory::{tx_credit, tx_debit, tx_quantity};
use super::storage::{decode_record, encode, tx, GroveStore, TxResult};
use super::types::{FruitBundle, TradeOffer, TradeStatus, TRADE_SCHEMA_VERSION};
use crate::metrics;
use crate::validation::{validate_item_name, validate_user_id};

/// Validate names and quantities, folding names that normalise to the same item.
fn normalize_bundle(bundle: &FruitBundle) -> Result<FruitBundle, GroveError> {
    let mut normalized = FruitBundle::new();
    for (name, quantity) in bundle {
        if *quantity == 0 {
            return Err(GroveError::InvalidQuantity);
        }
        let entry = normalized.entry(validate_item_name(name)?).or_insert(0);
        *entry = entry.saturating_add(*quantity);
    }
    Ok(normalized)
}

fn tx_load_trade(trades: &TransactionalTree, trade_id: &str) -> TxResult<TradeOffer> {
    match trades.get(trade_id.as_bytes())? {
        Some(bytes) => tx(decode_record(&bytes)),
        None => abort(GroveError::NotFound(format!("trade: {}", trade_id))),
    }
}

fn tx_store_trade(trades: &TransactionalTree, offer: &TradeOffer) -> TxResult<()> {
    trades.insert(offer.id.as_bytes(), tx(encode(offer))?)?;
    Ok(())
}

fn tx_require_holdings(
    inventory: &TransactionalTree,
    user_id: &str,
    bundle: &FruitBundle,
) -> TxResult<()> {
    for (item, requested) in bundle {
        let available = tx_quantity(inventory, user_id, item)?;
        if available < *requested {
            return abort(GroveError::InsufficientInventory {
                user: user_id.to_string(),
                item: item.clone(),
                available,
                requested: *requested,
            });
        }
    }
    Ok(())
}

enum Settlement {
    Accepted(TradeOffer),
    /// The offer was flipped to `expired` and that flip was committed.
    Expired,
}

impl GroveStore {
    /// Open a new offer expiring after the configured default.
    pub fn create_trade(
        &self,
        creator_id: &str,
        offered: &FruitBundle,
        requested: &FruitBundle,
    ) -> Result<TradeOffer, GroveError> {
        let hours = self.rules.market.default_expiration_hours;
        self.create_trade_at(creator_id, offered, requested, hours, Utc::now())
    }

    pub fn create_trade_with_expiration(
        &self,
        creator_id: &str,
        offered: &FruitBundle,
        requested: &FruitBundle,
        expiration_hours: i64,
    ) -> Result<TradeOffer, GroveError> {
        self.create_trade_at(creator_id, offered, requested, expiration_hours, Utc::now())
    }

    pub fn create_trade_at(
        &self,
        creator_id: &str,
        offered: &FruitBundle,
        requested: &FruitBundle,
        expiration_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<TradeOffer, GroveError> {
        validate_user_id(creator_id)?;
        if offered.is_empty() {
            return Err(GroveError::EmptyOffer);
        }
        if requested.is_empty() {
            return Err(GroveError::EmptyRequest);
        }
        let offered = normalize_bundle(offered)?;
        let requested = normalize_bundle(requested)?;
        let max = self.rules.market.max_expiration_hours;
        let invalid = GroveError::InvalidExpiration {
            hours: expiration_hours,
            max,
        };
        if !(1..=max).contains(&expiration_hours) {
            return Err(invalid);
        }
        let Some(expires_at) = Duration::try_hours(expiration_hours).and_then(|ttl| now.checked_add_signed(ttl)) else {
            return Err(invalid);
        };

        // Advisory only; acceptance re-checks against the ledger at that time.
        for (item, requested_qty) in &offered {
            let available = self.quantity(creator_id, item)?;
            if available < *requested_qty {
                return Err(GroveError::InsufficientInventory {
                    user: creator_id.to_string(),
                    item: item.clone(),
                    available,
                    requested: *requested_qty,
                });
            }
        }

        let offer = TradeOffer {
            id: uuid::Uuid::new_v4().to_string(),
            creator_user_id: creator_id.to_string(),
            offered_fruits: offered,
            requested_fruits: requested,
            status: TradeStatus::Open,
            expires_at,
            created_at: now,
            accepted_by: None,
            closed_at: None,
            schema_version: TRADE_SCHEMA_VERSION,
        };
        self.trades.insert(offer.id.as_bytes(), encode(&offer)?)?;
        self.persist()?;
        metrics::inc_trades_created();
        info!(
            "Trade {} opened by {}: {:?} for {:?}",
            offer.id, creator_id, offer.offered_fruits, offer.requested_fruits
        );
        Ok(offer)
    }

    pub fn get_trade(&self, trade_id: &str) -> Result<TradeOffer, GroveError> {
        let Some(bytes) = self.trades.get(trade_id.as_bytes())? else {
            return Err(GroveError::NotFound(format!("trade: {}", trade_id)));
        };
        decode_record(&bytes)
    }

    /// Accept an open offer, settling both ledgers atomically.
    pub fn accept_trade(&self, trade_id: &str, accepter_id: &str) -> Result<TradeOffer, GroveError> {
        self.accept_trade_at(trade_id, accepter_id, Utc::now())
    }

    pub fn accept_trade_at(
        &self,
        trade_id: &str,
        accepter_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TradeOffer, GroveError> {
        validate_user_id(accepter_id)?;
        let settlement = (&self.trades, &self.inventory).transaction(|(trades, inventory)| -> TxResult<Settlement> {
            let mut offer = tx_load_trade(trades, trade_id)?;
            if !offer.is_open() {
                return abort(GroveError::NotOpen(offer.status));
            }
            if offer.is_past_expiry(now) {
                offer.close(TradeStatus::Expired, now);
                tx_store_trade(trades, &offer)?;
                return Ok(Settlement::Expired);
            }
            if offer.creator_user_id == accepter_id {
                return abort(GroveError::SelfTrade);
            }
            let creator = offer.creator_user_id.clone();
            tx_require_holdings(inventory, &creator, &offer.offered_fruits)?;
            tx_require_holdings(inventory, accepter_id, &offer.requested_fruits)?;

            for (item, quantity) in &offer.offered_fruits {
                tx_debit(inventory, &creator, item, *quantity)?;
                tx_credit(inventory, accepter_id, item, *quantity)?;
            }
            for (item, quantity) in &offer.requested_fruits {
                tx_debit(inventory, accepter_id, item, *quantity)?;
                tx_credit(inventory, &creator, item, *quantity)?;
            }
            offer.accepted_by = Some(accepter_id.to_string());
            offer.close(TradeStatus::Accepted, now);
            tx_store_trade(trades, &offer)?;
            Ok(Settlement::Accepted(offer))
        })?;
        self.persist()?;

        match settlement {
            Settlement::Accepted(offer) => {
                metrics::inc_trades_accepted();
                info!(
                    "Trade {} settled between {} and {}",
                    offer.id, offer.creator_user_id, accepter_id
                );
                Ok(offer)
            }
            Settlement::Expired => {
                metrics::add_trades_expired(1);
                debug!("Trade {} expired before {} could accept", trade_id, accepter_id);
                Err(GroveError::Expired)
            }
        }
    }

    /// Creator-only cancel. Nothing was escrowed, so no ledger changes.
    pub fn cancel_trade(&self, trade_id: &str, user_id: &str) -> Result<TradeOffer, GroveError> {
        self.cancel_trade_at(trade_id, user_id, Utc::now())
    }

    pub fn cancel_trade_at(
        &self,
        trade_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TradeOffer, GroveError> {
        let offer = self.trades.transaction(|trades| -> TxResult<TradeOffer> {
            let mut offer = tx_load_trade(trades, trade_id)?;
            if offer.creator_user_id != user_id {
                return abort(GroveError::NotOwner(format!("trade {}", trade_id)));
            }
            if !offer.is_open() {
                return abort(GroveError::NotOpen(offer.status));
            }
            offer.close(TradeStatus::Cancelled, now);
            tx_store_trade(trades, &offer)?;
            Ok(offer)
        })?;
        self.persist()?;
        metrics::inc_trades_cancelled();
        info!("Trade {} cancelled by {}", trade_id, user_id);
        Ok(offer)
    }

    /// Flip every open offer past its expiry to `expired`. Idempotent; returns how many flipped.
    pub fn cleanup_expired(&self) -> Result<usize, GroveError> {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize, GroveError> {
        let mut candidates = Vec::new();
        for entry in self.trades.iter() {
            let (_, bytes) = entry?;
            let offer: TradeOffer = decode_record(&bytes)?;
            if offer.is_open() && offer.is_past_expiry(now) {
                candidates.push(offer.id);
            }
        }

        let mut flipped = 0usize;
        for trade_id in candidates {
            // Re-check under the transaction: a concurrent accept or cancel may have won.
            let changed = self.trades.transaction(|trades| -> TxResult<bool> {
                let mut offer = tx_load_trade(trades, &trade_id)?;
                if !(offer.is_open() && offer.is_past_expiry(now)) {
                    return Ok(false);
                }
                offer.close(TradeStatus::Expired, now);
                tx_store_trade(trades, &offer)?;
                Ok(true)
            })?;
            if changed {
                flipped += 1;
            }
        }

        if flipped > 0 {
            self.persist()?;
            metrics::add_trades_expired(flipped as u64);
            info!("Expired {} stale trade offer(s)", flipped);
        }
        Ok(flipped)
    }

    /// Open, unexpired offers from other users, soonest-expiring first.
    pub fn browse(&self, excluding_user_id: &str) -> Result<Vec<TradeOffer>, GroveError> {
        self.browse_at(excluding_user_id, Utc::now())
    }

    pub fn browse_at(&self, excluding_user_id: &str, now: DateTime<Utc>) -> Result<Vec<TradeOffer>, GroveError> {
        self.cleanup_expired_at(now)?;
        let mut offers = Vec::new();
        for entry in self.trades.iter() {
            let (_, bytes) = entry?;
            let offer: TradeOffer = decode_record(&bytes)?;
            if offer.is_live(now) && offer.creator_user_id != excluding_user_id {
                offers.push(offer);
            }
        }
        offers.sort_by(|a, b| {
            a.expires_at
                .cmp(&b.expires_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(offers)
    }

    /// Offers still open and unexpired at `now`, from anyone.
    pub fn live_trade_count_at(&self, now: DateTime<Utc>) -> Result<usize, GroveError> {
        let mut live = 0;
        for entry in self.trades.iter() {
            let (_, bytes) = entry?;
            let offer: TradeOffer = decode_record(&bytes)?;
            if offer.is_live(now) {
                live += 1;
            }
        }
        Ok(live)
    }

    /// Every offer a user has created, newest first.
    pub fn trades_created_by(&self, user_id: &str) -> Result<Vec<TradeOffer>, GroveError> {
        let mut offers = Vec::new();
        for entry in self.trades.iter() {
            let (_, bytes) = entry?;
            let offer: TradeOffer = decode_record(&bytes)?;
            if offer.creator_user_id == user_id {
                offers.push(offer);
            }
        }
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundles_fold_case_variants_and_reject_zero() {
        let bundle = FruitBundle::from([("Apple".to_string(), 1), ("apple".to_string(), 2)]);
        let normalized = normalize_bundle(&bundle).expect("valid");
        assert_eq!(normalized.get("apple"), Some(&3));

        let zero = FruitBundle::from([("apple".to_string(), 0)]);
        assert!(matches!(normalize_bundle(&zero), Err(GroveError::InvalidQuantity)));
    }
}
