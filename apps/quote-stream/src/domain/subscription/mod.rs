//! Subscription Management Types
//!
//! Domain types for tracking which symbols local consumers want from the
//! gateway.
//!
//! # Design
//!
//! The subscription table reference-counts symbols:
//! - Many consumers may want the same symbol
//! - Only the 0→1 and 1→0 transitions require gateway traffic
//! - Releasing a symbol that was never acquired is a no-op
//!
//! [`SubscriptionChanges`] is the pure set difference between two symbol
//! snapshots, used by consumers whose symbol set changes over time.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::streaming::Symbol;

// =============================================================================
// Subscription Changes
// =============================================================================

/// Difference between a previously active symbol set and a desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols present in the desired set only.
    pub subscribe: BTreeSet<Symbol>,
    /// Symbols present in the previous set only.
    pub unsubscribe: BTreeSet<Symbol>,
}

impl SubscriptionChanges {
    /// Compute the changes needed to move from `previous` to `desired`.
    ///
    /// Symbols in both sets appear in neither field.
    #[must_use]
    pub fn between(previous: &BTreeSet<Symbol>, desired: &BTreeSet<Symbol>) -> Self {
        Self {
            subscribe: desired.difference(previous).cloned().collect(),
            unsubscribe: previous.difference(desired).cloned().collect(),
        }
    }

    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

// =============================================================================
// Subscription Table
// =============================================================================

/// A tracked symbol and the number of consumers interested in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    /// The tracked symbol.
    pub symbol: Symbol,
    /// Number of active consumers. Always at least 1 for a tracked entry.
    pub reference_count: usize,
}

/// Reference-counted symbol table.
///
/// Not synchronized; the registry service owns it behind a lock.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    refcounts: BTreeMap<Symbol, usize>,
}

impl SubscriptionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference to `symbol`.
    ///
    /// Returns `true` when this is the first reference (refcount went 0→1)
    /// and the gateway needs a subscribe.
    pub fn acquire(&mut self, symbol: &Symbol) -> bool {
        let refcount = self.refcounts.entry(symbol.clone()).or_insert(0);
        *refcount += 1;
        *refcount == 1
    }

    /// Drop one reference to `symbol`.
    ///
    /// Returns `true` when the last reference was removed (refcount went
    /// 1→0) and the gateway needs an unsubscribe. Untracked symbols return
    /// `false`.
    pub fn release(&mut self, symbol: &Symbol) -> bool {
        let Some(refcount) = self.refcounts.get_mut(symbol) else {
            return false;
        };

        *refcount = refcount.saturating_sub(1);
        if *refcount == 0 {
            self.refcounts.remove(symbol);
            return true;
        }
        false
    }

    /// Current reference count (0 if untracked).
    #[must_use]
    pub fn reference_count(&self, symbol: &Symbol) -> usize {
        self.refcounts.get(symbol).copied().unwrap_or(0)
    }

    /// All symbols with a positive reference count, in sorted order.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.refcounts.keys().cloned().collect()
    }

    /// Snapshot of every tracked entry, in symbol order.
    #[must_use]
    pub fn entries(&self) -> Vec<SubscriptionEntry> {
        self.refcounts
            .iter()
            .map(|(symbol, count)| SubscriptionEntry {
                symbol: symbol.clone(),
                reference_count: *count,
            })
            .collect()
    }

    /// Number of distinct tracked symbols.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.refcounts.len()
    }

    /// Sum of all reference counts.
    #[must_use]
    pub fn total_references(&self) -> usize {
        self.refcounts.values().sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
