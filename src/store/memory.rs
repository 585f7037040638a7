use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::collateral::GoldItem;
use crate::errors::{LendingError, Result};
use crate::events::{Event, EventStore};
use crate::loan::Loan;
use crate::payments::Payment;
use crate::types::{GoldItemId, LoanId};

use super::{LoanFilter, LoanStore, StoreTransaction};

#[derive(Debug, Default)]
struct StoreState {
    loans: HashMap<LoanId, Loan>,
    // insertion order, so listings are stable
    loan_order: Vec<LoanId>,
    gold_items: Vec<GoldItem>,
    payments: Vec<Payment>,
    sequences: HashMap<NaiveDate, u32>,
    events: EventStore,
}

impl StoreState {
    fn upsert_loan(&mut self, loan: Loan) {
        if !self.loans.contains_key(&loan.id) {
            self.loan_order.push(loan.id);
        }
        self.loans.insert(loan.id, loan);
    }

    fn apply(&mut self, changes: StagedChanges) {
        for loan in changes.loans.into_values() {
            self.upsert_loan(loan);
        }
        self.payments.extend(changes.payments);

        for (id, staged) in changes.gold_items {
            let position = self.gold_items.iter().position(|i| i.id == id);
            match (position, staged) {
                (Some(pos), Some(item)) => self.gold_items[pos] = item,
                (Some(pos), None) => {
                    self.gold_items.remove(pos);
                }
                (None, Some(item)) => self.gold_items.push(item),
                (None, None) => {}
            }
        }

        self.events.extend(changes.events);
    }
}

#[derive(Debug, Default)]
struct StagedChanges {
    loans: HashMap<LoanId, Loan>,
    payments: Vec<Payment>,
    // `None` marks a removal
    gold_items: Vec<(GoldItemId, Option<GoldItem>)>,
    events: Vec<Event>,
}

/// overlay of uncommitted writes on top of the locked state
struct StagedTransaction<'a> {
    base: &'a StoreState,
    changes: StagedChanges,
}

impl StoreTransaction for StagedTransaction<'_> {
    fn lock_loan(&mut self, id: LoanId) -> Result<Loan> {
        self.changes
            .loans
            .get(&id)
            .or_else(|| self.base.loans.get(&id))
            .cloned()
            .ok_or_else(|| LendingError::loan_not_found(id))
    }

    fn put_loan(&mut self, loan: Loan) -> Result<()> {
        self.changes.loans.insert(loan.id, loan);
        Ok(())
    }

    fn insert_payment(&mut self, payment: Payment) -> Result<()> {
        let duplicate = self
            .base
            .payments
            .iter()
            .chain(self.changes.payments.iter())
            .any(|p| p.receipt_number == payment.receipt_number);
        if duplicate {
            return Err(LendingError::Storage {
                message: format!("duplicate receipt number {}", payment.receipt_number),
            });
        }

        self.changes.payments.push(payment);
        Ok(())
    }

    fn payments(&mut self, loan_id: LoanId) -> Result<Vec<Payment>> {
        Ok(self
            .base
            .payments
            .iter()
            .chain(self.changes.payments.iter())
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn gold_items(&mut self, loan_id: LoanId) -> Result<Vec<GoldItem>> {
        let mut items: Vec<GoldItem> = self
            .base
            .gold_items
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect();

        for (id, staged) in &self.changes.gold_items {
            let position = items.iter().position(|i| i.id == *id);
            match (position, staged) {
                (Some(pos), Some(item)) if item.loan_id == loan_id => items[pos] = item.clone(),
                (Some(pos), _) => {
                    items.remove(pos);
                }
                (None, Some(item)) if item.loan_id == loan_id => items.push(item.clone()),
                (None, _) => {}
            }
        }

        Ok(items)
    }

    fn put_gold_item(&mut self, item: GoldItem) -> Result<()> {
        self.changes.gold_items.push((item.id, Some(item)));
        Ok(())
    }

    fn remove_gold_item(&mut self, id: GoldItemId) -> Result<()> {
        let staged = self.changes.gold_items.iter().rev().find(|(staged_id, _)| *staged_id == id);
        let exists = match staged {
            Some((_, item)) => item.is_some(),
            None => self.base.gold_items.iter().any(|i| i.id == id),
        };
        if !exists {
            return Err(LendingError::NotFound {
                entity: "gold item",
                id: id.to_string(),
            });
        }

        self.changes.gold_items.push((id, None));
        Ok(())
    }

    fn append_event(&mut self, event: Event) {
        self.changes.events.push(event);
    }
}

/// in-process store used by tests and demos
///
/// A single mutex guards all state, so a transaction holds every row
/// exclusively for its duration.
#[derive(Debug, Default)]
pub struct InMemoryLoanStore {
    state: Mutex<StoreState>,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| LendingError::Storage {
            message: "store lock poisoned".to_string(),
        })
    }
}

#[cfg(test)]
impl InMemoryLoanStore {
    /// seed a loan directly, bypassing origination
    pub(crate) fn insert_loan(&self, loan: Loan) -> Result<()> {
        let mut state = self.state()?;
        if state.loans.contains_key(&loan.id) {
            return Err(LendingError::Storage {
                message: format!("loan {} already exists", loan.id),
            });
        }
        state.upsert_loan(loan);
        Ok(())
    }

    /// overwrite a stored loan to set up drifted or edge-case records
    pub(crate) fn save_loan(&self, loan: &Loan) -> Result<()> {
        let mut state = self.state()?;
        if !state.loans.contains_key(&loan.id) {
            return Err(LendingError::loan_not_found(loan.id));
        }
        state.loans.insert(loan.id, loan.clone());
        Ok(())
    }
}

fn gold_item_not_found(id: GoldItemId) -> LendingError {
    LendingError::NotFound {
        entity: "gold item",
        id: id.to_string(),
    }
}

impl LoanStore for InMemoryLoanStore {
    fn find_loan(&self, id: LoanId) -> Result<Loan> {
        self.state()?
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| LendingError::loan_not_found(id))
    }

    fn find_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>> {
        let state = self.state()?;
        Ok(state
            .loan_order
            .iter()
            .filter_map(|id| state.loans.get(id))
            .filter(|loan| filter.matches(loan))
            .cloned()
            .collect())
    }

    fn next_loan_sequence(&self, date: NaiveDate) -> Result<u32> {
        let mut state = self.state()?;
        let counter = state.sequences.entry(date).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn find_gold_item(&self, id: GoldItemId) -> Result<GoldItem> {
        self.state()?
            .gold_items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| gold_item_not_found(id))
    }

    fn find_gold_items(&self, loan_id: LoanId) -> Result<Vec<GoldItem>> {
        Ok(self
            .state()?
            .gold_items
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn find_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        Ok(self
            .state()?
            .payments
            .iter()
            .filter(|p| p.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn all_payments(&self) -> Result<Vec<Payment>> {
        Ok(self.state()?.payments.clone())
    }

    fn events(&self) -> Result<Vec<Event>> {
        Ok(self.state()?.events.events().to_vec())
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
    {
        let mut state = self.state()?;

        let mut tx = StagedTransaction {
            base: &state,
            changes: StagedChanges::default(),
        };
        let value = f(&mut tx)?;
        let changes = tx.changes;

        state.apply(changes);
        Ok(value)
    }
}
