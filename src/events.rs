use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{GoldItemId, LoanId, LoanStatus, PaymentId, PaymentType};

/// all events that can be emitted by the lending core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanCreated {
        loan_id: LoanId,
        loan_number: String,
        principal: Money,
        emi_amount: Money,
        ltv: Rate,
        timestamp: DateTime<Utc>,
    },
    LoanApproved {
        loan_id: LoanId,
        timestamp: DateTime<Utc>,
    },
    LoanRejected {
        loan_id: LoanId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    LoanDisbursed {
        loan_id: LoanId,
        amount: Money,
        maturity_date: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    LoanCompleted {
        loan_id: LoanId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        loan_id: LoanId,
        payment_id: PaymentId,
        receipt_number: String,
        payment_type: PaymentType,
        amount: Money,
        outstanding_after: Money,
        timestamp: DateTime<Utc>,
    },
    BalanceReconciled {
        loan_id: LoanId,
        old_outstanding: Money,
        new_outstanding: Money,
        old_total_paid: Money,
        new_total_paid: Money,
        timestamp: DateTime<Utc>,
    },

    // overdue events
    OverdueStarted {
        loan_id: LoanId,
        days_overdue: u32,
        overdue_amount: Money,
        timestamp: DateTime<Utc>,
    },
    OverdueCleared {
        loan_id: LoanId,
        timestamp: DateTime<Utc>,
    },
    LoanDefaulted {
        loan_id: LoanId,
        days_overdue: u32,
        outstanding: Money,
        timestamp: DateTime<Utc>,
    },

    // collateral events
    GoldItemAdded {
        loan_id: LoanId,
        item_id: GoldItemId,
        value: Money,
        new_total_value: Money,
        timestamp: DateTime<Utc>,
    },
    GoldItemRemoved {
        loan_id: LoanId,
        item_id: GoldItemId,
        new_total_value: Money,
        timestamp: DateTime<Utc>,
    },
    CollateralReleased {
        loan_id: LoanId,
        items_released: usize,
        timestamp: DateTime<Utc>,
    },

    // status change events
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn loan_id(&self) -> LoanId {
        match self {
            Event::LoanCreated { loan_id, .. }
            | Event::LoanApproved { loan_id, .. }
            | Event::LoanRejected { loan_id, .. }
            | Event::LoanDisbursed { loan_id, .. }
            | Event::LoanCompleted { loan_id, .. }
            | Event::PaymentRecorded { loan_id, .. }
            | Event::BalanceReconciled { loan_id, .. }
            | Event::OverdueStarted { loan_id, .. }
            | Event::OverdueCleared { loan_id, .. }
            | Event::LoanDefaulted { loan_id, .. }
            | Event::GoldItemAdded { loan_id, .. }
            | Event::GoldItemRemoved { loan_id, .. }
            | Event::CollateralReleased { loan_id, .. }
            | Event::StatusChanged { loan_id, .. } => *loan_id,
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default, Clone)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
