pub mod collateral;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod loan;
pub mod overdue;
pub mod payments;
pub mod reporting;
pub mod scheduler;
pub mod store;
pub mod terms;
pub mod types;

// re-export key types
pub use collateral::{CollateralSummary, GoldItem, NewGoldItem};
pub use config::{Environment, LendingConfig};
pub use decimal::{Money, Rate};
pub use errors::{LendingError, Result};
pub use events::{Event, EventStore};
pub use lifecycle::{CreateLoanRequest, LoanService};
pub use loan::Loan;
pub use overdue::{
    calculate_overdue_status, next_due_date, OverdueFilter, OverdueService, OverdueStatistics,
    OverdueStatus, PenaltyConfig,
};
pub use payments::{DriftReport, Payment, PaymentLedger, PaymentRequest, ReconciliationOutcome};
pub use reporting::PortfolioReport;
pub use scheduler::{OverdueScheduler, SchedulerHandle, SweepReport};
pub use store::{InMemoryLoanStore, LoanFilter, LoanStore, StoreTransaction};
pub use terms::{calculate_emi, loan_to_value, maturity_date, AmortizationSchedule, MAX_TENURE_MONTHS};
pub use types::{
    GoldItemId, GoldItemStatus, LoanId, LoanStatus, PaymentBreakdown, PaymentId, PaymentMethod,
    PaymentStatus, PaymentType, PenaltyType, PurityGrade,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
