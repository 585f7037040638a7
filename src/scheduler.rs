//! Batch overdue sweep.
//!
//! The background task and the manual trigger share [`OverdueScheduler::run_now`].

use std::sync::Arc;

use chrono::Duration;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::LendingConfig;
use crate::errors::Result;
use crate::overdue::{OverdueChange, OverdueFilter, OverdueService};
use crate::store::LoanStore;

/// counters from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub total_processed: usize,
    pub new_overdue_count: usize,
    pub cleared_overdue_count: usize,
    pub defaulted_count: usize,
    /// loans whose refresh or default check failed and were skipped
    pub failed_count: usize,
}

pub struct OverdueScheduler<S: LoanStore> {
    store: Arc<S>,
    overdue: Arc<OverdueService<S>>,
    time: SafeTimeProvider,
    interval: Duration,
    threshold_days: u32,
}

impl<S: LoanStore> Clone for OverdueScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            overdue: Arc::clone(&self.overdue),
            time: self.time.clone(),
            interval: self.interval,
            threshold_days: self.threshold_days,
        }
    }
}

impl<S: LoanStore> OverdueScheduler<S> {
    pub fn new(store: Arc<S>, time: SafeTimeProvider, config: &LendingConfig) -> Self {
        let overdue = OverdueService::new(Arc::clone(&store), time.clone()).with_threshold(config.default_threshold_days);

        Self {
            store,
            overdue: Arc::new(overdue),
            time,
            interval: config.sweep_interval(),
            threshold_days: config.default_threshold_days,
        }
    }

    /// sweep every active loan now, then escalate those past the default threshold
    ///
    /// A failure on one loan is logged and counted; the sweep carries on.
    pub fn run_now(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let loans = self.store.find_active_loans()?;
        info!(active_loans = loans.len(), "overdue sweep started");

        for loan in &loans {
            match self.overdue.refresh(loan.id) {
                Ok((_, change)) => {
                    report.total_processed += 1;
                    match change {
                        OverdueChange::BecameOverdue => report.new_overdue_count += 1,
                        OverdueChange::Cleared => report.cleared_overdue_count += 1,
                        OverdueChange::Unchanged => {}
                    }
                }
                Err(e) => {
                    report.failed_count += 1;
                    warn!(loan_id = %loan.id, loan_number = %loan.loan_number, error = %e, "overdue refresh failed");
                }
            }
        }

        let candidates = self
            .overdue
            .get_overdue_loans(&OverdueFilter::at_least_days(self.threshold_days))?;
        debug!(candidates = candidates.len(), threshold_days = self.threshold_days, "default check");

        for loan in &candidates {
            match self.overdue.check_and_mark_defaulted(loan.id, self.threshold_days) {
                Ok(true) => report.defaulted_count += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed_count += 1;
                    warn!(loan_id = %loan.id, error = %e, "default check failed");
                }
            }
        }

        info!(
            total_processed = report.total_processed,
            new_overdue = report.new_overdue_count,
            cleared_overdue = report.cleared_overdue_count,
            defaulted = report.defaulted_count,
            failed = report.failed_count,
            "overdue sweep finished"
        );
        Ok(report)
    }
}

impl<S: LoanStore + 'static> OverdueScheduler<S> {
    /// spawn the repeating sweep: once immediately, then every interval
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (reports_tx, reports_rx) = watch::channel(None);
        let scheduler = self.clone();

        let task = tokio::spawn(async move {
            info!(interval_hours = scheduler.interval.num_hours(), "overdue scheduler started");

            loop {
                let sweeper = scheduler.clone();
                match tokio::task::spawn_blocking(move || sweeper.run_now()).await {
                    Ok(Ok(report)) => {
                        let _ = reports_tx.send(Some(report));
                    }
                    Ok(Err(e)) => error!(error = %e, "overdue sweep failed"),
                    Err(e) => error!(error = %e, "overdue sweep task aborted"),
                }

                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = scheduler.time.wait(scheduler.interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("overdue scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            reports: reports_rx,
            task,
        }
    }
}

/// owner of a running background sweep
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    reports: watch::Receiver<Option<SweepReport>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// report of the most recent completed sweep
    pub fn last_report(&self) -> Option<SweepReport> {
        *self.reports.borrow()
    }

    /// wait until the next sweep completes
    pub async fn next_report(&mut self) -> Option<SweepReport> {
        self.reports.changed().await.ok()?;
        *self.reports.borrow_and_update()
    }

    /// stop the task after any sweep in progress and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "overdue scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::loan::fixtures::{active_loan, jan_17};
    use crate::store::testing::FailingStore;
    use crate::store::InMemoryLoanStore;
    use crate::types::LoanStatus;
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;

    #[test]
    fn test_manual_sweep_counts_transitions() {
        let store = Arc::new(InMemoryLoanStore::new());
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap()));
        let control = time.test_control().unwrap();
        let scheduler = OverdueScheduler::new(Arc::clone(&store), time.clone(), &LendingConfig::default());

        // paid once on 2024-02-17, next due 2024-03-17
        let mut paying = active_loan(jan_17());
        paying.last_payment_date = Some(Utc.with_ymd_and_hms(2024, 2, 17, 0, 0, 0).unwrap());
        let unpaid = active_loan(jan_17());
        let mut closed = active_loan(jan_17());
        closed.status = LoanStatus::Completed;
        closed.outstanding_balance = Money::ZERO;

        let paying_id = paying.id;
        for loan in [paying, unpaid, closed] {
            store.insert_loan(loan).unwrap();
        }

        let report = scheduler.run_now().unwrap();
        assert_eq!(report.total_processed, 2);
        assert_eq!(report.new_overdue_count, 0);

        // 2024-02-20: the unpaid loan missed its 2024-02-17 installment
        control.advance(Duration::days(10));
        let report = scheduler.run_now().unwrap();
        assert_eq!(report.new_overdue_count, 1);
        assert_eq!(report.cleared_overdue_count, 0);

        // 2024-06-16: the paying loan is 91 days past 2024-03-17
        control.set(Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap());
        let report = scheduler.run_now().unwrap();
        assert_eq!(report.new_overdue_count, 1);
        assert_eq!(report.defaulted_count, 1);
        assert_eq!(report.failed_count, 0);
        assert_eq!(store.find_loan(paying_id).unwrap().status, LoanStatus::Defaulted);

        // defaulted loans drop out of later sweeps
        let report = scheduler.run_now().unwrap();
        assert_eq!(report.total_processed, 1);
        assert_eq!(report.defaulted_count, 0);
    }

    #[test]
    fn test_failing_loan_does_not_abort_sweep() {
        let broken = active_loan(jan_17());
        let broken_id = broken.id;
        let store = Arc::new(FailingStore::new(broken_id, 0));

        // all three missed the 2024-02-17 installment
        let healthy: Vec<_> = (0..2).map(|_| active_loan(jan_17())).collect();
        let healthy_ids: Vec<_> = healthy.iter().map(|l| l.id).collect();
        store.inner.insert_loan(broken).unwrap();
        for loan in healthy {
            store.inner.insert_loan(loan).unwrap();
        }

        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap()));
        let scheduler = OverdueScheduler::new(Arc::clone(&store), time, &LendingConfig::default());

        let report = scheduler.run_now().unwrap();
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.total_processed, 2);
        assert_eq!(report.new_overdue_count, 2);

        for id in healthy_ids {
            assert!(store.find_loan(id).unwrap().is_overdue());
        }
        assert!(!store.find_loan(broken_id).unwrap().is_overdue());
    }

    #[tokio::test]
    async fn test_background_sweep_runs_and_stops() {
        let store = Arc::new(InMemoryLoanStore::new());
        let mut loan = active_loan(jan_17());
        // last paid 2024-02-17, so every real clock puts it far past due
        loan.last_payment_date = Some(Utc.with_ymd_and_hms(2024, 2, 17, 0, 0, 0).unwrap());
        let loan_id = loan.id;
        store.insert_loan(loan).unwrap();

        let time = SafeTimeProvider::new(TimeSource::System);
        let scheduler = OverdueScheduler::new(Arc::clone(&store), time, &LendingConfig::default());

        let mut handle = scheduler.start();
        let report = handle.next_report().await.unwrap();

        assert_eq!(report.total_processed, 1);
        assert_eq!(report.new_overdue_count, 1);
        assert_eq!(report.defaulted_count, 1);
        assert_eq!(handle.last_report(), Some(report));

        handle.shutdown().await;
        assert_eq!(store.find_loan(loan_id).unwrap().status, LoanStatus::Defaulted);
    }
}
