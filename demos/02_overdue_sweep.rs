/// overdue sweep - background scheduler plus a manual run over a small book
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use gold_loan_core::{
    CreateLoanRequest, InMemoryLoanStore, LendingConfig, LoanService, Money, NewGoldItem, OverdueScheduler,
    PaymentLedger, PaymentMethod, PaymentRequest, PaymentType, PortfolioReport, PurityGrade, Rate,
    SafeTimeProvider, TimeSource,
};
use rust_decimal_macros::dec;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== overdue sweep ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap()));
    let control = time.test_control().unwrap();
    let config = LendingConfig::default();

    let store = Arc::new(InMemoryLoanStore::new());
    let loans = LoanService::new(Arc::clone(&store), time.clone(), config.clone());
    let ledger = PaymentLedger::new(Arc::clone(&store), time.clone(), &config);

    let mut book = Vec::new();
    for (customer, principal) in [("CUST-1", 40_000), ("CUST-2", 75_000), ("CUST-3", 120_000)] {
        let loan = loans.create_loan(CreateLoanRequest {
            customer_id: customer.to_string(),
            principal: Money::from_major(principal),
            annual_rate: Rate::from_percentage(dec!(14.5)),
            tenure_months: 12,
            gold_items: vec![NewGoldItem {
                description: format!("{} jewellery", customer),
                weight_grams: Money::from_major(principal).as_decimal() / dec!(4_000),
                purity: PurityGrade::K22,
                rate_per_gram: Money::from_major(6_000),
            }],
            penalty: None,
        })?;
        book.push(loans.disburse_loan(loan.id, PaymentMethod::Cash)?);
    }

    // everyone pays the first installment, only the first customer keeps paying
    control.advance(Duration::days(31));
    for loan in &book {
        ledger.record_payment(PaymentRequest::new(loan.id, loan.emi_amount, PaymentType::Emi, PaymentMethod::Upi))?;
    }
    for _ in 0..4 {
        control.advance(Duration::days(30));
        let loan = &book[0];
        ledger.record_payment(PaymentRequest::new(loan.id, loan.emi_amount, PaymentType::Emi, PaymentMethod::Upi))?;
    }

    let scheduler = OverdueScheduler::new(Arc::clone(&store), time.clone(), &config);

    // the background task sweeps once on start
    let mut handle = scheduler.start();
    if let Some(report) = handle.next_report().await {
        println!("{} background sweep: {:?}", time.now().format("%Y-%m-%d"), report);
    }
    handle.shutdown().await;

    // a month later the stalled loans cross the default threshold
    control.advance(Duration::days(30));
    let report = scheduler.run_now()?;
    println!("{} manual sweep: {:?}", time.now().format("%Y-%m-%d"), report);

    let portfolio = PortfolioReport::build(store.as_ref())?;
    println!("\n{}", serde_json::to_string_pretty(&portfolio)?);

    Ok(())
}
