/// lifecycle - a loan from application to collateral release on controlled time
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use gold_loan_core::{
    CreateLoanRequest, InMemoryLoanStore, LendingConfig, LoanService, LoanStore, Money, NewGoldItem, OverdueService,
    PaymentLedger, PaymentMethod, PaymentRequest, PaymentType, PurityGrade, Rate, SafeTimeProvider, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== gold loan lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 17, 10, 0, 0).unwrap()));
    let control = time.test_control().unwrap();

    let store = Arc::new(InMemoryLoanStore::new());
    let config = LendingConfig::from_env()?;
    let ledger = PaymentLedger::new(Arc::clone(&store), time.clone(), &config);
    let loans = LoanService::new(Arc::clone(&store), time.clone(), config);
    let overdue = OverdueService::new(Arc::clone(&store), time.clone());

    let loan = loans.create_loan(CreateLoanRequest {
        customer_id: "CUST-042".to_string(),
        principal: Money::from_major(100_000),
        annual_rate: Rate::from_percentage(12),
        tenure_months: 12,
        gold_items: vec![
            NewGoldItem {
                description: "22K bangles (pair)".to_string(),
                weight_grams: dec!(20),
                purity: PurityGrade::K22,
                rate_per_gram: Money::from_major(5_800),
            },
            NewGoldItem {
                description: "24K coin".to_string(),
                weight_grams: dec!(5),
                purity: PurityGrade::K24,
                rate_per_gram: Money::from_major(6_300),
            },
        ],
        penalty: None,
    })?;
    println!("created {} | emi {} | ltv {}", loan.loan_number, loan.emi_amount, loan.ltv);

    loans.approve_loan(loan.id)?;
    loans.disburse_loan(loan.id, PaymentMethod::BankTransfer)?;
    println!("disbursed on {}", time.now().format("%Y-%m-%d"));

    // first installment on time
    control.advance(Duration::days(31));
    ledger.record_payment(PaymentRequest::new(loan.id, loan.emi_amount, PaymentType::Emi, PaymentMethod::Upi))?;
    let current = loans.find_loan(loan.id)?;
    println!(
        "{} paid {} | outstanding {} | next due {:?}",
        time.now().format("%Y-%m-%d"),
        loan.emi_amount,
        current.outstanding_balance,
        current.overdue.next_due_date.map(|d| d.format("%Y-%m-%d").to_string())
    );

    // second installment missed
    control.advance(Duration::days(45));
    let late = overdue.update_loan_overdue_status(loan.id)?;
    println!(
        "{} overdue {} days | amount {} | penalty {}",
        time.now().format("%Y-%m-%d"),
        late.overdue.days_overdue,
        late.overdue.overdue_amount,
        late.overdue.penalty_amount
    );

    // settle penalty and close out the balance
    if late.overdue.penalty_amount.is_positive() {
        ledger.record_payment(PaymentRequest::new(
            loan.id,
            late.overdue.penalty_amount,
            PaymentType::Penalty,
            PaymentMethod::Cash,
        ))?;
    }
    ledger.record_payment(PaymentRequest::new(
        loan.id,
        late.outstanding_balance,
        PaymentType::Closure,
        PaymentMethod::BankTransfer,
    ))?;

    let closed = loans.find_loan(loan.id)?;
    println!("status {} | total paid {}", closed.status, closed.total_amount_paid);

    let released = loans.release_gold_items(loan.id)?;
    println!("released {} items", released.len());

    println!("\naudit trail:");
    for event in store.events_for_loan(loan.id)? {
        println!("  {:?}", event);
    }

    Ok(())
}
