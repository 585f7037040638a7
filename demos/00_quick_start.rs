/// quick start - originate a gold loan, disburse it and take one payment
use std::sync::Arc;

use gold_loan_core::{
    CreateLoanRequest, InMemoryLoanStore, LendingConfig, LoanService, Money, NewGoldItem, PaymentLedger,
    PaymentMethod, PaymentRequest, PaymentType, PurityGrade, Rate, SafeTimeProvider, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = Arc::new(InMemoryLoanStore::new());
    let time = SafeTimeProvider::new(TimeSource::System);
    let config = LendingConfig::default();
    let ledger = PaymentLedger::new(Arc::clone(&store), time.clone(), &config);
    let loans = LoanService::new(Arc::clone(&store), time, config);

    // 50,000 against a 22K chain
    let loan = loans.create_loan(CreateLoanRequest {
        customer_id: "CUST-001".to_string(),
        principal: Money::from_major(50_000),
        annual_rate: Rate::from_percentage(12),
        tenure_months: 6,
        gold_items: vec![NewGoldItem {
            description: "22K chain".to_string(),
            weight_grams: dec!(12.5),
            purity: PurityGrade::K22,
            rate_per_gram: Money::from_major(6_000),
        }],
        penalty: None,
    })?;

    // approve and disburse
    loans.approve_loan(loan.id)?;
    let loan = loans.disburse_loan(loan.id, PaymentMethod::BankTransfer)?;

    // pay the first installment
    ledger.record_payment(PaymentRequest::new(loan.id, loan.emi_amount, PaymentType::Emi, PaymentMethod::Upi))?;

    println!("{}", loans.find_loan(loan.id)?.to_json_pretty());

    Ok(())
}
