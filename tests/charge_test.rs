mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{
    BalanceShiftingProvider, DownProvider, balance_of, record_count, seed_user, test_service,
    test_service_with,
};
use tallycalc::application::{AppError, OperationError, RecordQuery};
use tallycalc::config::ServiceConfig;
use tallycalc::domain::{ArithmeticError, DEFAULT_CATALOG, Operands, OperationType, Record};
use tallycalc::io::ProviderError;
use tallycalc::storage::ChargeCommit;

#[tokio::test]
async fn test_division_charges_cost_and_records_result() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "alice", 10000).await?;

    let outcome = service
        .charge_and_record(user.id, "division", Operands::binary(6.0, 3.0))
        .await?;

    assert_eq!(outcome.result, "2");
    assert_eq!(outcome.record.amount_cents, 200);
    assert_eq!(outcome.record.user_balance_cents, 9800);
    assert_eq!(outcome.record.operation_type, OperationType::Division);
    assert_eq!(outcome.record.user_id, user.id);
    assert!(outcome.record.sequence > 0);

    assert_eq!(balance_of(&service, &user).await?, 9800);

    let page = service.list_records(user.id, RecordQuery::default()).await?;
    assert_eq!(page.total_count, 1);
    assert_eq!(page.records[0].result, "2");
    assert_eq!(page.records[0].amount_cents, 200);

    Ok(())
}

#[tokio::test]
async fn test_insufficient_balance_leaves_no_trace() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "bob", 100).await?;

    let err = service
        .charge_and_record(user.id, "multiplication", Operands::binary(2.0, 3.0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::InsufficientBalance {
            balance: 100,
            required: 150
        }
    ));
    assert_eq!(balance_of(&service, &user).await?, 100);
    assert_eq!(record_count(&service, &user).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_exact_balance_can_be_spent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "carol", 100).await?;

    let outcome = service
        .charge_and_record(user.id, "addition", Operands::binary(1.0, 1.0))
        .await?;
    assert_eq!(outcome.result, "2");
    assert_eq!(balance_of(&service, &user).await?, 0);

    let err = service
        .charge_and_record(user.id, "addition", Operands::binary(1.0, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { .. }));

    Ok(())
}

#[tokio::test]
async fn test_affordability_is_checked_before_operands() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "dave", 0).await?;

    let err = service
        .charge_and_record(user.id, "addition", Operands::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { .. }));

    Ok(())
}

#[tokio::test]
async fn test_division_by_zero_is_not_charged() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "erin", 10000).await?;

    let err = service
        .charge_and_record(user.id, "division", Operands::binary(5.0, 0.0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::OperationFailed(OperationError::Arithmetic(ArithmeticError::DivisionByZero))
    ));
    assert_eq!(err.to_string(), "division by zero is not allowed");
    assert_eq!(balance_of(&service, &user).await?, 10000);
    assert_eq!(record_count(&service, &user).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_overflowing_result_is_not_charged() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "ursula", 1000).await?;

    let err = service
        .charge_and_record(user.id, "multiplication", Operands::binary(1e308, 10.0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::OperationFailed(OperationError::Arithmetic(ArithmeticError::Overflow))
    ));
    assert_eq!(balance_of(&service, &user).await?, 1000);
    assert_eq!(record_count(&service, &user).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_negative_square_root_is_not_charged() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "frank", 10000).await?;

    let err = service
        .charge_and_record(user.id, "square_root", Operands::unary(-4.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::OperationFailed(OperationError::Arithmetic(ArithmeticError::NegativeOperand))
    ));
    assert_eq!(balance_of(&service, &user).await?, 10000);

    let outcome = service
        .charge_and_record(user.id, "square_root", Operands::unary(16.0))
        .await?;
    assert_eq!(outcome.result, "4");
    assert_eq!(balance_of(&service, &user).await?, 9750);

    Ok(())
}

#[tokio::test]
async fn test_missing_operands_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "grace", 10000).await?;

    let err = service
        .charge_and_record(user.id, "subtraction", Operands::unary(1.0))
        .await
        .unwrap_err();
    match err {
        AppError::MissingOperand(message) => {
            assert_eq!(
                message,
                "Both number1 and number2 are required for this operation"
            )
        }
        other => panic!("expected MissingOperand, got {other:?}"),
    }

    let err = service
        .charge_and_record(user.id, "square_root", Operands::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingOperand(_)));

    assert_eq!(balance_of(&service, &user).await?, 10000);
    assert_eq!(record_count(&service, &user).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_unknown_operation_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "heidi", 10000).await?;

    for name in ["modulus", "Addition", ""] {
        let err = service
            .charge_and_record(user.id, name, Operands::binary(1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)), "{name}");
    }
    assert_eq!(balance_of(&service, &user).await?, 10000);

    Ok(())
}

#[tokio::test]
async fn test_unseeded_operation_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "ivan", 10000).await?;

    sqlx::query("DELETE FROM operations WHERE operation_type = 'addition'")
        .execute(service.repository().pool())
        .await?;

    let err = service
        .charge_and_record(user.id, "addition", Operands::binary(1.0, 2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));

    Ok(())
}

#[tokio::test]
async fn test_unknown_user_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service
        .charge_and_record(uuid::Uuid::new_v4(), "addition", Operands::binary(1.0, 2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UserNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_random_string_uses_provider() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "judy", 1000).await?;

    let outcome = service
        .charge_and_record(user.id, "random_string", Operands::length(8))
        .await?;
    assert_eq!(outcome.result, "MOCKSTRING");
    assert_eq!(outcome.record.amount_cents, 250);
    assert_eq!(balance_of(&service, &user).await?, 750);

    // Length defaults when omitted
    let outcome = service
        .charge_and_record(user.id, "random_string", Operands::default())
        .await?;
    assert_eq!(outcome.result, "MOCKSTRING");

    Ok(())
}

#[tokio::test]
async fn test_random_string_length_out_of_range() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "ken", 1000).await?;

    for length in [0, 21, -1] {
        let err = service
            .charge_and_record(user.id, "random_string", Operands::length(length))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOperand(_)), "{length}");
    }
    assert_eq!(balance_of(&service, &user).await?, 1000);

    Ok(())
}

#[tokio::test]
async fn test_provider_failure_is_not_charged() -> Result<()> {
    let (service, _temp) =
        test_service_with(ServiceConfig::default(), Arc::new(DownProvider)).await?;
    let user = seed_user(&service, "leo", 1000).await?;

    let err = service
        .charge_and_record(user.id, "random_string", Operands::length(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::OperationFailed(OperationError::Provider(ProviderError::Unavailable(_)))
    ));
    assert_eq!(balance_of(&service, &user).await?, 1000);
    assert_eq!(record_count(&service, &user).await?, 0);

    // Arithmetic does not depend on the provider
    service
        .charge_and_record(user.id, "addition", Operands::binary(1.0, 2.0))
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_failed_record_insert_rolls_back_debit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "mallory", 10000).await?;

    sqlx::query("DROP TABLE records")
        .execute(service.repository().pool())
        .await?;

    let err = service
        .charge_and_record(user.id, "division", Operands::binary(6.0, 3.0))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PersistenceFailed(_)));
    assert_eq!(balance_of(&service, &user).await?, 10000);

    Ok(())
}

#[tokio::test]
async fn test_balance_is_conserved_over_many_charges() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "nina", 2000).await?;

    let requests = [
        ("addition", Operands::binary(1.0, 2.0)),
        ("division", Operands::binary(1.0, 0.0)),
        ("multiplication", Operands::binary(2.5, 4.0)),
        ("square_root", Operands::unary(2.0)),
        ("subtraction", Operands::binary(3.0, 10.0)),
        ("random_string", Operands::length(4)),
        ("modulus", Operands::binary(1.0, 2.0)),
        ("division", Operands::binary(1.0, 3.0)),
    ];

    let mut charged = 0;
    let mut successes = 0;
    for (name, operands) in requests {
        if let Ok(outcome) = service.charge_and_record(user.id, name, operands).await {
            charged += outcome.record.amount_cents;
            successes += 1;
        }
    }

    assert_eq!(successes, 6);
    assert_eq!(balance_of(&service, &user).await?, 2000 - charged);
    assert_eq!(record_count(&service, &user).await?, successes);

    let report = service.reconcile(user.id).await?;
    assert!(report.is_consistent());
    assert_eq!(report.charged_total_cents, charged);

    Ok(())
}

#[tokio::test]
async fn test_rendered_results() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "olivia", 10000).await?;

    let cases = [
        ("multiplication", Operands::binary(2.5, 4.0), "10"),
        ("subtraction", Operands::binary(3.0, 10.0), "-7"),
        ("division", Operands::binary(5.0, 2.0), "2.5"),
        ("addition", Operands::binary(0.1, 0.2), "0.30000000000000004"),
    ];
    for (name, operands, expected) in cases {
        let outcome = service.charge_and_record(user.id, name, operands).await?;
        assert_eq!(outcome.result, expected, "{name}");
    }

    Ok(())
}

#[tokio::test]
async fn test_seeding_never_overwrites_prices() -> Result<()> {
    let (service, _temp) = test_service().await?;

    // init already seeded the catalog
    assert_eq!(service.ensure_seeded(&DEFAULT_CATALOG).await?, 0);

    sqlx::query("UPDATE operations SET cost_cents = 999 WHERE operation_type = 'division'")
        .execute(service.repository().pool())
        .await?;
    assert_eq!(service.ensure_seeded(&DEFAULT_CATALOG).await?, 0);

    let operations = service.list_operations().await?;
    assert_eq!(operations.len(), 6);
    let division = operations
        .iter()
        .find(|op| op.operation_type == OperationType::Division)
        .unwrap();
    assert_eq!(division.cost_cents, 999);

    // A removed entry is restored at its default price
    sqlx::query("DELETE FROM operations WHERE operation_type = 'addition'")
        .execute(service.repository().pool())
        .await?;
    assert_eq!(service.ensure_seeded(&DEFAULT_CATALOG).await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_catalog_is_ordered_by_type() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let names: Vec<&str> = service
        .list_operations()
        .await?
        .iter()
        .map(|op| op.operation_type.as_str())
        .collect();
    assert_eq!(
        names,
        [
            "addition",
            "division",
            "multiplication",
            "random_string",
            "square_root",
            "subtraction"
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_price_change_applies_to_next_charge() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "peggy", 1000).await?;

    let first = service
        .charge_and_record(user.id, "addition", Operands::binary(1.0, 1.0))
        .await?;
    sqlx::query("UPDATE operations SET cost_cents = 300 WHERE operation_type = 'addition'")
        .execute(service.repository().pool())
        .await?;
    let second = service
        .charge_and_record(user.id, "addition", Operands::binary(1.0, 1.0))
        .await?;

    assert_eq!(first.record.amount_cents, 100);
    assert_eq!(second.record.amount_cents, 300);
    assert_eq!(balance_of(&service, &user).await?, 600);

    Ok(())
}

#[tokio::test]
async fn test_commit_gives_up_when_balance_keeps_changing() -> Result<()> {
    let provider = Arc::new(BalanceShiftingProvider::default());
    let config = ServiceConfig {
        max_commit_attempts: 1,
        ..ServiceConfig::default()
    };
    let (service, _temp) = test_service_with(config, provider.clone()).await?;
    provider.attach(&service);
    let user = seed_user(&service, "quinn", 1000).await?;

    let err = service
        .charge_and_record(user.id, "random_string", Operands::length(7))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PersistenceFailed(_)));
    assert_eq!(balance_of(&service, &user).await?, 999);
    assert_eq!(record_count(&service, &user).await?, 0);
    assert!(service.reconcile(user.id).await?.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_commit_retries_against_fresh_balance() -> Result<()> {
    let provider = Arc::new(BalanceShiftingProvider::default());
    let (service, _temp) = test_service_with(ServiceConfig::default(), provider.clone()).await?;
    provider.attach(&service);
    let user = seed_user(&service, "rita", 1000).await?;

    let outcome = service
        .charge_and_record(user.id, "random_string", Operands::length(7))
        .await?;

    assert_eq!(outcome.result, "SHIFTED");
    assert_eq!(outcome.record.user_balance_cents, 999 - 250);
    assert_eq!(balance_of(&service, &user).await?, 749);
    assert_eq!(record_count(&service, &user).await?, 1);
    assert!(service.reconcile(user.id).await?.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_stale_expected_balance_writes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = seed_user(&service, "sam", 10000).await?;
    let addition = service
        .list_operations()
        .await?
        .into_iter()
        .find(|op| op.operation_type == OperationType::Addition)
        .unwrap();
    let repo = service.repository();

    let mut stale = Record::new(&addition, user.id, "2".to_string());
    assert_eq!(
        repo.commit_charge(&mut stale, 9900).await?,
        ChargeCommit::BalanceChanged
    );
    assert_eq!(balance_of(&service, &user).await?, 10000);
    assert_eq!(record_count(&service, &user).await?, 0);
    assert!(repo.get_record(stale.id).await?.is_none());

    let mut fresh = Record::new(&addition, user.id, "2".to_string());
    assert_eq!(
        repo.commit_charge(&mut fresh, 10000).await?,
        ChargeCommit::Committed
    );
    assert!(fresh.sequence > 0);
    assert_eq!(fresh.user_balance_cents, 9900);
    assert_eq!(balance_of(&service, &user).await?, 9900);

    Ok(())
}
