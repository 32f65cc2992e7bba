//! Unified cross-margin scenarios over real sub-accounts: discounted
//! collateral, position-reversal credit, tiered maintenance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use gridarb::{
    UnifiedMarginConfig, UnifiedMarginEngine,
    data::{
        cash::Currency,
        domain::{
            ExecutionId, Market, OrderDirection, OrderId, OrderStatus, SecurityType, Symbol,
        },
        event::OrderEvent,
        security::Security,
    },
    margin::models::{BuyingPowerModel, MarginAccount},
    portfolio::sub_account::SubAccount,
};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn spot_symbol() -> Symbol {
    Symbol::new("BTCUSDT", SecurityType::Crypto, Market::Binance).unwrap()
}

fn future_symbol() -> Symbol {
    Symbol::new("BTCUSDT", SecurityType::CryptoFuture, Market::Binance).unwrap()
}

fn spot_security() -> Security {
    Security::new(spot_symbol(), "BTC", "USDT").with_quotes(
        dec("49990"),
        dec("50010"),
        dec("50000"),
    )
}

fn future_security() -> Security {
    Security::new(future_symbol(), "BTC", "USDT").with_quotes(
        dec("49990"),
        dec("50010"),
        dec("50000"),
    )
}

fn engine() -> UnifiedMarginEngine {
    UnifiedMarginEngine::new(UnifiedMarginConfig::default()).unwrap()
}

fn unified_account() -> SubAccount {
    let model = Arc::new(engine());
    let mut account = SubAccount::new("unified", "USDT", model);
    account.register_security(spot_security());
    account.register_security(future_security());
    account
}

fn fill(symbol: Symbol, direction: OrderDirection, quantity: &str, price: &str) -> OrderEvent {
    OrderEvent {
        order_id: OrderId(1),
        symbol,
        time: ts("2026-04-01T00:00:00Z"),
        status: OrderStatus::Filled,
        direction,
        fill_price: dec(price),
        fill_quantity: dec(quantity),
        fee: Decimal::ZERO,
        fee_currency: None,
        execution_id: Some(ExecutionId::from("e")),
        ticket: None,
    }
}

#[tokio::test]
async fn spot_collateral_discount_feeds_futures_buying_power() {
    // Cash 60k, buy 1 spot BTC at 50k -> cash 10k + 1 BTC held.
    let mut account = unified_account();
    account.deposit(&Currency::new("USDT"), dec("60000"));
    account.process_fill(
        &fill(spot_symbol(), OrderDirection::Buy, "1", "50000"),
        ts("2026-04-01T00:00:01Z"),
    );

    let engine = engine();
    // 10 000 + 1 * 50 000 * 0.95
    assert_eq!(engine.total_margin_balance(&account), dec("57500"));

    let bp = engine.buying_power(&account, &future_security(), OrderDirection::Buy);
    assert_eq!(bp, dec("287500"));
}

#[tokio::test]
async fn reversal_credit_matches_held_margin_exactly() {
    // Cash 50k, long 2 BTC futures at 50k.
    let mut account = unified_account();
    account.deposit(&Currency::new("USDT"), dec("50000"));
    account.process_fill(
        &fill(future_symbol(), OrderDirection::Buy, "2", "50000"),
        ts("2026-04-01T00:00:01Z"),
    );

    let engine = engine();
    assert_eq!(engine.total_margin_balance(&account), dec("50000"));
    assert_eq!(engine.futures_initial_margin(&account), dec("20000"));
    assert_eq!(engine.futures_maintenance_margin(&account), dec("2000"));

    // (50 000 - 20 000 + 2 000 + 20 000) * 5
    let sell = engine.buying_power(&account, &future_security(), OrderDirection::Sell);
    assert_eq!(sell, dec("260000"));

    // Same-side order gets no credit.
    let buy = engine.buying_power(&account, &future_security(), OrderDirection::Buy);
    assert_eq!(buy, dec("150000"));

    // Mirror: a short position credits Buy instead.
    let mut short_account = unified_account();
    short_account.deposit(&Currency::new("USDT"), dec("50000"));
    short_account.process_fill(
        &fill(future_symbol(), OrderDirection::Sell, "2", "50000"),
        ts("2026-04-01T00:00:01Z"),
    );
    assert_eq!(
        engine.buying_power(&short_account, &future_security(), OrderDirection::Buy),
        dec("260000")
    );
    assert_eq!(
        engine.buying_power(&short_account, &future_security(), OrderDirection::Sell),
        dec("150000")
    );
}

#[tokio::test]
async fn flat_account_is_direction_symmetric_with_reservation() {
    let mut config = UnifiedMarginConfig::default();
    config.required_free_buying_power_pct = dec("0.2");
    let engine = UnifiedMarginEngine::new(config).unwrap();

    let mut account = unified_account();
    account.deposit(&Currency::new("USDT"), dec("10000"));

    let buy = engine.buying_power(&account, &future_security(), OrderDirection::Buy);
    let sell = engine.buying_power(&account, &future_security(), OrderDirection::Sell);
    // balance * leverage * (1 - reserved)
    assert_eq!(buy, dec("40000"));
    assert_eq!(buy, sell);
}

#[tokio::test]
async fn tiered_maintenance_scales_with_position_value() {
    let engine = engine();
    let cases = [
        ("0.8", dec("200")),   // 40k value -> 0.5%
        ("2", dec("2000")),    // 100k value -> 2%
        ("12", dec("30000")),  // 600k value -> 5%
    ];

    for (quantity, expected) in cases {
        let mut account = unified_account();
        account.deposit(&Currency::new("USDT"), dec("1000000"));
        account.process_fill(
            &fill(future_symbol(), OrderDirection::Buy, quantity, "50000"),
            ts("2026-04-01T00:00:01Z"),
        );
        assert_eq!(
            engine.futures_maintenance_margin(&account),
            expected,
            "position of {quantity} BTC"
        );
    }
}

#[tokio::test]
async fn risk_ratio_reflects_collateral_over_maintenance() {
    let engine = engine();

    let mut account = unified_account();
    account.deposit(&Currency::new("USDT"), dec("10000"));
    // Long 0.8 BTC futures: maintenance 200.
    account.process_fill(
        &fill(future_symbol(), OrderDirection::Buy, "0.8", "50000"),
        ts("2026-04-01T00:00:01Z"),
    );

    let status = engine.account_margin_status(&account);
    assert_eq!(status.margin_balance, dec("10000"));
    assert_eq!(status.maintenance_margin, dec("200"));
    assert_eq!(status.risk_ratio, Some(dec("5000")));

    // Flat account: nothing at risk.
    let flat = unified_account();
    assert_eq!(engine.account_margin_status(&flat).risk_ratio, None);
}
