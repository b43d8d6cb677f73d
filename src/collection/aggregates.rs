//! Derived portfolio and holding aggregates (spec section 4.5.2). These are
//! pure functions over plain structs — no store or vendor access — so they
//! are bit-exactly reproducible and trivially unit-testable. The structs
//! here are the narrow slice of a user's portfolio document the core must
//! reproduce bit-exactly; everything else about portfolio-compliance
//! business logic is out of scope (spec section 1).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub date: NaiveDate,
    pub units: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub native_currency: String,
    pub buys: Vec<Lot>,
    pub sells: Vec<Lot>,
    /// Realized P&L from closed portions of this holding, signed (a loss is
    /// negative). Spec section 4.5.2: "realized profit lowers the
    /// break-even, realized loss raises it".
    pub realized_return: f64,
    pub current_price: f64,
    /// FX rate (native currency -> display currency) at the time this
    /// holding was last marked; used for the FX gain contract.
    pub current_fx: f64,
    pub purchase_fx: f64,
    pub capital_gain_in_native: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashTransaction {
    pub date: NaiveDate,
    /// Signed ledger entry: positive is a deposit/credit, negative a
    /// withdrawal/debit (spec section 4.5.2, "gross cash is the sum of
    /// signed ledger entries").
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioInput {
    pub holdings: Vec<Holding>,
    pub cash_transactions: Vec<CashTransaction>,
    pub display_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldingAggregate {
    pub ticker: String,
    pub equity_value: f64,
    pub units_remaining: f64,
    pub avg_cost: f64,
    pub net_equity_cost: f64,
    pub true_breakeven_price: Option<f64>,
    pub net_return: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioAggregate {
    pub equity_value: f64,
    pub net_equity_cost: f64,
    pub gross_cash_balance: f64,
    pub net_cash_balance: f64,
    pub portfolio_value: f64,
    pub holdings: Vec<HoldingAggregate>,
    pub cash_transactions: Vec<CashTransaction>,
}

fn units_remaining(holding: &Holding) -> f64 {
    let bought: f64 = holding.buys.iter().map(|l| l.units).sum();
    let sold: f64 = holding.sells.iter().map(|l| l.units).sum();
    bought - sold
}

fn gross_invested(holding: &Holding) -> f64 {
    holding.buys.iter().map(|l| l.units * l.price).sum()
}

fn avg_cost(holding: &Holding) -> f64 {
    let bought: f64 = holding.buys.iter().map(|l| l.units).sum();
    if bought == 0.0 {
        0.0
    } else {
        gross_invested(holding) / bought
    }
}

/// `net_equity_cost` per holding: `avg_cost * units_remaining` (spec
/// section 4.5.2).
fn holding_net_equity_cost(holding: &Holding) -> f64 {
    avg_cost(holding) * units_remaining(holding)
}

/// `true_breakeven_price = (cost_basis - realized_return) / units_remaining`
/// when `units_remaining > 0`; null otherwise (spec section 4.5.2, section
/// 8 boundary behavior). `cost_basis` is `avg_cost * units_remaining`
/// (spec.md section 4.5.2's "Per holding: `avg_cost × units_remaining`"),
/// not the holding's total invested capital.
pub fn true_breakeven_price(holding: &Holding) -> Option<f64> {
    let remaining = units_remaining(holding);
    if remaining <= 0.0 {
        return None;
    }
    let cost_basis = holding_net_equity_cost(holding);
    Some((cost_basis - holding.realized_return) / remaining)
}

/// FX gain contract (spec section 4.5.2): `net_return` must include both
/// the capital component (in native currency, already converted) and the
/// FX component, never silently dropping the latter for non-display
/// holdings.
pub fn net_return(holding: &Holding) -> f64 {
    let capital = holding.capital_gain_in_native * holding.current_fx;
    let fx_component = units_remaining(holding) * avg_cost(holding) * (holding.current_fx - holding.purchase_fx);
    capital + fx_component
}

fn holding_aggregate(holding: &Holding) -> HoldingAggregate {
    let remaining = units_remaining(holding);
    HoldingAggregate {
        ticker: holding.ticker.clone(),
        equity_value: remaining * holding.current_price,
        units_remaining: remaining,
        avg_cost: avg_cost(holding),
        net_equity_cost: holding_net_equity_cost(holding),
        true_breakeven_price: true_breakeven_price(holding),
        net_return: net_return(holding),
    }
}

/// Compute the full set of portfolio- and holding-level aggregates (spec
/// section 4.5.2). Holdings are ordered by descending `equity_value`, ties
/// broken by ticker ascending; cash transactions are ordered date
/// ascending (spec section 4.5.2, "Ordering and tie-breaks").
pub fn compute_portfolio_aggregate(input: &PortfolioInput) -> PortfolioAggregate {
    let mut holdings: Vec<HoldingAggregate> = input.holdings.iter().map(holding_aggregate).collect();
    holdings.sort_by(|a, b| {
        b.equity_value
            .partial_cmp(&a.equity_value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    let equity_value: f64 = holdings.iter().map(|h| h.equity_value).sum();
    let net_equity_cost: f64 = input.holdings.iter().map(holding_net_equity_cost).sum();
    let gross_cash_balance: f64 = input.cash_transactions.iter().map(|t| t.amount).sum();
    let net_cash_balance = gross_cash_balance - net_equity_cost;
    let portfolio_value = equity_value + net_cash_balance;

    let mut cash_transactions = input.cash_transactions.clone();
    cash_transactions.sort_by_key(|t| t.date);

    PortfolioAggregate {
        equity_value,
        net_equity_cost,
        gross_cash_balance,
        net_cash_balance,
        portfolio_value,
        holdings,
        cash_transactions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(date: (i32, u32, u32), units: f64, price: f64) -> Lot {
        Lot {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            units,
            price,
        }
    }

    /// Scenario from spec section 8: filing break-even.
    #[test]
    fn filing_break_even_matches_spec_scenario() {
        let holding = Holding {
            ticker: "FILING".to_string(),
            native_currency: "AUD".to_string(),
            buys: vec![
                lot((2025, 12, 24), 4925.0, 4.0248),
                lot((2026, 2, 5), 2511.0, 3.980),
                lot((2026, 2, 13), 2456.0, 4.070),
            ],
            sells: vec![
                lot((2026, 1, 22), 1333.0, 3.7627),
                lot((2026, 1, 27), 819.0, 3.680),
                lot((2026, 1, 29), 2773.0, 3.4508),
            ],
            realized_return: -2235.47,
            current_price: 0.0,
            current_fx: 1.0,
            purchase_fx: 1.0,
            capital_gain_in_native: 0.0,
        };

        let breakeven = true_breakeven_price(&holding).unwrap();
        assert!((breakeven - 4.47).abs() < 0.01, "breakeven was {breakeven}");
    }

    #[test]
    fn breakeven_is_null_when_nothing_remains() {
        let holding = Holding {
            ticker: "CLOSED".to_string(),
            native_currency: "USD".to_string(),
            buys: vec![lot((2026, 1, 1), 10.0, 5.0)],
            sells: vec![lot((2026, 2, 1), 10.0, 6.0)],
            realized_return: 10.0,
            current_price: 6.0,
            current_fx: 1.0,
            purchase_fx: 1.0,
            capital_gain_in_native: 0.0,
        };
        assert_eq!(true_breakeven_price(&holding), None);
    }

    /// Scenario from spec section 8: FX preservation.
    #[test]
    fn fx_component_is_not_dropped() {
        let holding = Holding {
            ticker: "US_STOCK".to_string(),
            native_currency: "USD".to_string(),
            buys: vec![lot((2025, 1, 1), 124.0, 10.0)],
            sells: vec![],
            realized_return: 0.0,
            current_price: 12.0,
            current_fx: 1.50,
            purchase_fx: 1.40,
            capital_gain_in_native: 2833.0 / 1.50,
        };
        let result = net_return(&holding);
        assert!((result - 3266.0).abs() < 5.0, "net_return was {result}");
    }

    #[test]
    fn portfolio_value_equals_equity_plus_net_cash() {
        let input = PortfolioInput {
            holdings: vec![Holding {
                ticker: "AAPL".to_string(),
                native_currency: "USD".to_string(),
                buys: vec![lot((2026, 1, 1), 10.0, 100.0)],
                sells: vec![],
                realized_return: 0.0,
                current_price: 120.0,
                current_fx: 1.0,
                purchase_fx: 1.0,
                capital_gain_in_native: 0.0,
            }],
            cash_transactions: vec![
                CashTransaction { date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), amount: 5000.0 },
                CashTransaction { date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), amount: -1000.0 },
            ],
            display_currency: "USD".to_string(),
        };

        let aggregate = compute_portfolio_aggregate(&input);
        assert_eq!(aggregate.portfolio_value, aggregate.equity_value + aggregate.net_cash_balance);
        assert_eq!(aggregate.net_cash_balance, aggregate.gross_cash_balance - aggregate.net_equity_cost);
    }

    #[test]
    fn holdings_ordered_by_descending_equity_value_then_ticker() {
        let small = Holding {
            ticker: "BBB".to_string(),
            native_currency: "USD".to_string(),
            buys: vec![lot((2026, 1, 1), 1.0, 10.0)],
            sells: vec![],
            realized_return: 0.0,
            current_price: 10.0,
            current_fx: 1.0,
            purchase_fx: 1.0,
            capital_gain_in_native: 0.0,
        };
        let large = Holding {
            ticker: "AAA".to_string(),
            native_currency: "USD".to_string(),
            buys: vec![lot((2026, 1, 1), 100.0, 10.0)],
            sells: vec![],
            realized_return: 0.0,
            current_price: 10.0,
            current_fx: 1.0,
            purchase_fx: 1.0,
            capital_gain_in_native: 0.0,
        };
        let input = PortfolioInput {
            holdings: vec![small, large],
            cash_transactions: vec![],
            display_currency: "USD".to_string(),
        };
        let aggregate = compute_portfolio_aggregate(&input);
        assert_eq!(aggregate.holdings[0].ticker, "AAA");
        assert_eq!(aggregate.holdings[1].ticker, "BBB");
    }
}
