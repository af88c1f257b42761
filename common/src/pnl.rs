//! Exit P&L arithmetic
//!
//! Prices are quoted in index points. Monetary P&L is the point move times the
//! instrument's lot size, and both steps round to two decimals half-up
//! (`floor(x * 100 + 0.5) / 100`), matching the desk's historical figures.

use crate::types::Instrument;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Exit reason stamped by every manual or bulk exit
pub const MANUAL_EXIT_REASON: &str = "Manual exit";

/// Result of pricing an exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPnl {
    /// Point move, rounded to cents
    pub points: Decimal,
    /// Monetary P&L, rounded to cents
    pub pnl: Decimal,
}

/// Round half-up to two decimal places
pub fn round_cents(value: Decimal) -> Decimal {
    (value * Decimal::ONE_HUNDRED + dec!(0.5)).floor() / Decimal::ONE_HUNDRED
}

/// P&L of closing a long position opened at `entry` at `exit`
pub fn exit_pnl(instrument: Instrument, entry: Decimal, exit: Decimal) -> ExitPnl {
    let points = round_cents(exit - entry);
    let pnl = round_cents(points * Decimal::from(instrument.lot_size()));
    ExitPnl { points, pnl }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nifty_exit() {
        let result = exit_pnl(Instrument::Nifty, dec!(100), dec!(105));
        assert_eq!(result.points, dec!(5));
        assert_eq!(result.pnl, dec!(250.00));
    }

    #[test]
    fn test_banknifty_loss() {
        let result = exit_pnl(Instrument::BankNifty, dec!(48250.40), dec!(48210.15));
        assert_eq!(result.points, dec!(-40.25));
        assert_eq!(result.pnl, dec!(-603.75));
    }

    #[test]
    fn test_other_instruments_use_unit_lot() {
        let result = exit_pnl(Instrument::Sensex, dec!(81000), dec!(81012.5));
        assert_eq!(result.pnl, dec!(12.5));
    }

    #[test]
    fn test_point_move_rounds_before_lot_multiplication() {
        // 0.125 points rounds to 0.13 before the 50x lot is applied
        let result = exit_pnl(Instrument::Nifty, dec!(100), dec!(100.125));
        assert_eq!(result.points, dec!(0.13));
        assert_eq!(result.pnl, dec!(6.5));
    }

    #[test]
    fn test_round_cents_is_half_up() {
        assert_eq!(round_cents(dec!(1.005)), dec!(1.01));
        assert_eq!(round_cents(dec!(-1.005)), dec!(-1.00));
        assert_eq!(round_cents(dec!(-1.006)), dec!(-1.01));
        assert_eq!(round_cents(dec!(2.344)), dec!(2.34));
    }
}
