//! Portfolio/execution boundary
//!
//! The engine never talks to a broker, a database, or an account object
//! directly. Everything it needs from the outside world at decision time
//! comes through this trait, and everything it wants done goes out as an
//! [`Instruction`](crate::types::Instruction).

use rust_decimal::Decimal;

use crate::types::{Holding, Symbol};

/// Read-only snapshot of the account as settled by the execution backend.
///
/// Contract notes:
/// - The backend is authoritative. An emitted target may fill partially,
///   late, or not at all; the engine picks up whatever the backend
///   settled on through `current_holding` on the next bar.
/// - `current_equity` and `current_price` must reflect the latest state
///   at the moment they are called. The engine reads them immediately
///   before sizing, never from values cached earlier in the bar.
pub trait PortfolioView {
    /// Total account equity.
    fn current_equity(&self) -> Decimal;

    /// Latest traded price for the instrument.
    fn current_price(&self, symbol: &Symbol) -> Decimal;

    /// Settled position state for the instrument.
    fn current_holding(&self, symbol: &Symbol) -> Holding;
}
