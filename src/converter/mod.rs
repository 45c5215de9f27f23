//! Currency conversion
//!
//! Pure minor-unit conversion driven by an injected [`RateTable`].
//! Rounding policy: truncate toward zero, remainder reported.

mod rate_table;

pub use rate_table::{Conversion, ConversionError, CurrencyPair, RateError, RateTable};
