//! Currency codes and tradeable assets.

use std::fmt;
use std::sync::Arc;

/// An opaque, immutable currency code such as `USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency(Arc<str>);

impl Currency {
    pub fn new(code: &str) -> Self {
        Currency(Arc::from(code.trim().to_uppercase()))
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Currency::new(code)
    }
}

/// A tradeable instrument, identified by symbol and quote currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asset {
    pub symbol: String,
    pub currency: Currency,
}

impl Asset {
    pub fn new(symbol: &str, currency: Currency) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            currency,
        }
    }

    /// Asset quoted in USD.
    pub fn usd(symbol: &str) -> Self {
        Self::new(symbol, Currency::new("USD"))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.symbol, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_codes_are_normalised() {
        assert_eq!(Currency::new(" eur "), Currency::new("EUR"));
        assert_eq!(Currency::new("eur").code(), "EUR");
    }

    #[test]
    fn asset_identity_includes_currency() {
        let a = Asset::new("abc", Currency::new("USD"));
        let b = Asset::new("ABC", Currency::new("EUR"));
        assert_ne!(a, b);
        assert_eq!(a, Asset::usd("ABC"));
        assert_eq!(a.to_string(), "ABC.USD");
    }
}
