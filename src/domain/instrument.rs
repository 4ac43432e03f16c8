//! Instrument contract economics and the money value of a price move.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentClass {
    Forex,
    Cfd,
    Futures,
    Shares,
}

impl InstrumentClass {
    pub fn parse(value: &str) -> Option<InstrumentClass> {
        match value.trim().to_lowercase().as_str() {
            "forex" | "fx" => Some(InstrumentClass::Forex),
            "cfd" => Some(InstrumentClass::Cfd),
            "futures" | "future" => Some(InstrumentClass::Futures),
            "shares" | "stock" | "stocks" => Some(InstrumentClass::Shares),
            _ => None,
        }
    }
}

/// How a FOREX pair relates to the USD account currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteConvention {
    /// `USDXXX`, e.g. USDJPY.
    UsdBase,
    /// `XXXUSD`, e.g. EURUSD.
    UsdQuoted,
    /// Neither leg is USD, e.g. GBPCHF.
    Cross,
}

impl QuoteConvention {
    pub fn classify(ticker: &str) -> QuoteConvention {
        let symbol: String = ticker
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_uppercase();
        if symbol.starts_with("USD") {
            QuoteConvention::UsdBase
        } else if symbol.ends_with("USD") {
            QuoteConvention::UsdQuoted
        } else {
            QuoteConvention::Cross
        }
    }
}

pub const DEFAULT_CONTRACT_SIZE: i64 = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub ticker: String,
    pub class: InstrumentClass,
    pub tick_size: f64,
    pub tick_value: Option<f64>,
    pub contract_size: Option<i64>,
    pub digits: u32,
}

impl Instrument {
    pub fn new(
        ticker: impl Into<String>,
        class: InstrumentClass,
        tick_size: f64,
        tick_value: Option<f64>,
        contract_size: Option<i64>,
    ) -> Self {
        let contract_size = match class {
            InstrumentClass::Forex | InstrumentClass::Cfd => {
                Some(contract_size.unwrap_or(DEFAULT_CONTRACT_SIZE))
            }
            _ => contract_size,
        };
        Instrument {
            ticker: ticker.into(),
            class,
            tick_size,
            tick_value,
            contract_size,
            digits: decimal_digits(tick_size),
        }
    }

    pub fn shares(ticker: impl Into<String>, tick_size: f64) -> Self {
        Instrument::new(ticker, InstrumentClass::Shares, tick_size, None, None)
    }

    pub fn forex(ticker: impl Into<String>, tick_size: f64) -> Self {
        Instrument::new(ticker, InstrumentClass::Forex, tick_size, None, None)
    }

    pub fn cfd(ticker: impl Into<String>, tick_size: f64) -> Self {
        Instrument::new(ticker, InstrumentClass::Cfd, tick_size, None, None)
    }

    pub fn futures(ticker: impl Into<String>, tick_size: f64, tick_value: f64) -> Self {
        Instrument::new(
            ticker,
            InstrumentClass::Futures,
            tick_size,
            Some(tick_value),
            None,
        )
    }

    /// Money value of a signed price move (already direction-adjusted).
    ///
    /// `close_price` is needed for USD-base FOREX pairs, where the pip value
    /// is converted back into USD at the closing rate. Cross pairs reuse the
    /// USD-quoted formula: no cross rate is available here, so their result is
    /// an approximation.
    pub fn profit(&self, price_delta: f64, close_price: f64, volume: f64) -> f64 {
        let contract_size = self.contract_size.unwrap_or(DEFAULT_CONTRACT_SIZE) as f64;
        match self.class {
            InstrumentClass::Shares => price_delta * volume,
            InstrumentClass::Futures => {
                let tick_value = self.tick_value.unwrap_or(0.0);
                if self.tick_size == 0.0 {
                    return 0.0;
                }
                price_delta * tick_value / self.tick_size * volume
            }
            InstrumentClass::Forex
                if QuoteConvention::classify(&self.ticker) == QuoteConvention::UsdBase =>
            {
                if self.tick_size == 0.0 || close_price == 0.0 {
                    return 0.0;
                }
                let points = price_delta / self.tick_size;
                points * self.tick_size * contract_size / close_price * volume
            }
            InstrumentClass::Forex | InstrumentClass::Cfd => price_delta * contract_size * volume,
        }
    }
}

fn decimal_digits(tick_size: f64) -> u32 {
    if tick_size <= 0.0 || tick_size.fract() == 0.0 {
        return 0;
    }
    let text = format!("{tick_size}");
    text.split_once('.')
        .map(|(_, frac)| frac.len() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn classify_quote_conventions() {
        assert_eq!(QuoteConvention::classify("EURUSD"), QuoteConvention::UsdQuoted);
        assert_eq!(QuoteConvention::classify("USD/JPY"), QuoteConvention::UsdBase);
        assert_eq!(QuoteConvention::classify("gbpchf"), QuoteConvention::Cross);
    }

    #[test]
    fn forex_defaults_contract_size() {
        let eurusd = Instrument::forex("EURUSD", 0.00001);
        assert_eq!(eurusd.contract_size, Some(100_000));
        assert_eq!(eurusd.digits, 5);
    }

    #[test]
    fn shares_digits() {
        assert_eq!(Instrument::shares("AAPL", 0.01).digits, 2);
        assert_eq!(Instrument::shares("RTS", 10.0).digits, 0);
    }

    #[test]
    fn shares_profit() {
        let aapl = Instrument::shares("AAPL", 0.01);
        assert_relative_eq!(aapl.profit(2.0, 12.0, 100.0), 200.0);
    }

    #[test]
    fn usd_quoted_forex_profit() {
        // (1.05875 - 1.05850) * 100000 * 1
        let eurusd = Instrument::forex("EURUSD", 0.00001);
        let profit = eurusd.profit(1.05875 - 1.05850, 1.05875, 1.0);
        assert_relative_eq!(profit, 25.0, epsilon = 1e-6);
    }

    #[test]
    fn usd_base_forex_profit() {
        // 17.5 pips on USDCHF closing at 1.00770
        let usdchf = Instrument::forex("USDCHF", 0.0001);
        let delta = 1.00770 - 1.00595;
        let profit = usdchf.profit(delta, 1.00770, 1.0);
        assert_relative_eq!(profit, delta * 100_000.0 / 1.00770, epsilon = 1e-9);
    }

    #[test]
    fn cross_forex_uses_usd_quoted_approximation() {
        let gbpchf = Instrument::forex("GBPCHF", 0.0001);
        let profit = gbpchf.profit(0.001, 1.48985, 1.0);
        assert_relative_eq!(profit, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn cfd_ignores_usd_base_rule() {
        let cfd = Instrument::cfd("USDINDEX", 0.01);
        assert_relative_eq!(cfd.profit(0.5, 100.0, 2.0), 100_000.0, epsilon = 1e-9);
    }

    #[test]
    fn futures_profit() {
        // CL: (46.35 - 46.30) * 10 / 0.01 * 1
        let cl = Instrument::futures("CL", 0.01, 10.0);
        assert_relative_eq!(cl.profit(46.35 - 46.30, 46.35, 1.0), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn parse_instrument_class() {
        assert_eq!(InstrumentClass::parse("FOREX"), Some(InstrumentClass::Forex));
        assert_eq!(InstrumentClass::parse(" futures "), Some(InstrumentClass::Futures));
        assert_eq!(InstrumentClass::parse("bond"), None);
    }
}
