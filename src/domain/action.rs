//! Market actions carried inside an [`Event`](crate::domain::event::Event).

use crate::domain::currency::Asset;

/// One OHLCV observation for an asset.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub asset: Asset,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(asset: Asset, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            asset,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// `[open, high, low, close, volume]`
    pub fn ohlcv(&self) -> [f64; 5] {
        [self.open, self.high, self.low, self.close, self.volume]
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Restate the bar so its close equals `adjusted_close`, as after a split
    /// or dividend. Prices scale by `adjusted_close / close`, volume inversely.
    pub fn adjust_close(&mut self, adjusted_close: f64) {
        let factor = adjusted_close / self.close;
        self.open *= factor;
        self.high *= factor;
        self.low *= factor;
        self.close = adjusted_close;
        self.volume /= factor;
    }
}

/// A single trade print.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePrice {
    pub asset: Asset,
    pub price: f64,
    pub volume: f64,
}

/// Best bid and ask.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub asset: Asset,
    pub ask_price: f64,
    pub ask_size: f64,
    pub bid_price: f64,
    pub bid_size: f64,
}

impl PriceQuote {
    pub fn mid_price(&self) -> f64 {
        (self.ask_price + self.bid_price) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderBookLevel {
    pub size: f64,
    pub limit: f64,
}

/// Order-book snapshot; levels are best first.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    pub asset: Asset,
    pub asks: Vec<OrderBookLevel>,
    pub bids: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// Mid of the best ask and bid; `None` when either side is empty.
    pub fn mid_price(&self) -> Option<f64> {
        let ask = self.asks.first()?;
        let bid = self.bids.first()?;
        Some((ask.limit + bid.limit) / 2.0)
    }

    pub fn total_size(&self) -> f64 {
        self.asks.iter().chain(self.bids.iter()).map(|l| l.size).sum()
    }
}

/// One unit of market information.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PriceBar(PriceBar),
    TradePrice(TradePrice),
    PriceQuote(PriceQuote),
    OrderBook(OrderBook),
    /// Anything without a price, e.g. news or corporate-action notices.
    Other { kind: String },
}

impl Action {
    pub fn asset(&self) -> Option<&Asset> {
        match self {
            Action::PriceBar(a) => Some(&a.asset),
            Action::TradePrice(a) => Some(&a.asset),
            Action::PriceQuote(a) => Some(&a.asset),
            Action::OrderBook(a) => Some(&a.asset),
            Action::Other { .. } => None,
        }
    }

    /// OHLCV-equivalent values for price-bearing actions.
    ///
    /// Single-price actions repeat their price across open/high/low/close.
    /// Returns `None` for `Other` and for an order book missing a side.
    pub fn price_values(&self) -> Option<[f64; 5]> {
        match self {
            Action::PriceBar(bar) => Some(bar.ohlcv()),
            Action::TradePrice(t) => Some([t.price, t.price, t.price, t.price, t.volume]),
            Action::PriceQuote(q) => {
                let mid = q.mid_price();
                Some([mid, mid, mid, mid, q.ask_size + q.bid_size])
            }
            Action::OrderBook(book) => {
                let mid = book.mid_price()?;
                Some([mid, mid, mid, mid, book.total_size()])
            }
            Action::Other { .. } => None,
        }
    }

    /// Close-equivalent price.
    pub fn price(&self) -> Option<f64> {
        self.price_values().map(|v| v[3])
    }

    pub fn as_price_bar(&self) -> Option<&PriceBar> {
        match self {
            Action::PriceBar(bar) => Some(bar),
            _ => None,
        }
    }
}

impl From<PriceBar> for Action {
    fn from(bar: PriceBar) -> Self {
        Action::PriceBar(bar)
    }
}

impl From<TradePrice> for Action {
    fn from(trade: TradePrice) -> Self {
        Action::TradePrice(trade)
    }
}

impl From<PriceQuote> for Action {
    fn from(quote: PriceQuote) -> Self {
        Action::PriceQuote(quote)
    }
}

impl From<OrderBook> for Action {
    fn from(book: OrderBook) -> Self {
        Action::OrderBook(book)
    }
}
