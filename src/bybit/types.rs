//! Bybit v5 wire types
//!
//! Bybit encodes numbers as strings and uses `""` for absent values, so
//! decimal fields go through [`de::decimal`] which maps `""` to zero.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Product category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Spot,
    Linear,
    Inverse,
    Option,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Spot => "spot",
            Category::Linear => "linear",
            Category::Inverse => "inverse",
            Category::Option => "option",
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "Market",
            OrderType::Limit => "Limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC,
    IOC,
    FOK,
    PostOnly,
}

/// Timeframes accepted by [`interval_for`]
pub const TIMEFRAMES: [&str; 13] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "12h", "1d", "1w", "1M",
];

/// Map a human timeframe (`1h`) to Bybit's kline interval code (`60`)
pub fn interval_for(timeframe: &str) -> Option<&'static str> {
    let code = match timeframe {
        "1m" => "1",
        "3m" => "3",
        "5m" => "5",
        "15m" => "15",
        "30m" => "30",
        "1h" => "60",
        "2h" => "120",
        "4h" => "240",
        "6h" => "360",
        "12h" => "720",
        "1d" => "D",
        "1w" => "W",
        "1M" => "M",
        _ => return None,
    };
    Some(code)
}

/// Serde helpers for Bybit's string-encoded numbers
pub mod de {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    /// Decimal from a string or number, `""` and missing mean zero
    pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_decimal(deserializer)?.unwrap_or(Decimal::ZERO))
    }

    /// Decimal from a string or number, `""` means `None`
    pub fn opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Str(s)) if s.trim().is_empty() => Ok(None),
            Some(Raw::Str(s)) => Decimal::from_str(s.trim())
                .or_else(|_| Decimal::from_scientific(s.trim()))
                .map(Some)
                .map_err(serde::de::Error::custom),
            Some(Raw::Int(i)) => Ok(Some(Decimal::from(i))),
            Some(Raw::Float(f)) => Decimal::try_from(f)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }

    /// Integer from a string or number, `""` means zero
    pub fn int<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(0),
            Some(Raw::Str(s)) if s.trim().is_empty() => Ok(0),
            Some(Raw::Str(s)) => s.trim().parse().map_err(serde::de::Error::custom),
            Some(Raw::Int(i)) => Ok(i),
            Some(Raw::Float(f)) => Ok(f as i64),
        }
    }
}

/// Envelope wrapping every v5 response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub time: Option<i64>,
}

/// Paged list result
#[derive(Debug, Clone, Deserialize)]
pub struct ListResult<T> {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
    #[serde(rename = "nextPageCursor", default)]
    pub next_page_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: String,
    #[serde(deserialize_with = "de::decimal", default)]
    pub last_price: Decimal,
    #[serde(rename = "bid1Price", deserialize_with = "de::decimal", default)]
    pub bid_price: Decimal,
    #[serde(rename = "bid1Size", deserialize_with = "de::decimal", default)]
    pub bid_size: Decimal,
    #[serde(rename = "ask1Price", deserialize_with = "de::decimal", default)]
    pub ask_price: Decimal,
    #[serde(rename = "ask1Size", deserialize_with = "de::decimal", default)]
    pub ask_size: Decimal,
    #[serde(rename = "prevPrice24h", deserialize_with = "de::decimal", default)]
    pub prev_price_24h: Decimal,
    /// Fractional change, `0.0123` is 1.23%
    #[serde(rename = "price24hPcnt", deserialize_with = "de::decimal", default)]
    pub price_24h_pcnt: Decimal,
    #[serde(rename = "highPrice24h", deserialize_with = "de::decimal", default)]
    pub high_price_24h: Decimal,
    #[serde(rename = "lowPrice24h", deserialize_with = "de::decimal", default)]
    pub low_price_24h: Decimal,
    #[serde(rename = "turnover24h", deserialize_with = "de::decimal", default)]
    pub turnover_24h: Decimal,
    #[serde(rename = "volume24h", deserialize_with = "de::decimal", default)]
    pub volume_24h: Decimal,
}

impl Ticker {
    /// Bid/ask spread as a percentage of the mid price
    pub fn spread_pct(&self) -> Option<Decimal> {
        if self.bid_price.is_zero() || self.ask_price.is_zero() {
            return None;
        }
        let mid = (self.bid_price + self.ask_price) / Decimal::TWO;
        Some((self.ask_price - self.bid_price) / mid * Decimal::ONE_HUNDRED)
    }
}

/// One candle
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Kline {
    pub start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub turnover: Decimal,
}

impl Kline {
    /// Parse a `[start, open, high, low, close, volume, turnover]` row
    pub fn from_row(row: &[String]) -> Option<Kline> {
        if row.len() < 6 {
            return None;
        }
        let start_ms: i64 = row[0].parse().ok()?;
        let num = |i: usize| -> Option<Decimal> {
            row.get(i).and_then(|v| Decimal::from_str(v).ok())
        };
        Some(Kline {
            start: Utc.timestamp_millis_opt(start_ms).single()?,
            open: num(1)?,
            high: num(2)?,
            low: num(3)?,
            close: num(4)?,
            volume: num(5)?,
            turnover: num(6).unwrap_or(Decimal::ZERO),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KlineResult {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub list: Vec<Vec<String>>,
}

impl KlineResult {
    /// Parsed candles, oldest first
    pub fn into_klines(self) -> Vec<Kline> {
        let mut klines: Vec<Kline> = self.list.iter().filter_map(|r| Kline::from_row(r)).collect();
        klines.sort_by_key(|k| k.start);
        klines
    }
}

/// Price level `[price, size]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookResult {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", default)]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a", default)]
    pub asks: Vec<[String; 2]>,
    #[serde(default)]
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Orderbook {
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl From<OrderbookResult> for Orderbook {
    fn from(raw: OrderbookResult) -> Self {
        let levels = |rows: &[[String; 2]]| -> Vec<BookLevel> {
            rows.iter()
                .filter_map(|[p, s]| {
                    Some(BookLevel {
                        price: Decimal::from_str(p).ok()?,
                        size: Decimal::from_str(s).ok()?,
                    })
                })
                .collect()
        };
        Orderbook {
            bids: levels(&raw.bids),
            asks: levels(&raw.asks),
            timestamp: Utc.timestamp_millis_opt(raw.ts).single().unwrap_or_else(Utc::now),
            symbol: raw.symbol,
        }
    }
}

impl Orderbook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub symbol: String,
    #[serde(default)]
    pub base_coin: String,
    #[serde(default)]
    pub quote_coin: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub lot_size_filter: Option<LotSizeFilter>,
    #[serde(default)]
    pub price_filter: Option<PriceFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotSizeFilter {
    #[serde(deserialize_with = "de::decimal", default)]
    pub base_precision: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub min_order_qty: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub max_order_qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFilter {
    #[serde(deserialize_with = "de::decimal", default)]
    pub tick_size: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    #[serde(deserialize_with = "de::int")]
    pub time_second: i64,
    #[serde(deserialize_with = "de::int", default)]
    pub time_nano: i64,
}

impl ServerTime {
    pub fn as_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.time_second, (self.time_nano % 1_000_000_000) as u32)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub account_type: String,
    #[serde(deserialize_with = "de::decimal", default)]
    pub total_equity: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub total_wallet_balance: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub total_available_balance: Decimal,
    #[serde(default)]
    pub coin: Vec<CoinBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinBalance {
    pub coin: String,
    #[serde(deserialize_with = "de::decimal", default)]
    pub equity: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub wallet_balance: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub usd_value: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub unrealised_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    /// `Buy`, `Sell`, or empty when flat
    #[serde(default)]
    pub side: String,
    #[serde(deserialize_with = "de::decimal", default)]
    pub size: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub avg_price: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub position_value: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub mark_price: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub unrealised_pnl: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub leverage: Decimal,
    #[serde(deserialize_with = "de::opt_decimal", default)]
    pub take_profit: Option<Decimal>,
    #[serde(deserialize_with = "de::opt_decimal", default)]
    pub stop_loss: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
    pub symbol: String,
    pub side: Side,
    #[serde(default)]
    pub order_type: String,
    #[serde(deserialize_with = "de::decimal", default)]
    pub price: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub qty: Decimal,
    #[serde(default)]
    pub order_status: String,
    #[serde(deserialize_with = "de::decimal", default)]
    pub avg_price: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub cum_exec_qty: Decimal,
    #[serde(deserialize_with = "de::int", default)]
    pub created_time: i64,
    #[serde(deserialize_with = "de::int", default)]
    pub updated_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub symbol: String,
    pub order_id: String,
    #[serde(default)]
    pub exec_id: String,
    pub side: Side,
    #[serde(deserialize_with = "de::decimal", default)]
    pub exec_price: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub exec_qty: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    pub exec_fee: Decimal,
    #[serde(deserialize_with = "de::int", default)]
    pub exec_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default = "default_unified_status")]
    pub unified_margin_status: i64,
    #[serde(default = "default_margin_mode")]
    pub margin_mode: String,
}

fn default_unified_status() -> i64 {
    1
}

fn default_margin_mode() -> String {
    "REGULAR_MARGIN".to_string()
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self {
            unified_margin_status: default_unified_status(),
            margin_mode: default_margin_mode(),
        }
    }
}

/// Order placement request body
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub category: Category,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_link_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
}

impl OrderRequest {
    /// Spot market order
    pub fn market(symbol: impl Into<String>, side: Side, qty: Decimal) -> Self {
        Self {
            category: Category::Spot,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            qty,
            price: None,
            time_in_force: None,
            order_link_id: None,
            reduce_only: None,
            take_profit: None,
            stop_loss: None,
        }
    }

    /// Spot limit order, good till cancelled
    pub fn limit(symbol: impl Into<String>, side: Side, qty: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::market(symbol, side, qty)
        }
    }

    pub fn with_link_id(mut self, link_id: impl Into<String>) -> Self {
        self.order_link_id = Some(link_id.into());
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = Some(true);
        self
    }
}

/// Order amendment request body
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AmendRequest {
    pub category: Category,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_link_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
}

/// Identifies an order by exchange id or client link id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(String),
    LinkId(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_interval_mapping() {
        assert_eq!(interval_for("1m"), Some("1"));
        assert_eq!(interval_for("1h"), Some("60"));
        assert_eq!(interval_for("1d"), Some("D"));
        assert_eq!(interval_for("1M"), Some("M"));
        assert_eq!(interval_for("10m"), None);
        assert!(TIMEFRAMES.iter().all(|t| interval_for(t).is_some()));
    }

    #[test]
    fn test_ticker_from_bybit_json() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "bid1Price": "42000.1",
            "bid1Size": "1.2",
            "ask1Price": "42000.3",
            "ask1Size": "0.4",
            "lastPrice": "42000.2",
            "prevPrice24h": "41000",
            "price24hPcnt": "0.0244",
            "highPrice24h": "42500",
            "lowPrice24h": "40800",
            "turnover24h": "123456789.5",
            "volume24h": "2950.1",
            "usdIndexPrice": ""
        }"#;
        let ticker: Ticker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.last_price, dec!(42000.2));
        assert_eq!(ticker.price_24h_pcnt, dec!(0.0244));
        assert_eq!(ticker.turnover_24h, dec!(123456789.5));
        assert!(ticker.spread_pct().unwrap() > Decimal::ZERO);
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let json = r#"{"symbol":"BTCUSDT","side":"","size":"0","avgPrice":"","takeProfit":"","stopLoss":"41000"}"#;
        let position: Position = serde_json::from_str(json).unwrap();
        assert_eq!(position.avg_price, Decimal::ZERO);
        assert_eq!(position.take_profit, None);
        assert_eq!(position.stop_loss, Some(dec!(41000)));
    }

    #[test]
    fn test_klines_normalised_oldest_first() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "category": "spot",
            "list": [
                ["1700000120000", "3", "4", "2", "3.5", "10", "35"],
                ["1700000060000", "2", "3", "1", "3", "12", "36"],
                ["1700000000000", "1", "2", "0.5", "2", "8", "16"],
                ["bad"]
            ]
        }"#;
        let result: KlineResult = serde_json::from_str(json).unwrap();
        let klines = result.into_klines();
        assert_eq!(klines.len(), 3);
        assert_eq!(klines[0].close, dec!(2));
        assert_eq!(klines[2].close, dec!(3.5));
        assert!(klines[0].start < klines[1].start);
    }

    #[test]
    fn test_orderbook_conversion() {
        let json = r#"{"s":"BTCUSDT","b":[["100.5","2"]],"a":[["100.7","1"],["100.8","3"]],"ts":1700000000000,"u":1}"#;
        let raw: OrderbookResult = serde_json::from_str(json).unwrap();
        let book = Orderbook::from(raw);
        assert_eq!(book.best_bid(), Some(dec!(100.5)));
        assert_eq!(book.best_ask(), Some(dec!(100.7)));
        assert_eq!(book.asks.len(), 2);
    }

    #[test]
    fn test_order_request_serialization() {
        let order = OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.01)).with_link_id("bot-1");
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["category"], "spot");
        assert_eq!(json["side"], "Buy");
        assert_eq!(json["orderType"], "Market");
        assert_eq!(json["qty"], "0.01");
        assert_eq!(json["orderLinkId"], "bot-1");
        assert!(json.get("price").is_none());

        let limit = OrderRequest::limit("ETHUSDT", Side::Sell, dec!(1), dec!(2500));
        let json = serde_json::to_value(&limit).unwrap();
        assert_eq!(json["price"], "2500");
        assert_eq!(json["timeInForce"], "GTC");
    }

    #[test]
    fn test_api_response_envelope() {
        let json = r#"{"retCode":10001,"retMsg":"params error","result":{},"time":1700000000000}"#;
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert_eq!(response.ret_code, 10001);
        assert_eq!(response.ret_msg, "params error");
    }

    #[test]
    fn test_server_time() {
        let json = r#"{"timeSecond":"1700000000","timeNano":"1700000000123456789"}"#;
        let time: ServerTime = serde_json::from_str(json).unwrap();
        assert_eq!(time.as_datetime().timestamp(), 1_700_000_000);
    }
}
