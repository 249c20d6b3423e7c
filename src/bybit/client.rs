//! Bybit v5 REST client
//!
//! Every request passes through the sliding-window rate limiter. Public GETs
//! are served from a short-lived response cache. Timeouts are retried with
//! a linear backoff; every other failure surfaces immediately.

use super::cache::{cache_key, ResponseCache};
use super::error::BybitError;
use super::rate_limit::{RateLimitStatus, RateLimiter};
use super::signer::sign_request;
use super::types::*;
use crate::config::ExchangeConfig;
use crate::credentials::ApiCredentials;
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Mainnet REST host
pub const MAINNET_URL: &str = "https://api.bybit.com";
/// Testnet REST host
pub const TESTNET_URL: &str = "https://api-testnet.bybit.com";

/// One request as written to the API journal
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequestRecord {
    pub endpoint: String,
    pub method: String,
    pub params: String,
    /// `retCode`, -1 for transport errors, -2 for timeouts
    pub response_code: i64,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed_ms: i64,
}

/// Sink for request records, implemented by the database
#[async_trait]
pub trait RequestJournal: Send + Sync {
    async fn record_request(&self, record: ApiRequestRecord);
}

/// Counters over the client's lifetime
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limit_hits: u64,
    pub last_request_time: Option<DateTime<Utc>>,
}

/// Build the query string exactly as it is signed and sent
pub fn query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, BybitError> {
    Ok(serde_json::from_value(value)?)
}

/// Rate-limited, caching, signing REST client
pub struct BybitClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
    recv_window_ms: u64,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    limiter: RateLimiter,
    cache: ResponseCache,
    stats: Mutex<RequestStats>,
    journal: Option<Arc<dyn RequestJournal>>,
}

impl BybitClient {
    /// Create a client for the environment selected by `config.testnet`
    pub fn new(
        config: &ExchangeConfig,
        credentials: Option<ApiCredentials>,
    ) -> Result<Self, BybitError> {
        let http = Client::builder().build()?;

        let base_url = if config.testnet {
            TESTNET_URL
        } else {
            MAINNET_URL
        };

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            credentials,
            recv_window_ms: config.recv_window_ms,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(2),
            limiter: RateLimiter::new(
                config.max_requests,
                Duration::from_secs(config.rate_window_secs),
            ),
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)),
            stats: Mutex::new(RequestStats::default()),
            journal: None,
        })
    }

    /// Point the client at another host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base wait between timeout retries; retry k waits `(k+1) * delay`
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn RequestJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub async fn stats(&self) -> RequestStats {
        self.stats.lock().await.clone()
    }

    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.status().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        tracing::debug!("Response cache cleared");
    }

    // ---------------------------------------------------------------
    // Market data
    // ---------------------------------------------------------------

    pub async fn server_time(&self) -> Result<DateTime<Utc>, BybitError> {
        let time: ServerTime = self
            .get("/v5/market/time", BTreeMap::new(), false, false)
            .await?;
        Ok(time.as_datetime())
    }

    pub async fn orderbook(&self, symbol: &str, limit: u32) -> Result<Orderbook, BybitError> {
        let limit = limit.to_string();
        let raw: OrderbookResult = self
            .get(
                "/v5/market/orderbook",
                params(&[("category", "spot"), ("symbol", symbol), ("limit", limit.as_str())]),
                false,
                true,
            )
            .await?;
        Ok(raw.into())
    }

    /// Candles for `interval` (a Bybit code such as `60`), oldest first
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Kline>, BybitError> {
        let limit = limit.to_string();
        let mut query = params(&[
            ("category", "spot"),
            ("symbol", symbol),
            ("interval", interval),
            ("limit", limit.as_str()),
        ]);
        if let Some(start) = start {
            query.insert("start".into(), start.timestamp_millis().to_string());
        }
        if let Some(end) = end {
            query.insert("end".into(), end.timestamp_millis().to_string());
        }

        let result: KlineResult = self.get("/v5/market/kline", query, false, true).await?;
        Ok(result.into_klines())
    }

    /// Candles for a human timeframe such as `1h`, validated before sending
    pub async fn historical_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, BybitError> {
        let interval = interval_for(timeframe).ok_or_else(|| {
            BybitError::InvalidRequest(format!(
                "unsupported timeframe '{}', expected one of {}",
                timeframe,
                TIMEFRAMES.join(", ")
            ))
        })?;
        if !(1..=1000).contains(&limit) {
            return Err(BybitError::InvalidRequest(format!(
                "kline limit {} outside 1..=1000",
                limit
            )));
        }
        self.klines(symbol, interval, limit, None, None).await
    }

    pub async fn tickers(&self, symbol: Option<&str>) -> Result<Vec<Ticker>, BybitError> {
        let mut query = params(&[("category", "spot")]);
        if let Some(symbol) = symbol {
            query.insert("symbol".into(), symbol.to_string());
        }
        let result: ListResult<Ticker> =
            self.get("/v5/market/tickers", query, false, true).await?;
        Ok(result.list)
    }

    pub async fn ticker(&self, symbol: &str) -> Result<Ticker, BybitError> {
        self.tickers(Some(symbol))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BybitError::InvalidRequest(format!("no ticker for {}", symbol)))
    }

    pub async fn instruments(&self, symbol: Option<&str>) -> Result<Vec<Instrument>, BybitError> {
        let mut query = params(&[("category", "spot")]);
        if let Some(symbol) = symbol {
            query.insert("symbol".into(), symbol.to_string());
        }
        let result: ListResult<Instrument> = self
            .get("/v5/market/instruments-info", query, false, true)
            .await?;
        Ok(result.list)
    }

    /// Reachability check: one BTCUSDT ticker fetch
    pub async fn test_connection(&self) -> bool {
        match self.tickers(Some("BTCUSDT")).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Bybit connection test failed");
                false
            }
        }
    }

    // ---------------------------------------------------------------
    // Account
    // ---------------------------------------------------------------

    pub async fn wallet_balance(&self, account_type: &str) -> Result<Vec<WalletBalance>, BybitError> {
        let result: ListResult<WalletBalance> = self
            .get(
                "/v5/account/wallet-balance",
                params(&[("accountType", account_type)]),
                true,
                false,
            )
            .await?;
        Ok(result.list)
    }

    pub async fn positions(&self, symbol: Option<&str>) -> Result<Vec<Position>, BybitError> {
        let mut query = params(&[("category", "linear")]);
        match symbol {
            Some(symbol) => query.insert("symbol".into(), symbol.to_string()),
            None => query.insert("settleCoin".into(), "USDT".to_string()),
        };
        let result: ListResult<Position> =
            self.get("/v5/position/list", query, true, false).await?;
        Ok(result.list)
    }

    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, BybitError> {
        let mut query = params(&[("category", "spot")]);
        if let Some(symbol) = symbol {
            query.insert("symbol".into(), symbol.to_string());
        }
        let result: ListResult<Order> = self.get("/v5/order/realtime", query, true, false).await?;
        Ok(result.list)
    }

    pub async fn order_history(
        &self,
        symbol: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Order>, BybitError> {
        let limit = limit.to_string();
        let mut query = params(&[("category", "spot"), ("limit", limit.as_str())]);
        if let Some(symbol) = symbol {
            query.insert("symbol".into(), symbol.to_string());
        }
        let result: ListResult<Order> = self.get("/v5/order/history", query, true, false).await?;
        Ok(result.list)
    }

    pub async fn executions(
        &self,
        symbol: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Execution>, BybitError> {
        let limit = limit.to_string();
        let mut query = params(&[("category", "spot"), ("limit", limit.as_str())]);
        if let Some(symbol) = symbol {
            query.insert("symbol".into(), symbol.to_string());
        }
        let result: ListResult<Execution> =
            self.get("/v5/execution/list", query, true, false).await?;
        Ok(result.list)
    }

    /// Account margin settings; falls back to defaults when unavailable
    pub async fn account_info(&self) -> AccountInfo {
        match self
            .get::<AccountInfo>("/v5/account/info", BTreeMap::new(), true, false)
            .await
        {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "Account info unavailable, using defaults");
                AccountInfo::default()
            }
        }
    }

    // ---------------------------------------------------------------
    // Trading
    // ---------------------------------------------------------------

    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, BybitError> {
        if order.qty <= Decimal::ZERO {
            return Err(BybitError::InvalidRequest("order quantity must be positive".into()));
        }
        if order.order_type == OrderType::Limit && order.price.is_none() {
            return Err(BybitError::InvalidRequest("limit orders need a price".into()));
        }

        let started = Instant::now();
        let response: OrderResponse = self
            .post("/v5/order/create", serde_json::to_value(order)?)
            .await?;
        telemetry::record_latency(LatencyMetric::OrderSubmission, started.elapsed());
        telemetry::increment(CounterMetric::OrdersSubmitted);

        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.qty,
            order_id = %response.order_id,
            "Order placed"
        );
        Ok(response)
    }

    pub async fn cancel_order(
        &self,
        symbol: &str,
        order: &OrderRef,
    ) -> Result<OrderResponse, BybitError> {
        let mut body = json!({ "category": "spot", "symbol": symbol });
        match order {
            OrderRef::Id(id) => body["orderId"] = json!(id),
            OrderRef::LinkId(id) => body["orderLinkId"] = json!(id),
        }
        self.post("/v5/order/cancel", body).await
    }

    /// Cancel every open order, optionally for one symbol
    pub async fn cancel_all_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderResponse>, BybitError> {
        let mut body = json!({ "category": "spot" });
        if let Some(symbol) = symbol {
            body["symbol"] = json!(symbol);
        }
        let result: ListResult<OrderResponse> = self.post("/v5/order/cancel-all", body).await?;
        Ok(result.list)
    }

    pub async fn amend_order(&self, amend: &AmendRequest) -> Result<OrderResponse, BybitError> {
        if amend.order_id.is_none() && amend.order_link_id.is_none() {
            return Err(BybitError::InvalidRequest(
                "amend needs an order id or link id".into(),
            ));
        }
        self.post("/v5/order/amend", serde_json::to_value(amend)?).await
    }

    pub async fn set_leverage(
        &self,
        symbol: &str,
        buy_leverage: Decimal,
        sell_leverage: Decimal,
    ) -> Result<(), BybitError> {
        let body = json!({
            "category": "linear",
            "symbol": symbol,
            "buyLeverage": buy_leverage.to_string(),
            "sellLeverage": sell_leverage.to_string(),
        });
        self.post::<serde_json::Value>("/v5/position/set-leverage", body)
            .await?;
        Ok(())
    }

    /// `trade_mode` 0 is cross margin, 1 is isolated
    pub async fn switch_margin_mode(
        &self,
        symbol: &str,
        trade_mode: u8,
        buy_leverage: Decimal,
        sell_leverage: Decimal,
    ) -> Result<(), BybitError> {
        let body = json!({
            "category": "linear",
            "symbol": symbol,
            "tradeMode": trade_mode,
            "buyLeverage": buy_leverage.to_string(),
            "sellLeverage": sell_leverage.to_string(),
        });
        self.post::<serde_json::Value>("/v5/position/switch-isolated", body)
            .await?;
        Ok(())
    }

    pub async fn set_trading_stop(
        &self,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<(), BybitError> {
        let mut body = json!({
            "category": "linear",
            "symbol": symbol,
            "positionIdx": 0,
        });
        if let Some(tp) = take_profit {
            body["takeProfit"] = json!(tp.to_string());
        }
        if let Some(sl) = stop_loss {
            body["stopLoss"] = json!(sl.to_string());
        }
        self.post::<serde_json::Value>("/v5/position/trading-stop", body)
            .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Transport
    // ---------------------------------------------------------------

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: BTreeMap<String, String>,
        signed: bool,
        cacheable: bool,
    ) -> Result<T, BybitError> {
        let key = cache_key("GET", endpoint, &params);
        if cacheable {
            if let Some(value) = self.cache.get(&key).await {
                tracing::trace!(endpoint, "Cache hit");
                return decode(value);
            }
        }

        let query = query_string(&params);
        let value = self
            .execute(Method::GET, endpoint, &query, None, signed)
            .await?;

        if cacheable {
            self.cache.insert(key, value.clone(), None).await;
        }
        decode(value)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, BybitError> {
        let body = serde_json::to_string(&body)?;
        let value = self
            .execute(Method::POST, endpoint, "", Some(&body), true)
            .await?;
        decode(value)
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        query: &str,
        body: Option<&str>,
        signed: bool,
    ) -> Result<serde_json::Value, BybitError> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;
            match self.send_once(&method, endpoint, query, body, signed).await {
                Err(e) if e.is_timeout() && attempt + 1 < self.max_retries => {
                    let wait = self.retry_delay * (attempt + 1);
                    tracing::warn!(
                        endpoint,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "Request timed out, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        endpoint: &str,
        query: &str,
        body: Option<&str>,
        signed: bool,
    ) -> Result<serde_json::Value, BybitError> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        };

        let mut request = self.http.request(method.clone(), &url).timeout(self.timeout);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }
        if signed {
            let credentials = self
                .credentials
                .as_ref()
                .ok_or_else(|| BybitError::MissingCredentials(endpoint.to_string()))?;
            let payload = body.unwrap_or(query);
            let headers = sign_request(
                credentials,
                Utc::now().timestamp_millis(),
                self.recv_window_ms,
                payload,
            );
            for (name, value) in headers.pairs() {
                request = request.header(name, value);
            }
        }

        let started = Instant::now();
        let (code, result) = Self::dispatch(request, endpoint).await;
        let elapsed = started.elapsed();

        telemetry::record_latency(LatencyMetric::ApiRequest, elapsed);
        telemetry::increment(CounterMetric::ApiRequests);
        self.record(method, endpoint, body.unwrap_or(query), code, &result, elapsed)
            .await;

        result
    }

    async fn dispatch(
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> (i64, Result<serde_json::Value, BybitError>) {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return (
                    -2,
                    Err(BybitError::Timeout {
                        endpoint: endpoint.to_string(),
                    }),
                )
            }
            Err(e) => return (-1, Err(e.into())),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => {
                return (
                    -2,
                    Err(BybitError::Timeout {
                        endpoint: endpoint.to_string(),
                    }),
                )
            }
            Err(e) => return (-1, Err(e.into())),
        };

        let envelope: ApiResponse<serde_json::Value> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                let code = i64::from(status.as_u16());
                return (
                    code,
                    Err(BybitError::Api {
                        code,
                        message: format!("HTTP {}: {}", status, text.trim()),
                    }),
                );
            }
            Err(e) => return (-1, Err(e.into())),
        };

        if envelope.ret_code != 0 {
            return (
                envelope.ret_code,
                Err(BybitError::from_response(envelope.ret_code, &envelope.ret_msg)),
            );
        }

        (0, Ok(envelope.result.unwrap_or_else(|| json!({}))))
    }

    async fn record(
        &self,
        method: &Method,
        endpoint: &str,
        params: &str,
        code: i64,
        result: &Result<serde_json::Value, BybitError>,
        elapsed: Duration,
    ) {
        {
            let mut stats = self.stats.lock().await;
            stats.total_requests += 1;
            stats.last_request_time = Some(Utc::now());
            match result {
                Ok(_) => stats.successful_requests += 1,
                Err(e) => {
                    stats.failed_requests += 1;
                    if matches!(e, BybitError::RateLimit(_)) {
                        stats.rate_limit_hits += 1;
                    }
                }
            }
        }

        if let Err(e) = result {
            telemetry::increment(CounterMetric::ApiErrors);
            tracing::warn!(endpoint, code, error = %e, "Bybit request failed");
        } else {
            tracing::debug!(endpoint, elapsed_ms = elapsed.as_millis() as u64, "Bybit request ok");
        }

        let status = self.limiter.status().await;
        telemetry::set_gauge(GaugeMetric::RateLimitRemaining, status.remaining as f64);

        if let Some(journal) = &self.journal {
            journal
                .record_request(ApiRequestRecord {
                    endpoint: endpoint.to_string(),
                    method: method.as_str().to_string(),
                    params: params.to_string(),
                    response_code: code,
                    success: result.is_ok(),
                    error: result.as_ref().err().map(|e| e.to_string()),
                    elapsed_ms: elapsed.as_millis() as i64,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn test_config() -> ExchangeConfig {
        ExchangeConfig {
            timeout_secs: 5,
            ..ExchangeConfig::default()
        }
    }

    fn client_for(server: &mockito::ServerGuard, creds: Option<ApiCredentials>) -> BybitClient {
        BybitClient::new(&test_config(), creds)
            .unwrap()
            .with_base_url(server.url())
            .with_retry_delay(Duration::from_millis(1))
    }

    #[derive(Default)]
    struct MemoryJournal {
        records: Mutex<Vec<ApiRequestRecord>>,
    }

    #[async_trait]
    impl RequestJournal for MemoryJournal {
        async fn record_request(&self, record: ApiRequestRecord) {
            self.records.lock().await.push(record);
        }
    }

    const TICKERS_BODY: &str = r#"{
        "retCode": 0,
        "retMsg": "OK",
        "result": {
            "category": "spot",
            "list": [{"symbol": "BTCUSDT", "lastPrice": "42000.5", "bid1Price": "42000", "ask1Price": "42001",
                      "turnover24h": "1000000", "volume24h": "25", "price24hPcnt": "0.01"}]
        },
        "time": 1700000000000
    }"#;

    #[test]
    fn test_query_string_sorted() {
        let query = params(&[("symbol", "BTCUSDT"), ("category", "spot"), ("limit", "5")]);
        assert_eq!(query_string(&query), "category=spot&limit=5&symbol=BTCUSDT");
    }

    #[test]
    fn test_environment_hosts() {
        let testnet = BybitClient::new(&ExchangeConfig::default(), None).unwrap();
        assert_eq!(testnet.base_url(), TESTNET_URL);

        let config = ExchangeConfig {
            testnet: false,
            ..ExchangeConfig::default()
        };
        let mainnet = BybitClient::new(&config, None).unwrap();
        assert_eq!(mainnet.base_url(), MAINNET_URL);
        assert!(!mainnet.has_credentials());
    }

    #[tokio::test]
    async fn test_tickers_are_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v5/market/tickers")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("category".into(), "spot".into()),
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            ]))
            .with_body(TICKERS_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let first = client.ticker("BTCUSDT").await.unwrap();
        let second = client.ticker("BTCUSDT").await.unwrap();

        assert_eq!(first.last_price, dec!(42000.5));
        assert_eq!(first, second);
        mock.assert_async().await;

        let stats = client.stats().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.successful_requests, 1);
        assert!(stats.last_request_time.is_some());

        client.clear_cache().await;
        assert!(client.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_rate_limit_error_classified() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v5/market/tickers")
            .match_query(Matcher::Any)
            .with_body(r#"{"retCode":10006,"retMsg":"Too many visits. Exceeded the API Rate Limit.","result":{}}"#)
            .create_async()
            .await;

        let journal = Arc::new(MemoryJournal::default());
        let client = client_for(&server, None).with_journal(journal.clone());

        let err = client.tickers(None).await.unwrap_err();
        assert!(matches!(err, BybitError::RateLimit(_)));

        let stats = client.stats().await;
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.rate_limit_hits, 1);

        let records = journal.records.lock().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].response_code, 10006);
        assert!(!records[0].success);
        assert_eq!(records[0].params, "category=spot");
    }

    #[tokio::test]
    async fn test_private_endpoint_requires_credentials() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server, None);
        let err = client.wallet_balance("UNIFIED").await.unwrap_err();
        assert!(matches!(err, BybitError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn test_signed_request_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v5/account/wallet-balance")
            .match_query(Matcher::UrlEncoded("accountType".into(), "UNIFIED".into()))
            .match_header("X-BAPI-API-KEY", "key")
            .match_header("X-BAPI-SIGN-TYPE", "2")
            .match_header("X-BAPI-RECV-WINDOW", "5000")
            .match_header("X-BAPI-SIGN", Matcher::Regex("^[0-9a-f]{64}$".into()))
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"list":[{"accountType":"UNIFIED","totalEquity":"1000.5","totalWalletBalance":"1000","totalAvailableBalance":"900","coin":[{"coin":"USDT","equity":"1000","walletBalance":"1000","usdValue":"1000","unrealisedPnl":""}]}]}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some(ApiCredentials::new("key", "secret")));
        let balances = client.wallet_balance("UNIFIED").await.unwrap();
        mock.assert_async().await;

        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].total_equity, dec!(1000.5));
        assert_eq!(balances[0].coin[0].unrealised_pnl, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_place_order_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v5/order/create")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "category": "spot",
                "symbol": "BTCUSDT",
                "side": "Buy",
                "orderType": "Market",
                "qty": "0.01"
            })))
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"123","orderLinkId":"bot-1"}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some(ApiCredentials::new("key", "secret")));
        let order = OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.01)).with_link_id("bot-1");
        let ack = client.place_order(&order).await.unwrap();
        mock.assert_async().await;
        assert_eq!(ack.order_id, "123");
    }

    #[tokio::test]
    async fn test_place_order_rejects_zero_qty() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server, Some(ApiCredentials::new("key", "secret")));
        let order = OrderRequest::market("BTCUSDT", Side::Buy, Decimal::ZERO);
        assert!(matches!(
            client.place_order(&order).await,
            Err(BybitError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_historical_klines_validation() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server, None);
        assert!(matches!(
            client.historical_klines("BTCUSDT", "7m", 100).await,
            Err(BybitError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.historical_klines("BTCUSDT", "1h", 1001).await,
            Err(BybitError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_account_info_falls_back() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v5/account/info")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let client = client_for(&server, Some(ApiCredentials::new("key", "secret")));
        let info = client.account_info().await;
        assert_eq!(info.margin_mode, "REGULAR_MARGIN");
        assert_eq!(info.unified_margin_status, 1);
    }

    #[tokio::test]
    async fn test_server_time() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v5/market/time")
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"timeSecond":"1700000000","timeNano":"1700000000000000000"}}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert_eq!(client.server_time().await.unwrap().timestamp(), 1_700_000_000);
    }

    /// Accepts connections and never answers, counting each one
    async fn silent_listener() -> (String, Arc<std::sync::atomic::AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                held.push(socket);
            }
        });
        (url, accepted)
    }

    #[tokio::test]
    async fn test_timeouts_retry_up_to_max_retries() {
        let (url, accepted) = silent_listener().await;
        let journal = Arc::new(MemoryJournal::default());
        let client = BybitClient::new(&test_config(), None)
            .unwrap()
            .with_base_url(url)
            .with_timeout(Duration::from_millis(100))
            .with_retry_delay(Duration::from_millis(50))
            .with_journal(journal.clone());

        let started = Instant::now();
        let err = client.server_time().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout());
        assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 3);
        // three timeouts plus waits of 50ms and 100ms
        assert!(elapsed >= Duration::from_millis(450), "elapsed {:?}", elapsed);

        let records = journal.records.lock().await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.response_code == -2 && !r.success));
        assert_eq!(client.stats().await.failed_requests, 3);
    }

    #[tokio::test]
    async fn test_single_attempt_when_retries_is_one() {
        let (url, accepted) = silent_listener().await;
        let config = ExchangeConfig {
            max_retries: 1,
            ..test_config()
        };
        let client = BybitClient::new(&config, None)
            .unwrap()
            .with_base_url(url)
            .with_timeout(Duration::from_millis(50));

        assert!(client.server_time().await.unwrap_err().is_timeout());
        assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_api_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v5/market/time")
            .with_body(r#"{"retCode":10001,"retMsg":"params error","result":{}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client.server_time().await.unwrap_err();
        assert!(matches!(err, BybitError::Api { code: 10001, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_and_decode_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let http_mock = server
            .mock("GET", "/v5/market/time")
            .with_status(502)
            .with_body("bad gateway")
            .expect(1)
            .create_async()
            .await;
        let decode_mock = server
            .mock("GET", "/v5/market/instruments-info")
            .match_query(Matcher::Any)
            .with_body("not json")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client.server_time().await.unwrap_err();
        assert!(matches!(err, BybitError::Api { code: 502, .. }));
        assert!(client.instruments(None).await.is_err());

        http_mock.assert_async().await;
        decode_mock.assert_async().await;
        assert_eq!(client.stats().await.total_requests, 2);
    }

    #[tokio::test]
    async fn test_order_history_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v5/order/history")
            .match_query(Matcher::Exact("category=spot&limit=50&symbol=ETHUSDT".into()))
            .match_header("X-BAPI-SIGN", Matcher::Regex("^[0-9a-f]{64}$".into()))
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"list":[]}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some(ApiCredentials::new("key", "secret")));
        let orders = client.order_history(Some("ETHUSDT"), 50).await.unwrap();
        mock.assert_async().await;
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_amend_order_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v5/order/amend")
            .match_body(Matcher::Json(serde_json::json!({
                "category": "spot",
                "symbol": "BTCUSDT",
                "orderId": "abc",
                "qty": "0.02",
                "price": "41000"
            })))
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"abc","orderLinkId":""}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some(ApiCredentials::new("key", "secret")));
        let amend = AmendRequest {
            category: Category::Spot,
            symbol: "BTCUSDT".to_string(),
            order_id: Some("abc".to_string()),
            order_link_id: None,
            qty: Some(dec!(0.02)),
            price: Some(dec!(41000)),
            take_profit: None,
            stop_loss: None,
        };
        let ack = client.amend_order(&amend).await.unwrap();
        mock.assert_async().await;
        assert_eq!(ack.order_id, "abc");

        let unaddressed = AmendRequest {
            order_id: None,
            ..amend
        };
        assert!(matches!(
            client.amend_order(&unaddressed).await,
            Err(BybitError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_leverage_and_margin_mode_bodies() {
        let mut server = mockito::Server::new_async().await;
        let leverage = server
            .mock("POST", "/v5/position/set-leverage")
            .match_body(Matcher::Json(serde_json::json!({
                "category": "linear",
                "symbol": "BTCUSDT",
                "buyLeverage": "5",
                "sellLeverage": "3"
            })))
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{}}"#)
            .create_async()
            .await;
        let margin = server
            .mock("POST", "/v5/position/switch-isolated")
            .match_body(Matcher::Json(serde_json::json!({
                "category": "linear",
                "symbol": "BTCUSDT",
                "tradeMode": 1,
                "buyLeverage": "10",
                "sellLeverage": "10"
            })))
            .with_body(r#"{"retCode":0,"retMsg":"OK","result":{}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some(ApiCredentials::new("key", "secret")));
        client.set_leverage("BTCUSDT", dec!(5), dec!(3)).await.unwrap();
        client
            .switch_margin_mode("BTCUSDT", 1, dec!(10), dec!(10))
            .await
            .unwrap();
        leverage.assert_async().await;
        margin.assert_async().await;
    }
}
