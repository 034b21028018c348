//! Upbit Korean-spot adapter.
//!
//! Grounded on the teacher's `UpbitAdapter` (`crates/feeds/src/adapter.rs`): SIMPLE-format
//! MessagePack ticker stream, "KRW-BTC" market codes. Order placement and JWT auth are new
//! here (the teacher's Upbit support was data-only).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use kimp_core::{Exchange, OrderResult, OrderStatus, SymbolId};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::auth::jwt_hs256;
use crate::cache::QuoteCache;
use crate::capability::{ExchangeCapability, KoreanSpotCapability};
use crate::error::FeedError;

#[derive(Debug, Deserialize)]
struct UpbitTicker {
    #[serde(alias = "cd", alias = "code")]
    code: String,
    #[serde(alias = "tp", alias = "trade_price")]
    trade_price: f64,
    #[serde(alias = "ab", alias = "best_ask_price", default)]
    best_ask_price: f64,
    #[serde(alias = "bb", alias = "best_bid_price", default)]
    best_bid_price: f64,
    #[serde(alias = "tms", alias = "timestamp", default)]
    timestamp: i64,
}

pub struct UpbitAdapter {
    client: reqwest::Client,
    cache: Arc<QuoteCache>,
    rest_endpoint: String,
    ws_endpoint: String,
    access_key: String,
    secret_key: String,
    connected: AtomicBool,
    subscribed: Mutex<Vec<SymbolId>>,
}

impl UpbitAdapter {
    pub fn new(rest_endpoint: String, ws_endpoint: String, access_key: String, secret_key: String, cache: Arc<QuoteCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache,
            rest_endpoint,
            ws_endpoint,
            access_key,
            secret_key,
            connected: AtomicBool::new(false),
            subscribed: Mutex::new(Vec::new()),
        }
    }

    fn auth_header(&self, query: Option<&str>) -> String {
        format!("Bearer {}", jwt_hs256(&self.access_key, &self.secret_key, query))
    }

    fn subscribe_message(markets: &[String]) -> String {
        let codes: Vec<String> = markets.iter().map(|m| format!("\"{m}\"")).collect();
        format!(
            r#"[{{"ticket":"kimp-bot"}},{{"type":"ticker","codes":[{}]}},{{"format":"SIMPLE"}}]"#,
            codes.join(",")
        )
    }

}

fn to_market_code(symbol: &SymbolId) -> String {
    symbol.to_upbit_format()
}

fn from_market_code(code: &str) -> String {
    match code.split_once('-') {
        Some((quote, base)) => format!("{base}/{quote}"),
        None => code.to_string(),
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

#[async_trait]
impl ExchangeCapability for UpbitAdapter {
    async fn connect(&self) -> Result<(), FeedError> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), FeedError> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn subscribe_ticker(&self, symbols: &[SymbolId]) -> Result<(), FeedError> {
        {
            let mut subscribed = self.subscribed.lock().await;
            *subscribed = symbols.to_vec();
        }
        let markets: Vec<String> = symbols.iter().map(to_market_code).collect();
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.ws_endpoint)
            .await
            .map_err(FeedError::from)?;
        let (mut write, mut read) = ws_stream.split();
        write
            .send(Message::Text(Self::subscribe_message(&markets)))
            .await
            .map_err(FeedError::from)?;

        let cache = self.cache.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let Ok(msg) = msg else { break };
                let bytes = match msg {
                    Message::Binary(b) => b,
                    Message::Text(t) => t.into_bytes(),
                    _ => continue,
                };
                let ticker: Result<UpbitTicker, _> = rmp_serde::from_slice(&bytes)
                    .or_else(|_| serde_json::from_slice(&bytes).map_err(|e| rmp_serde::decode::Error::Syntax(e.to_string())));
                if let Ok(ticker) = ticker {
                    let adapter_cache = cache.clone();
                    let Some(symbol) = SymbolId::parse(&from_market_code(&ticker.code)) else {
                        continue;
                    };
                    let (bid, ask) = if ticker.best_bid_price > 0.0 && ticker.best_ask_price > 0.0 {
                        (ticker.best_bid_price, ticker.best_ask_price)
                    } else {
                        (ticker.trade_price, ticker.trade_price)
                    };
                    let ts = if ticker.timestamp > 0 { ticker.timestamp } else { now_ms() };
                    adapter_cache.update(Exchange::Upbit, &symbol, bid, ask, ticker.trade_price, ts);
                    if symbol.is_usdt_krw() {
                        adapter_cache.update_usdt_rate(Exchange::Upbit, ticker.trade_price, 3.0);
                    }
                }
            }
        });
        Ok(())
    }

    async fn available_symbols(&self) -> Result<Vec<SymbolId>, FeedError> {
        #[derive(Deserialize)]
        struct Market {
            market: String,
        }
        let url = format!("{}/v1/market/all", self.rest_endpoint);
        let markets: Vec<Market> = self.client.get(url).send().await?.json().await?;
        Ok(markets
            .into_iter()
            .filter(|m| m.market.starts_with("KRW-"))
            .filter_map(|m| SymbolId::parse(&from_market_code(&m.market)))
            .collect())
    }

    async fn balance(&self, currency: &str) -> Result<f64, FeedError> {
        #[derive(Deserialize)]
        struct Account {
            currency: String,
            balance: String,
        }
        let url = format!("{}/v1/accounts", self.rest_endpoint);
        let accounts: Vec<Account> = self
            .client
            .get(url)
            .header("Authorization", self.auth_header(None))
            .send()
            .await?
            .json()
            .await?;
        Ok(accounts
            .into_iter()
            .find(|a| a.currency == currency)
            .and_then(|a| a.balance.parse::<f64>().ok())
            .unwrap_or(0.0))
    }
}

#[async_trait]
impl KoreanSpotCapability for UpbitAdapter {
    async fn place_market_buy_cost(&self, symbol: &SymbolId, krw: f64) -> Result<OrderResult, FeedError> {
        let query = format!(
            "market={}&side=bid&ord_type=price&price={krw}",
            symbol.to_upbit_format()
        );
        let url = format!("{}/v1/orders?{query}", self.rest_endpoint);
        #[derive(Deserialize)]
        struct OrderResp {
            uuid: String,
            state: String,
            #[serde(default)]
            executed_volume: String,
        }
        let resp: OrderResp = self
            .client
            .post(url)
            .header("Authorization", self.auth_header(Some(&query)))
            .send()
            .await?
            .json()
            .await?;
        let filled = resp.executed_volume.parse::<f64>().unwrap_or(0.0);
        Ok(OrderResult {
            order_id_str: resp.uuid,
            status: status_from_state(&resp.state),
            filled_quantity: filled,
            average_price: if filled > 0.0 { krw / filled } else { 0.0 },
        })
    }

    async fn place_market_buy_quantity(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
        let query = format!(
            "market={}&side=bid&ord_type=market&volume={qty}",
            symbol.to_upbit_format()
        );
        self.submit(&query).await
    }

    async fn place_market_sell(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
        let query = format!(
            "market={}&side=ask&ord_type=market&volume={qty}",
            symbol.to_upbit_format()
        );
        self.submit(&query).await
    }

    async fn get_usdt_krw_price(&self) -> Result<f64, FeedError> {
        #[derive(Deserialize)]
        struct TickerResp {
            trade_price: f64,
        }
        let url = format!("{}/v1/ticker?markets=KRW-USDT", self.rest_endpoint);
        let resp: Vec<TickerResp> = self.client.get(url).send().await?.json().await?;
        resp.first()
            .map(|t| t.trade_price)
            .ok_or_else(|| FeedError::ParseError("empty USDT/KRW ticker response".into()))
    }
}

fn status_from_state(state: &str) -> OrderStatus {
    match state {
        "wait" => OrderStatus::New,
        "done" => OrderStatus::Filled,
        "cancel" => OrderStatus::Cancelled,
        _ => OrderStatus::Rejected,
    }
}

impl UpbitAdapter {
    async fn submit(&self, query: &str) -> Result<OrderResult, FeedError> {
        #[derive(Deserialize)]
        struct OrderResp {
            uuid: String,
            state: String,
            #[serde(default)]
            executed_volume: String,
            #[serde(default)]
            price: Option<String>,
        }
        let url = format!("{}/v1/orders?{query}", self.rest_endpoint);
        let resp: OrderResp = self
            .client
            .post(url)
            .header("Authorization", self.auth_header(Some(query)))
            .send()
            .await?
            .json()
            .await?;
        Ok(OrderResult {
            order_id_str: resp.uuid,
            status: status_from_state(&resp.state),
            filled_quantity: resp.executed_volume.parse().unwrap_or(0.0),
            average_price: resp.price.and_then(|p| p.parse().ok()).unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_code_round_trips() {
        let sym = SymbolId::new("BTC", "KRW");
        assert_eq!(to_market_code(&sym), "KRW-BTC");
        assert_eq!(from_market_code("KRW-BTC"), "BTC/KRW");
    }

    #[test]
    fn subscribe_message_contains_codes() {
        let msg = UpbitAdapter::subscribe_message(&["KRW-BTC".to_string(), "KRW-ETH".to_string()]);
        assert!(msg.contains("KRW-BTC"));
        assert!(msg.contains("KRW-ETH"));
        assert!(msg.contains("SIMPLE"));
    }

    #[test]
    fn ticker_parses_full_field_names() {
        let json = r#"{"code":"KRW-BTC","trade_price":145000000.0,"best_bid_price":144990000.0,"best_ask_price":145010000.0,"timestamp":1700000000000}"#;
        let ticker: UpbitTicker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.code, "KRW-BTC");
        assert_eq!(ticker.trade_price, 145000000.0);
    }

    #[test]
    fn ticker_parses_simple_aliases() {
        let json = r#"{"cd":"KRW-BTC","tp":145000000.0,"bb":144990000.0,"ab":145010000.0,"tms":1700000000000}"#;
        let ticker: UpbitTicker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.code, "KRW-BTC");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_from_state("wait"), OrderStatus::New);
        assert_eq!(status_from_state("done"), OrderStatus::Filled);
        assert_eq!(status_from_state("cancel"), OrderStatus::Cancelled);
        assert_eq!(status_from_state("garbage"), OrderStatus::Rejected);
    }
}
