//! Bybit foreign-perpetual adapter (USDT linear perpetual, V5 API).
//!
//! Grounded on the teacher's spot-only `BybitAdapter` (`crates/feeds/src/adapter.rs`) for
//! the websocket ticker parsing idiom, generalized here to linear-perpetual topics and
//! extended with V5's HMAC-SHA256 signing (`timestamp + api_key + recv_window + body`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use kimp_core::{Exchange, LotSizeMetadata, OrderResult, OrderStatus, SymbolId};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::auth::hmac_sha256_hex;
use crate::cache::QuoteCache;
use crate::capability::{ExchangeCapability, ForeignPerpCapability};
use crate::error::FeedError;

const RECV_WINDOW_MS: i64 = 5000;

#[derive(Debug, Deserialize)]
struct BybitTickerData {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bid1Price", default)]
    bid1_price: String,
    #[serde(rename = "ask1Price", default)]
    ask1_price: String,
    #[serde(rename = "fundingRate", default)]
    funding_rate: String,
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: String,
}

#[derive(Debug, Deserialize)]
struct BybitWsMessage {
    topic: Option<String>,
    data: Option<BybitTickerData>,
}

pub struct BybitAdapter {
    client: reqwest::Client,
    cache: Arc<QuoteCache>,
    rest_endpoint: String,
    ws_endpoint: String,
    api_key: String,
    api_secret: String,
    connected: AtomicBool,
    subscribed: Mutex<Vec<SymbolId>>,
}

impl BybitAdapter {
    pub fn new(rest_endpoint: String, ws_endpoint: String, api_key: String, api_secret: String, cache: Arc<QuoteCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache,
            rest_endpoint,
            ws_endpoint,
            api_key,
            api_secret,
            connected: AtomicBool::new(false),
            subscribed: Mutex::new(Vec::new()),
        }
    }

    fn sign(&self, timestamp: i64, body: &str) -> String {
        let payload = format!("{timestamp}{}{RECV_WINDOW_MS}{body}", self.api_key);
        hmac_sha256_hex(&self.api_secret, &payload)
    }

    async fn private_post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value, FeedError> {
        let body_str = body.to_string();
        let ts = now_ms();
        let sign = self.sign(ts, &body_str);
        let url = format!("{}{path}", self.rest_endpoint);
        let resp: serde_json::Value = self
            .client
            .post(url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", sign)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Ok(resp)
    }

    async fn private_get(&self, path: &str, query: &str) -> Result<serde_json::Value, FeedError> {
        let ts = now_ms();
        let sign = self.sign(ts, query);
        let url = if query.is_empty() {
            format!("{}{path}", self.rest_endpoint)
        } else {
            format!("{}{path}?{query}", self.rest_endpoint)
        };
        let resp: serde_json::Value = self
            .client
            .get(url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", sign)
            .send()
            .await?
            .json()
            .await?;
        Ok(resp)
    }
}

fn to_linear_symbol(symbol: &SymbolId) -> String {
    symbol.to_bybit_format()
}

fn from_linear_symbol(code: &str) -> Option<SymbolId> {
    let base = code.strip_suffix("USDT")?;
    Some(SymbolId::new(base, "USDT"))
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

fn status_from_order_status(status: &str) -> OrderStatus {
    match status {
        "Created" | "New" | "Untriggered" => OrderStatus::New,
        "PartiallyFilled" => OrderStatus::PartiallyFilled,
        "Filled" => OrderStatus::Filled,
        "Cancelled" | "PartiallyFilledCanceled" => OrderStatus::Cancelled,
        "Rejected" => OrderStatus::Rejected,
        "Deactivated" => OrderStatus::Expired,
        _ => OrderStatus::Rejected,
    }
}

#[async_trait]
impl ExchangeCapability for BybitAdapter {
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
        let topics: Vec<String> = symbols.iter().map(|s| format!("tickers.{}", to_linear_symbol(s))).collect();
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.ws_endpoint)
            .await
            .map_err(FeedError::from)?;
        let (mut write, mut read) = ws_stream.split();
        let sub_msg = json!({ "op": "subscribe", "args": topics }).to_string();
        write.send(Message::Text(sub_msg)).await.map_err(FeedError::from)?;

        let cache = self.cache.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let Ok(Message::Text(text)) = msg else { continue };
                let Ok(parsed) = serde_json::from_str::<BybitWsMessage>(&text) else {
                    continue;
                };
                let (Some(topic), Some(data)) = (parsed.topic, parsed.data) else {
                    continue;
                };
                if !topic.starts_with("tickers.") {
                    continue;
                }
                let Some(symbol) = from_linear_symbol(&data.symbol) else {
                    continue;
                };
                let last: f64 = data.last_price.parse().unwrap_or(0.0);
                let bid: f64 = data.bid1_price.parse().unwrap_or(last);
                let ask: f64 = data.ask1_price.parse().unwrap_or(last);
                if bid <= 0.0 || ask <= 0.0 {
                    continue;
                }
                let ts = now_ms();
                cache.update(Exchange::Bybit, &symbol, bid, ask, last, ts);
                if let Ok(rate) = data.funding_rate.parse::<f64>() {
                    let next_funding: i64 = data.next_funding_time.parse().unwrap_or(0);
                    cache.update_funding(Exchange::Bybit, &symbol, rate, 8, next_funding);
                }
            }
        });
        Ok(())
    }

    async fn available_symbols(&self) -> Result<Vec<SymbolId>, FeedError> {
        #[derive(Deserialize)]
        struct InstrumentsResult {
            list: Vec<InstrumentInfo>,
        }
        #[derive(Deserialize)]
        struct InstrumentsResponse {
            result: InstrumentsResult,
        }
        let url = format!("{}/v5/market/instruments-info?category=linear", self.rest_endpoint);
        let resp: InstrumentsResponse = self.client.get(url).send().await?.json().await?;
        Ok(resp
            .result
            .list
            .into_iter()
            .filter_map(|i| from_linear_symbol(&i.symbol))
            .collect())
    }

    async fn balance(&self, currency: &str) -> Result<f64, FeedError> {
        let query = "accountType=UNIFIED".to_string();
        let resp = self.private_get("/v5/account/wallet-balance", &query).await?;
        let balance = resp["result"]["list"][0]["coin"]
            .as_array()
            .and_then(|coins| coins.iter().find(|c| c["coin"].as_str() == Some(currency)))
            .and_then(|c| c["walletBalance"].as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok(balance)
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentInfo {
    symbol: String,
}

#[async_trait]
impl ForeignPerpCapability for BybitAdapter {
    async fn open_short(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
        let body = json!({
            "category": "linear",
            "symbol": to_linear_symbol(symbol),
            "side": "Sell",
            "orderType": "Market",
            "qty": format!("{qty}"),
            "reduceOnly": false,
        });
        self.submit_order(symbol, body).await
    }

    async fn close_short(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
        let body = json!({
            "category": "linear",
            "symbol": to_linear_symbol(symbol),
            "side": "Buy",
            "orderType": "Market",
            "qty": format!("{qty}"),
            "reduceOnly": true,
        });
        self.submit_order(symbol, body).await
    }

    async fn set_leverage(&self, symbol: &SymbolId, leverage: u8) -> Result<(), FeedError> {
        let body = json!({
            "category": "linear",
            "symbol": to_linear_symbol(symbol),
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        let resp = self.private_post("/v5/position/set-leverage", body).await?;
        let ret_code = resp["retCode"].as_i64().unwrap_or(-1);
        // 110043 == "leverage not modified" on Bybit, already at target.
        if ret_code == 0 || ret_code == 110043 {
            Ok(())
        } else {
            Err(FeedError::AuthenticationFailed(format!(
                "set_leverage failed: {}",
                resp["retMsg"].as_str().unwrap_or("unknown")
            )))
        }
    }

    async fn positions(&self) -> Result<Vec<(SymbolId, f64)>, FeedError> {
        let query = "category=linear&settleCoin=USDT".to_string();
        let resp = self.private_get("/v5/position/list", &query).await?;
        let list = resp["result"]["list"].as_array().cloned().unwrap_or_default();
        Ok(list
            .into_iter()
            .filter_map(|p| {
                let symbol = from_linear_symbol(p["symbol"].as_str()?)?;
                let size: f64 = p["size"].as_str()?.parse().ok()?;
                let side = p["side"].as_str()?;
                let signed = if side == "Sell" { -size } else { size };
                Some((symbol, signed))
            })
            .collect())
    }

    async fn lot_size(&self, symbol: &SymbolId) -> Result<LotSizeMetadata, FeedError> {
        #[derive(Deserialize)]
        struct LotSizeFilter {
            #[serde(rename = "minOrderQty")]
            min_order_qty: String,
            #[serde(rename = "qtyStep")]
            qty_step: String,
        }
        #[derive(Deserialize)]
        struct Instrument {
            #[serde(rename = "lotSizeFilter")]
            lot_size_filter: LotSizeFilter,
        }
        #[derive(Deserialize)]
        struct InstrumentsResult {
            list: Vec<Instrument>,
        }
        #[derive(Deserialize)]
        struct InstrumentsResponse {
            result: InstrumentsResult,
        }
        let url = format!(
            "{}/v5/market/instruments-info?category=linear&symbol={}",
            self.rest_endpoint,
            to_linear_symbol(symbol)
        );
        let resp: InstrumentsResponse = self.client.get(url).send().await?.json().await?;
        let info = resp
            .result
            .list
            .first()
            .ok_or_else(|| FeedError::ParseError("unknown bybit instrument".into()))?;
        let min_qty: f64 = info.lot_size_filter.min_order_qty.parse().unwrap_or(0.001);
        let qty_step: f64 = info.lot_size_filter.qty_step.parse().unwrap_or(0.001);
        Ok(LotSizeMetadata {
            min_qty,
            qty_step,
            min_notional: 5.0,
        })
    }

    async fn funding(&self, symbol: &SymbolId) -> Result<(f64, u32, i64), FeedError> {
        let quote = self.cache.get(Exchange::Bybit, symbol);
        Ok((quote.funding_rate, quote.funding_interval_hours, quote.next_funding_ms))
    }
}

impl BybitAdapter {
    /// V5 `order/create` never carries fill data: it only confirms acceptance. Reconcile
    /// the actual fill with a follow-up `order/realtime` query before returning.
    async fn submit_order(&self, symbol: &SymbolId, body: serde_json::Value) -> Result<OrderResult, FeedError> {
        let resp = self.private_post("/v5/order/create", body).await?;
        let ret_code = resp["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            return Err(FeedError::AuthenticationFailed(format!(
                "order rejected: {}",
                resp["retMsg"].as_str().unwrap_or("unknown")
            )));
        }
        let order_id = resp["result"]["orderId"].as_str().unwrap_or_default().to_string();
        self.query_order_fill(symbol, &order_id).await
    }

    async fn query_order_fill(&self, symbol: &SymbolId, order_id: &str) -> Result<OrderResult, FeedError> {
        let query = format!("category=linear&symbol={}&orderId={order_id}", to_linear_symbol(symbol));
        let resp = self.private_get("/v5/order/realtime", &query).await?;
        let entry = resp["result"]["list"]
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| FeedError::ParseError("empty bybit order/realtime response".into()))?;
        let order_status = entry["orderStatus"].as_str().unwrap_or("New");
        let avg_price: f64 = entry["avgPrice"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let cum_exec_qty: f64 = entry["cumExecQty"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        Ok(OrderResult {
            order_id_str: order_id.to_string(),
            status: status_from_order_status(order_status),
            filled_quantity: cum_exec_qty,
            average_price: avg_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_symbol_round_trips() {
        let sym = SymbolId::new("BTC", "USDT");
        assert_eq!(to_linear_symbol(&sym), "BTCUSDT");
        assert_eq!(from_linear_symbol("BTCUSDT"), Some(SymbolId::new("BTC", "USDT")));
    }

    #[test]
    fn non_usdt_symbol_is_rejected() {
        assert_eq!(from_linear_symbol("BTCUSDC"), None);
    }

    #[test]
    fn order_status_mapping() {
        assert_eq!(status_from_order_status("Filled"), OrderStatus::Filled);
        assert_eq!(status_from_order_status("Rejected"), OrderStatus::Rejected);
        assert_eq!(status_from_order_status("Deactivated"), OrderStatus::Expired);
    }

    #[test]
    fn ticker_message_parses() {
        let json = r#"{"topic":"tickers.BTCUSDT","data":{"symbol":"BTCUSDT","lastPrice":"65000","bid1Price":"64999","ask1Price":"65001","fundingRate":"0.0001","nextFundingTime":"1700000000000"}}"#;
        let parsed: BybitWsMessage = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.topic.unwrap(), "tickers.BTCUSDT");
        assert_eq!(parsed.data.unwrap().symbol, "BTCUSDT");
    }
}
