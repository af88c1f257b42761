use crate::cache::{QueryKey, QueryValue};
use crate::poller::QuerySource;
use anyhow::{anyhow, Context, Result};
use common::{Instrument, Signal, Strategy};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

/// REST client for the signal desk API
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_signals(&self, strategy: Option<Strategy>) -> Result<Vec<Signal>> {
        let url = format!("{}/api/signals", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(strategy) = strategy {
            request = request.query(&[("strategy", strategy.as_str())]);
        }
        self.send_json(request, &url).await
    }

    pub async fn get_market_analysis(&self, instrument: Instrument) -> Result<serde_json::Value> {
        let url = format!("{}/api/market-analysis/{}", self.base_url, instrument.as_str());
        self.send_json(self.client.get(&url), &url).await
    }

    pub async fn get_market_regime(&self, instrument: Instrument) -> Result<serde_json::Value> {
        let url = format!("{}/api/market-regime/{}", self.base_url, instrument.as_str());
        self.send_json(self.client.get(&url), &url).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !response.status().is_success() {
            return Err(anyhow!("API error from {}: {}", url, response.status()));
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from {}", url))
    }
}

#[async_trait::async_trait]
impl QuerySource for ApiClient {
    async fn fetch(&self, key: QueryKey) -> Result<QueryValue> {
        match key {
            QueryKey::Signals => Ok(QueryValue::Signals(self.get_signals(None).await?)),
            QueryKey::MarketAnalysis(instrument) => {
                Ok(QueryValue::Json(self.get_market_analysis(instrument).await?))
            }
            QueryKey::MarketRegime(instrument) => {
                Ok(QueryValue::Json(self.get_market_regime(instrument).await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one HTTP request with a canned response; returns the request line
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request.lines().next().unwrap_or_default().to_string()
        });
        (base, handle)
    }

    #[tokio::test]
    async fn test_get_signals_decodes_camel_case() {
        let body = r#"[{"id":"6f1c1f4e-7f4c-4a57-9c59-0e3c1b0a2d11","instrument":"NIFTY","strategy":"momentum","status":"active","entryPrice":100,"currentPrice":105,"exitPrice":null,"pnl":250,"exitReason":null,"createdAt":"2024-02-09T04:00:00Z","updatedAt":"2024-02-09T04:05:00Z","closedTime":null}]"#;
        let (base, server) = serve_once("200 OK", body).await;

        let api = ApiClient::new(base);
        let signals = api.get_signals(Some(Strategy::Momentum)).await.unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].instrument, Instrument::Nifty);
        assert_eq!(signals[0].pnl, Some(rust_decimal_macros::dec!(250)));
        assert_eq!(server.await.unwrap(), "GET /api/signals?strategy=momentum HTTP/1.1");
    }

    #[tokio::test]
    async fn test_error_status_is_an_error() {
        let (base, server) = serve_once("503 Service Unavailable", "{}").await;

        let api = ApiClient::new(format!("{}/", base));
        let result = api.fetch(QueryKey::MarketRegime(Instrument::BankNifty)).await;

        assert!(result.is_err());
        assert_eq!(server.await.unwrap(), "GET /api/market-regime/BANKNIFTY HTTP/1.1");
    }
}
