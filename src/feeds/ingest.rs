use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::IngestConfig;
use crate::errors::FleetError;
use crate::feeds::Publisher;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Market-data ingest: subscribes to the upstream websocket and forwards
/// every data frame to the publisher, unparsed.
///
/// Runs a reconnecting loop with jittered exponential backoff until the
/// shutdown channel fires. A failed publish drops that frame and keeps the
/// stream alive.
pub struct MarketDataIngest {
    config: IngestConfig,
}

impl MarketDataIngest {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub async fn run<P: Publisher>(
        &self,
        publisher: &P,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), FleetError> {
        let url = Url::parse(&self.config.ws_url)
            .map_err(|e| FleetError::Provider(format!("bad websocket url: {e}")))?;
        let mut backoff_ms: u64 = 500;

        loop {
            info!("connecting to market-data stream: {url}");

            let conn = tokio::select! {
                result = connect_async(url.as_str()) => result,
                _ = shutdown.recv() => {
                    info!("ingest shutdown");
                    return Ok(());
                }
            };

            match conn {
                Ok((mut ws, _)) => {
                    info!("market-data stream connected");
                    backoff_ms = 500; // Reset backoff on success

                    match self.handshake(&mut ws).await {
                        Ok(()) => {
                            if self.forward(&mut ws, publisher, &mut shutdown).await {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!("stream handshake failed: {e}"),
                    }
                }
                Err(e) => {
                    error!("stream connection failed: {e}");
                }
            }

            let delay = backoff_ms + rand::thread_rng().gen_range(0..250);
            warn!("reconnecting in {delay}ms...");
            tokio::select! {
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(delay)) => {}
                _ = shutdown.recv() => {
                    info!("ingest shutdown");
                    return Ok(());
                }
            }
            backoff_ms = (backoff_ms * 2).min(30_000);
        }
    }

    /// Authenticate, read the auth ack, subscribe.
    async fn handshake(&self, ws: &mut WsStream) -> Result<(), FleetError> {
        let auth = auth_payload(&self.config.api_key, &self.config.api_secret);
        ws.send(Message::Text(auth.to_string())).await?;

        if let Some(reply) = ws.next().await {
            if let Message::Text(text) = reply? {
                debug!("auth response: {text}");
            }
        }

        let subscribe = subscribe_payload(&self.config.symbols);
        ws.send(Message::Text(subscribe.to_string())).await?;
        info!(symbols = ?self.config.symbols, "subscribed to market data");
        Ok(())
    }

    /// Forward frames until the stream dies (false — caller reconnects) or
    /// shutdown fires (true).
    async fn forward<P: Publisher>(
        &self,
        ws: &mut WsStream,
        publisher: &P,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        loop {
            let msg = tokio::select! {
                msg = ws.next() => msg,
                _ = shutdown.recv() => {
                    info!("ingest shutdown");
                    return true;
                }
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = publisher
                        .publish(&self.config.subject, text.as_bytes())
                        .await
                    {
                        warn!(error = %e, "publish failed — dropping frame");
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    debug!("stream ping");
                }
                Some(Ok(_)) => {} // Binary, Pong, Close, Frame
                Some(Err(e)) => {
                    warn!("stream error: {e}");
                    return false; // Reconnect
                }
                None => {
                    warn!("stream ended");
                    return false; // Reconnect
                }
            }
        }
    }
}

fn auth_payload(key: &str, secret: &str) -> serde_json::Value {
    serde_json::json!({
        "action": "authenticate",
        "data": { "key_id": key, "secret_key": secret }
    })
}

fn subscribe_payload(symbols: &[String]) -> serde_json::Value {
    serde_json::json!({
        "action": "subscribe",
        "trades": symbols,
        "quotes": symbols,
        "bars": symbols
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_payload_shape() {
        let payload = auth_payload("key123", "secret456");
        assert_eq!(payload["action"], "authenticate");
        assert_eq!(payload["data"]["key_id"], "key123");
        assert_eq!(payload["data"]["secret_key"], "secret456");
    }

    #[test]
    fn test_subscribe_payload_covers_all_channels() {
        let symbols = vec!["AAPL".to_string(), "TQQQ".to_string()];
        let payload = subscribe_payload(&symbols);
        assert_eq!(payload["action"], "subscribe");
        for channel in ["trades", "quotes", "bars"] {
            let listed = payload[channel].as_array().unwrap();
            assert_eq!(listed.len(), 2);
            assert_eq!(listed[0], "AAPL");
        }
    }
}
