use tokio::sync::mpsc;

/// Path of the push endpoint on the backend.
pub const CSV_UPDATES_PATH: &str = "/ws/csv-updates";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed,
}

/// One transport attempt. Progress arrives on `inbound`, starting with
/// `Opened` or `Closed`. Dropping `outbound` closes the transport.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<TransportEvent>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        (Self { outbound, inbound }, outbound_rx, inbound_tx)
    }
}

/// Opens transports for the realtime channel. Must return without waiting
/// for the connection to establish.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> TransportLink;
}

/// Turn the configured websocket base into the full push endpoint, accepting
/// http(s) bases as well.
pub fn endpoint_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{}", base)
    };
    format!("{}{}", base, CSV_UPDATES_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_from_various_bases() {
        assert_eq!(endpoint_url("ws://localhost:8000"), "ws://localhost:8000/ws/csv-updates");
        assert_eq!(endpoint_url("http://localhost:8000/"), "ws://localhost:8000/ws/csv-updates");
        assert_eq!(endpoint_url("https://csv.example.com"), "wss://csv.example.com/ws/csv-updates");
        assert_eq!(endpoint_url("localhost:9000"), "ws://localhost:9000/ws/csv-updates");
    }
}
