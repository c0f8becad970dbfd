use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::transport::{Connector, TransportEvent, TransportLink};

/// Websocket transport over tokio-tungstenite. Each link owns one socket,
/// pumped by its own task.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &str) -> TransportLink {
        let (link, outbound, inbound) = TransportLink::pair();
        tokio::spawn(pump(url.to_string(), outbound, inbound));
        link
    }
}

async fn pump(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            let _ = inbound.send(TransportEvent::Error(e.to_string()));
            let _ = inbound.send(TransportEvent::Closed);
            return;
        }
    };
    debug!("Websocket open: {}", url);
    if inbound.send(TransportEvent::Opened).is_err() {
        return;
    }

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        let _ = inbound.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                None => {
                    // Link dropped by the channel
                    let _ = sink.send(Message::Close(None)).await;
                    debug!("Websocket closed locally: {}", url);
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(TransportEvent::Frame(text.as_str().to_owned())).is_err() {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Websocket closed by server: {:?}", frame);
                    break;
                }
                Some(Ok(Message::Binary(_))) => trace!("Ignoring binary frame"),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = inbound.send(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }
    let _ = inbound.send(TransportEvent::Closed);
}
