//! Event accounting for relay sessions.
//!
//! The relay promises exactly one connect and one disconnect record per
//! session, even when both sides tear down in the same instant. The proxy
//! emits these as structured tracing events, so the test installs a counting
//! layer as the process-wide subscriber; this file stays a single test for
//! that reason.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

#[derive(Debug, Default)]
struct SessionEventCounts {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

struct CountingLayer(Arc<SessionEventCounts>);

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        struct MessageVisitor(Option<String>);
        impl Visit for MessageVisitor {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = Some(format!("{value:?}"));
                }
            }
        }

        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        match visitor.0.as_deref() {
            Some("websocket_connect") => {
                self.0.connects.fetch_add(1, Ordering::SeqCst);
            }
            Some("websocket_disconnect") => {
                self.0.disconnects.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn session_emits_exactly_one_connect_and_one_disconnect() {
    let counts = Arc::new(SessionEventCounts::default());
    let subscriber = tracing_subscriber::registry().with(CountingLayer(counts.clone()));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    // The upstream pushes a frame and closes right away while the client
    // also closes; both forwarding directions end at nearly the same time.
    let upstream = common::start_ws_push_upstream().await;
    let (proxy, _shutdown) = common::start_proxy(None, Some(upstream)).await;

    let (mut socket, _response) = connect_async(format!("ws://{proxy}/spot/ws"))
        .await
        .unwrap();
    socket.close(None).await.unwrap();
    while let Some(Ok(_)) = socket.next().await {}

    // The disconnect record lands after both forwarding tasks exit.
    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        while counts.disconnects.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(seen.is_ok(), "disconnect record never emitted");

    // Give a duplicate every chance to show up before counting.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(counts.connects.load(Ordering::SeqCst), 1);
    assert_eq!(counts.disconnects.load(Ordering::SeqCst), 1);
}
