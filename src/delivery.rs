//! Turns a provider's batch callbacks into a stream of frames.
//!
//! Every stream ends with exactly one `End` frame and then closes. A call that
//! delivered nothing still produces an explicit `Empty` frame first.

use crate::cache::{Delivery, DeliveryOrigin, EventProvider};
use crate::types::Event;
use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

pub const END_EVENT: &str = "end";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliverySummary {
    pub events: usize,
    pub batches: usize,
    pub origin: DeliveryOrigin,
}

impl From<Delivery> for DeliverySummary {
    fn from(delivery: Delivery) -> Self {
        Self {
            events: delivery.events,
            batches: delivery.batches,
            origin: delivery.origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Batch(Vec<Event>),
    Empty,
    End(DeliverySummary),
}

impl Frame {
    /// SSE event name; batches and the empty frame use the default message event
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            Frame::End(_) => Some(END_EVENT),
            _ => None,
        }
    }

    /// JSON payload of the frame's data line
    pub fn data(&self) -> String {
        let encoded = match self {
            Frame::Batch(events) => serde_json::to_string(events),
            Frame::Empty => Ok("[]".to_string()),
            Frame::End(summary) => serde_json::to_string(summary),
        };
        encoded.unwrap_or_else(|e| {
            debug!("Frame encoding failed: {}", e);
            "[]".to_string()
        })
    }

    /// Full text/event-stream encoding of the frame
    pub fn to_sse_text(&self) -> String {
        match self.event_name() {
            Some(name) => format!("event: {}\ndata: {}\n\n", name, self.data()),
            None => format!("data: {}\n\n", self.data()),
        }
    }
}

/// Run one `get_events` call in the background and stream its output as frames
pub fn event_frames(provider: Arc<dyn EventProvider>) -> impl Stream<Item = Frame> + Send + 'static {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let batches = tx.clone();
        let delivery = provider
            .get_events(&mut |events: Vec<Event>| {
                if batches.send(Frame::Batch(events)).is_err() {
                    debug!("Client went away, dropping batch");
                }
            })
            .await;
        if delivery.events == 0 {
            let _ = tx.send(Frame::Empty);
        }
        let _ = tx.send(Frame::End(delivery.into()));
    });
    UnboundedReceiverStream::new(rx)
}

/// Collect everything one call delivers
pub async fn collect_events(provider: &dyn EventProvider) -> (Vec<Event>, Delivery) {
    let mut events = Vec::new();
    let delivery = provider
        .get_events(&mut |batch: Vec<Event>| events.extend(batch))
        .await;
    (events, delivery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketStatus;
    use async_trait::async_trait;
    use futures::StreamExt;

    fn event(id: &str) -> Event {
        Event {
            id: id.into(),
            url: format!("https://billetto.no/e/{id}"),
            title: "Quiz".into(),
            venue: "Kafé Hærverk".into(),
            date: Some("lør. 22. nov.".into()),
            image_url: None,
            description: None,
            ticket_status: TicketStatus::Available,
            source: "Billetto".into(),
            city: "Oslo".into(),
            country: "Norway".into(),
            scraped_at: None,
        }
    }

    struct Fixed(Vec<Vec<Event>>);

    #[async_trait]
    impl EventProvider for Fixed {
        async fn get_events(&self, sink: &mut (dyn FnMut(Vec<Event>) + Send)) -> Delivery {
            let mut events = 0;
            for batch in &self.0 {
                events += batch.len();
                sink(batch.clone());
            }
            Delivery {
                origin: if events == 0 { DeliveryOrigin::Empty } else { DeliveryOrigin::Scrape },
                batches: self.0.len(),
                events,
            }
        }
    }

    #[tokio::test]
    async fn test_batches_then_end() {
        let provider = Arc::new(Fixed(vec![vec![event("a")], vec![event("b"), event("c")]]));
        let frames: Vec<Frame> = event_frames(provider).collect().await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Frame::Batch(vec![event("a")]));
        match &frames[2] {
            Frame::End(summary) => {
                assert_eq!(summary.events, 3);
                assert_eq!(summary.origin, DeliveryOrigin::Scrape);
            }
            other => panic!("expected end frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nothing_delivered_yields_empty_frame_and_closes() {
        let frames: Vec<Frame> = event_frames(Arc::new(Fixed(Vec::new()))).collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::Empty);
        assert_eq!(frames[0].to_sse_text(), "data: []\n\n");
        assert!(matches!(frames[1], Frame::End(_)));
    }

    #[test]
    fn test_sse_encoding() {
        let batch = Frame::Batch(vec![event("a")]).to_sse_text();
        assert!(batch.starts_with("data: [{\"id\":\"a\""));
        assert!(batch.ends_with("}]\n\n"));

        let end = Frame::End(DeliverySummary {
            events: 0,
            batches: 0,
            origin: DeliveryOrigin::Empty,
        });
        assert_eq!(
            end.to_sse_text(),
            "event: end\ndata: {\"events\":0,\"batches\":0,\"origin\":\"empty\"}\n\n"
        );
    }

    #[tokio::test]
    async fn test_collect_events() {
        let provider = Fixed(vec![vec![event("a")], vec![event("b")]]);
        let (events, delivery) = collect_events(&provider).await;
        assert_eq!(events.len(), 2);
        assert_eq!(delivery.batches, 2);
    }
}
