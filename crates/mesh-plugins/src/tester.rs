//! One-shot client that exercises the french fortune service.

use crate::fortune::FortuneMessage;
use crate::french_fortune::PARLEY;
use async_trait::async_trait;
use mesh_core::{CommChannel, Plugin, PluginSettings};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Pause before the first request, giving services time to register.
const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Sends one `parley` after a delay, logs the answer and stops the runtime.
#[derive(Debug)]
pub struct Tester {
    delay: Duration,
    received: Mutex<Option<FortuneMessage>>,
}

impl Default for Tester {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl Tester {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            received: Mutex::new(None),
        }
    }

    /// Reads the `delayMs` option.
    pub fn from_settings(settings: &PluginSettings) -> Self {
        Self::new(settings.option_millis("delayMs").unwrap_or(DEFAULT_DELAY))
    }

    /// The answer to the last `parley`, if one arrived.
    pub fn received(&self) -> Option<FortuneMessage> {
        self.received.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl Plugin for Tester {
    fn name(&self) -> &str {
        "tester"
    }

    async fn tick(&self, comm: &CommChannel) -> bool {
        tokio::time::sleep(self.delay).await;

        info!("Sending {} message", PARLEY);
        match comm
            .call::<_, FortuneMessage>(PARLEY, &FortuneMessage::default())
            .await
        {
            Ok(reply) => {
                info!("Received {}", reply.message);
                if let Ok(mut received) = self.received.lock() {
                    *received = Some(reply);
                }
            }
            Err(e) => warn!("{} failed: {}", PARLEY, e),
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{comm, next_outbound};
    use mesh_core::Payload;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tick_sends_parley_once_and_stops() {
        let tester = Arc::new(Tester::new(Duration::from_millis(1)));
        let (comm, queue) = comm("tester");

        let task = {
            let tester = Arc::clone(&tester);
            let comm = comm.clone();
            tokio::spawn(async move { tester.tick(&comm).await })
        };

        let request = next_outbound(&queue);
        assert_eq!(request.call, PARLEY);
        assert!(request.sender.is_some());

        let mut response = Payload::new();
        response.insert("message".into(), json!("C'est un message (hi)"));
        comm.resolve(request.reply(response));

        assert!(!task.await.unwrap());
        assert_eq!(
            tester.received().map(|r| r.message).as_deref(),
            Some("C'est un message (hi)")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_error_reply_still_stops() {
        let tester = Arc::new(Tester::new(Duration::ZERO));
        let (comm, queue) = comm("tester");

        let task = {
            let tester = Arc::clone(&tester);
            let comm = comm.clone();
            tokio::spawn(async move { tester.tick(&comm).await })
        };

        let request = next_outbound(&queue);
        comm.resolve(request.into_error("no endpoint for parley"));

        assert!(!task.await.unwrap());
        assert!(tester.received().is_none());
    }

    #[test]
    fn test_delay_from_settings() {
        let settings: PluginSettings =
            serde_json::from_value(json!({"options": {"delayMs": 25}})).unwrap();
        assert_eq!(Tester::from_settings(&settings).delay, Duration::from_millis(25));
        assert_eq!(
            Tester::from_settings(&PluginSettings::defaults_for("tester")).delay,
            DEFAULT_DELAY
        );
    }
}
