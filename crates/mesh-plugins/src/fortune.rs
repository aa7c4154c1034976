//! Fortune cookie service.

use async_trait::async_trait;
use mesh_core::{endpoint, Context, EndpointsBuilder, Plugin, PluginSettings};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Call answered by [`Fortune`].
pub const GRAB_A_MESSAGE: &str = "grab_a_message";

const DEFAULT_FORTUNES: &[&str] = &[
    "This is a special message",
    "A quiet day brings clear thoughts",
    "The answer you seek is already in the question",
];

/// Request and response shape of the fortune calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FortuneMessage {
    pub message: String,
}

/// Hands out fortunes in rotation.
pub struct Fortune {
    fortunes: Vec<String>,
    next: AtomicUsize,
}

impl Default for Fortune {
    fn default() -> Self {
        Self::new(DEFAULT_FORTUNES.iter().map(|f| f.to_string()).collect())
    }
}

impl Fortune {
    /// An empty list falls back to the built-in fortunes.
    pub fn new(fortunes: Vec<String>) -> Self {
        let fortunes = if fortunes.is_empty() {
            DEFAULT_FORTUNES.iter().map(|f| f.to_string()).collect()
        } else {
            fortunes
        };
        Self {
            fortunes,
            next: AtomicUsize::new(0),
        }
    }

    /// Reads the `fortunes` option (an array of strings).
    pub fn from_settings(settings: &PluginSettings) -> Self {
        let fortunes = settings
            .options
            .get("fortunes")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self::new(fortunes)
    }

    fn next_fortune(&self) -> String {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.fortunes.len();
        self.fortunes[index].clone()
    }

    async fn grab_a_message(
        &self,
        _req: FortuneMessage,
        ctx: &Context,
    ) -> anyhow::Result<FortuneMessage> {
        let message = self.next_fortune();
        debug!("Fortune for {}: {}", ctx.id(), message);
        Ok(FortuneMessage { message })
    }
}

#[async_trait]
impl Plugin for Fortune {
    fn name(&self) -> &str {
        "fortune"
    }

    fn endpoints(b: EndpointsBuilder<Self>) -> EndpointsBuilder<Self> {
        endpoint!(b, Fortune::grab_a_message).required()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{comm, next_outbound, table_for};
    use mesh_core::{Message, Route};
    use serde_json::json;

    #[tokio::test]
    async fn test_grab_a_message_replies_to_sender() {
        let table = table_for(Fortune::default());
        let (comm, queue) = comm("fortune");
        let sender = Route::role("tester").with_uuid("t-1");

        let request = Message::new(GRAB_A_MESSAGE)
            .with_id("m-1")
            .from_route(sender.clone());
        table.invoke(request, &comm).unwrap().await;

        let reply = next_outbound(&queue);
        assert_eq!(reply.id(), "m-1");
        assert_eq!(reply.dest, Some(sender));
        assert_eq!(
            reply.response.unwrap()["message"],
            json!("This is a special message")
        );
    }

    #[tokio::test]
    async fn test_fortunes_rotate() {
        let table = table_for(Fortune::new(vec!["one".into(), "two".into()]));
        let (comm, queue) = comm("fortune");

        let mut seen = Vec::new();
        for id in ["a", "b", "c"] {
            let request = Message::new(GRAB_A_MESSAGE).with_id(id);
            table.invoke(request, &comm).unwrap().await;
            let reply = next_outbound(&queue);
            seen.push(reply.response.unwrap()["message"].clone());
        }

        assert_eq!(seen, vec![json!("one"), json!("two"), json!("one")]);
    }

    #[test]
    fn test_settings_override_fortunes() {
        let settings: PluginSettings =
            serde_json::from_value(json!({"options": {"fortunes": ["only this", 7]}})).unwrap();
        let fortune = Fortune::from_settings(&settings);
        assert_eq!(fortune.fortunes, vec!["only this".to_string()]);

        let fallback = Fortune::from_settings(&PluginSettings::defaults_for("fortune"));
        assert_eq!(fallback.fortunes.len(), DEFAULT_FORTUNES.len());
    }

    #[test]
    fn test_grab_a_message_is_required() {
        let table = table_for(Fortune::default());
        assert_eq!(table.required().collect::<Vec<_>>(), vec![GRAB_A_MESSAGE]);
    }
}
