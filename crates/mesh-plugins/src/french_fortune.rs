//! Fortune cookie service that answers in French.
//!
//! It has no fortunes of its own: each `parley` asks the mesh for a
//! `grab_a_message` and wraps the answer.

use crate::fortune::{FortuneMessage, GRAB_A_MESSAGE};
use async_trait::async_trait;
use mesh_core::{endpoint, Context, EndpointsBuilder, Plugin};

/// Call answered by [`FrenchFortune`].
pub const PARLEY: &str = "parley";

#[derive(Debug, Default)]
pub struct FrenchFortune;

impl FrenchFortune {
    async fn parlez(&self, _req: FortuneMessage, ctx: &Context) -> anyhow::Result<FortuneMessage> {
        let fortune: FortuneMessage = ctx.call(GRAB_A_MESSAGE, &FortuneMessage::default()).await?;
        Ok(FortuneMessage {
            message: format!("C'est un message ({})", fortune.message),
        })
    }
}

#[async_trait]
impl Plugin for FrenchFortune {
    fn name(&self) -> &str {
        "french-fortune"
    }

    fn endpoints(b: EndpointsBuilder<Self>) -> EndpointsBuilder<Self> {
        endpoint!(b, FrenchFortune::parlez as PARLEY).required()
    }
}
