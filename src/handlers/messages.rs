use super::{config_first, event_first, missing_field, HandlerContext, HandlerError, HandlerOutcome};
use crate::config::MessagePostConfig;
use crate::graphql::ops::{self, AppMessage};
use crate::queue::InboundEvent;
use serde_json::json;

/// Posts an application message into a space. The space and the posting
/// identity (actor, color) belong to the deployment, so config wins for
/// those; title and text are per-invocation data, so the event wins there.
pub fn run(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &MessagePostConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    let space_id = config_first(config.space_id.as_deref(), event.space_id.as_deref())
        .ok_or_else(|| missing_field(handler_id, "spaceId"))?;
    let text = event_first(event.text.as_deref(), config.text.as_deref())
        .ok_or_else(|| missing_field(handler_id, "text"))?;

    let message = AppMessage {
        actor: config_first(config.actor.as_deref(), event.actor.as_deref()),
        color: config_first(config.color.as_deref(), event.color.as_deref()),
        title: event_first(event.title.as_deref(), config.title.as_deref()),
        text,
    };
    let summary = ops::create_message(&ctx.client, &ctx.token, &space_id, &message)?;
    Ok(HandlerOutcome::single(json!({ "message": summary })))
}
