use super::{event_first, missing_field, HandlerContext, HandlerError, HandlerOutcome};
use crate::config::GraphqlPassthroughConfig;
use crate::graphql::GraphqlRequest;
use crate::queue::InboundEvent;

/// Free-form pass-through: runs an event-supplied document and republishes
/// the entire `data` value. The one handler that may shadow the platform's
/// configured view flags.
pub fn run(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &GraphqlPassthroughConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    let query = event_first(event.query.as_deref(), config.query.as_deref())
        .ok_or_else(|| missing_field(handler_id, "query"))?;

    let mut request = GraphqlRequest::new(query);
    if let Some(variables) = event.variables.clone() {
        request = request.with_variables(variables);
    }
    if let Some(name) = event_first(
        event.operation_name.as_deref(),
        config.operation_name.as_deref(),
    ) {
        request = request.with_operation_name(name);
    }

    let client = match &config.views {
        Some(views) => ctx.client.with_views(views),
        None => ctx.client.clone(),
    };
    let data = client.execute(&ctx.token, &request)?.into_data()?;
    Ok(HandlerOutcome::single(data))
}
