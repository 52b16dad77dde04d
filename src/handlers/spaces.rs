use super::{
    config_first, event_first, missing_field, non_empty, HandlerContext, HandlerError,
    HandlerOutcome,
};
use crate::config::{split_csv, SpaceCreateConfig, SpaceUpdateConfig};
use crate::graphql::ops::{self, CreateSpaceInput, SpaceTemplate, UpdateSpaceInput};
use crate::queue::InboundEvent;
use crate::template::{
    resolve_display_to_id, resolve_id_to_display, status_display_to_id, status_id_to_display,
    properties::value_id_pairs, ResolvedProperty,
};
use serde_json::{json, Value};

/// Creates a templated space: fetch the template, translate the event's
/// display-form properties and status into ids, run the mutation, then
/// translate the platform's answer back for presentation. Any lookup or
/// translation failure aborts before the mutation.
pub fn run_create(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &SpaceCreateConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    let template_id = config_first(config.template_id.as_deref(), event.template_id.as_deref())
        .ok_or_else(|| missing_field(handler_id, "templateId"))?;
    let title = event_first(event.title.as_deref(), config.title.as_deref())
        .ok_or_else(|| missing_field(handler_id, "title"))?;

    let template = ops::fetch_template(&ctx.client, &ctx.token, &template_id)?;
    let resolved = resolve_display_to_id(&event.properties, template.definitions())?;
    let status_value_id = resolve_status_name(event, &template)?;

    let members = if event.add_members.is_empty() {
        config.members.as_deref().map(split_csv).unwrap_or_default()
    } else {
        event.add_members.clone()
    };
    let visibility = config
        .visibility
        .map(|v| v.as_wire().to_string())
        .or_else(|| non_empty(event.visibility.as_deref()));

    let input = CreateSpaceInput {
        title,
        template_id: Some(template_id),
        visibility,
        members,
        property_values: value_id_pairs(&resolved),
        status_value_id,
    };
    let space = ops::create_space(&ctx.client, &ctx.token, &input)?;
    let payload = present_space(space, &template)?;
    Ok(HandlerOutcome::single(payload))
}

/// Updates a space through its template: the space is fetched with its
/// template attached, so translation runs against the definitions that
/// actually govern it.
pub fn run_update(
    ctx: &HandlerContext,
    handler_id: &str,
    config: &SpaceUpdateConfig,
    event: &InboundEvent,
) -> Result<HandlerOutcome, HandlerError> {
    let space_id = config_first(config.space_id.as_deref(), event.space_id.as_deref())
        .ok_or_else(|| missing_field(handler_id, "spaceId"))?;

    let existing = ops::fetch_space_with_template(&ctx.client, &ctx.token, &space_id)?;
    let template = existing.template_info.unwrap_or_default();

    let resolved = resolve_display_to_id(&event.properties, template.definitions())?;
    let status_value_id = resolve_status_name(event, &template)?;

    let input = UpdateSpaceInput {
        id: space_id,
        title: non_empty(event.title.as_deref()),
        property_values: value_id_pairs(&resolved),
        status_value_id,
        add_members: event.add_members.clone(),
        remove_members: event.remove_members.clone(),
    };
    let space = ops::update_space(&ctx.client, &ctx.token, &input)?;
    let payload = present_space(space, &template)?;
    Ok(HandlerOutcome::single(payload))
}

fn resolve_status_name(
    event: &InboundEvent,
    template: &SpaceTemplate,
) -> Result<Option<String>, HandlerError> {
    match non_empty(event.status.as_deref()) {
        Some(name) => Ok(Some(status_display_to_id(&name, template.statuses())?)),
        None => Ok(None),
    }
}

/// Emitted payload: the space summary plus its assignments and status
/// translated back to display form.
fn present_space(
    space: ops::SpaceSummary,
    template: &SpaceTemplate,
) -> Result<Value, HandlerError> {
    let properties: Vec<ResolvedProperty> =
        resolve_id_to_display(&space.property_value_ids, template.definitions())?;
    let status = match space.status_value_id.as_deref() {
        Some(id) => Some(status_id_to_display(id, template.statuses())?),
        None => None,
    };
    Ok(json!({
        "space": space,
        "properties": properties,
        "status": status,
    }))
}
