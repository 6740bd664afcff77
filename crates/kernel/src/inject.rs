use std::rc::Rc;

use futures::future::join_all;
use gravy_common::EntityId;
use gravy_ecs::{Entity, InternalEntity};
use gravy_input::BoundHandler;

use crate::resolve::{ResolveContext, ResolveError, resolve_component, rollback};
use crate::state::RuntimeState;

/// An entity that failed to resolve and was not admitted.
#[derive(Debug)]
pub struct DroppedEntity {
    pub entity: EntityId,
    pub name: String,
    pub error: ResolveError,
}

/// Outcome of injecting one batch of entities.
#[derive(Debug, Default)]
pub struct InjectionReport {
    pub admitted: Vec<EntityId>,
    pub dropped: Vec<DroppedEntity>,
    /// Entities whose resolution finished after the engine stopped or
    /// reinitialized.
    pub discarded: Vec<EntityId>,
}

impl InjectionReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && self.discarded.is_empty()
    }
}

/// Resolve and admit a batch of entities.
///
/// Entities resolve concurrently and independently. Any component failure
/// drops the whole entity, undoes its pool registrations and is logged.
/// Nothing is raised to the caller. Resolved entities are admitted together,
/// in declaration order, once the whole batch has settled, so handler ties and
/// the entity list never depend on load timing.
pub async fn inject_entities(ctx: ResolveContext, entities: Vec<Entity<RuntimeState>>) -> InjectionReport {
    let outcomes = join_all(entities.iter().map(|entity| resolve_entity(&ctx, entity))).await;

    let mut report = InjectionReport::default();
    let mut resolved = Vec::with_capacity(entities.len());
    for (entity, outcome) in entities.iter().zip(outcomes) {
        match outcome {
            Ok(internal) => resolved.push(internal),
            Err(err) if err.is_stale() => {
                tracing::debug!(entity = %entity.id, name = %entity.name, "discarding stale entity resolution");
                report.discarded.push(entity.id);
            }
            Err(err) => {
                tracing::warn!(entity = %entity.id, name = %entity.name, error = %err, "entity dropped");
                report.dropped.push(DroppedEntity {
                    entity: entity.id,
                    name: entity.name.clone(),
                    error: err,
                });
            }
        }
    }

    match admit(&ctx, resolved) {
        Ok(admitted) => report.admitted = admitted,
        Err(stale) => {
            tracing::debug!(count = stale.len(), "discarding batch resolved after stop");
            report.discarded.extend(stale);
        }
    }
    tracing::debug!(
        admitted = report.admitted.len(),
        dropped = report.dropped.len(),
        discarded = report.discarded.len(),
        "injection batch complete"
    );
    report
}

/// Resolve and admit a single entity.
pub async fn inject_entity(
    ctx: &ResolveContext,
    entity: &Entity<RuntimeState>,
) -> Result<EntityId, ResolveError> {
    let internal = resolve_entity(ctx, entity).await?;
    admit(ctx, vec![internal]).map_err(|_| ResolveError::Stale(ctx.generation.value()))?;
    Ok(entity.id)
}

/// Resolve every component of `entity` concurrently. On failure the
/// components that did resolve are rolled back.
async fn resolve_entity(
    ctx: &ResolveContext,
    entity: &Entity<RuntimeState>,
) -> Result<InternalEntity<RuntimeState>, ResolveError> {
    let results = join_all(
        entity
            .components
            .iter()
            .map(|component| resolve_component(ctx, entity.id, component)),
    )
    .await;

    let mut resolved = Vec::with_capacity(results.len());
    let mut failure: Option<ResolveError> = None;
    for result in results {
        match result {
            Ok(component) => resolved.push(component),
            // A stale failure wins: the batch belongs to a dead generation.
            Err(err) if failure.as_ref().is_none_or(|f| !f.is_stale()) && err.is_stale() => {
                failure = Some(err)
            }
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }

    if let Some(err) = failure {
        let mut state = ctx.state.borrow_mut();
        if ctx.generation.is_current() && state.is_initialized() {
            rollback(&mut state, &resolved);
        }
        return Err(err);
    }
    Ok(InternalEntity {
        id: entity.id,
        name: entity.name.clone(),
        components: resolved,
    })
}

/// Publish resolved entities in the given order. Handlers of the whole batch
/// are registered in one step. Returns the ids of the entities, or, if the
/// generation is no longer current, the ids that were discarded.
fn admit(
    ctx: &ResolveContext,
    resolved: Vec<InternalEntity<RuntimeState>>,
) -> Result<Vec<EntityId>, Vec<EntityId>> {
    let ids: Vec<EntityId> = resolved.iter().map(|e| e.id).collect();
    let mut state = ctx.state.borrow_mut();
    if !(ctx.generation.is_current() && state.is_initialized()) {
        return Err(ids);
    }

    let handlers: Vec<Rc<BoundHandler<RuntimeState>>> = resolved
        .iter()
        .flat_map(|e| e.handlers().cloned())
        .collect();
    if !handlers.is_empty() {
        state.handlers_mut().register(handlers);
    }
    for internal in resolved {
        state.entities.admit(internal);
    }
    Ok(ids)
}
