use std::sync::Arc;
use worldstream_assets::{
    AssetSource, CollisionMesh, GameObjectConfig, ResourceDeduplicator, read_config,
};
use worldstream_common::IdentifierCache;

use crate::bundle::{Entity, GameObjectBundle, GameObjectConstruction, SpawnRequest};
use crate::loader::{LoadError, LoadJob};

/// Builds render entities and physics construction data for dynamic objects.
pub struct GameObjectJob {
    source: Arc<dyn AssetSource>,
    ids: IdentifierCache,
    next_entity_id: u32,
}

impl GameObjectJob {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            ids: IdentifierCache::new(),
            next_entity_id: 0,
        }
    }
}

impl LoadJob for GameObjectJob {
    type Request = SpawnRequest;
    type Bundle = GameObjectBundle;

    fn load(&mut self, request: &SpawnRequest) -> Result<GameObjectBundle, LoadError> {
        let _span =
            tracing::info_span!("load_game_object", config = %request.config.display()).entered();
        let source = self.source.as_ref();
        let config: GameObjectConfig = read_config(source, &request.config)?;
        if config.parts.is_empty() {
            return Err(LoadError::Invalid(format!(
                "game object `{}` has no parts",
                config.name
            )));
        }

        let mut dedup = ResourceDeduplicator::new();
        let mut entities = Vec::with_capacity(config.parts.len());
        let mut collision = Vec::new();
        for part in &config.parts {
            let resolved = dedup.resolve_object(source, &mut self.ids, &part.object)?;
            let local = part.transform();
            if resolved.collidable {
                if let Some(mesh) = dedup.resources().mesh(resolved.mesh) {
                    collision.push(CollisionMesh::from_mesh(mesh, &local));
                }
            }
            self.next_entity_id += 1;
            entities.push(Entity {
                id: self.next_entity_id,
                mesh: resolved.mesh,
                material: resolved.material,
                transform: request.spawn.compose(&local),
                collidable: resolved.collidable,
            });
        }

        tracing::debug!(
            name = %config.name,
            parts = entities.len(),
            vehicle = config.vehicle.is_some(),
            "game object loaded"
        );
        Ok(GameObjectBundle {
            request: request.clone(),
            entities,
            resources: dedup.finish(),
            construction: GameObjectConstruction {
                name: config.name,
                spawn: request.spawn,
                body: config.body,
                vehicle: config.vehicle,
                collision,
            },
        })
    }
}
