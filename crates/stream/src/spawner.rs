use std::collections::HashMap;
use std::sync::Arc;
use worldstream_assets::AssetSource;

use crate::bundle::{GameObjectBundle, SpawnRequest};
use crate::collab::{EntityHandle, EntityUpload, GameObjectHandle, GpuBuffers, PhysicsWorld};
use crate::loader::{LoaderError, StreamingLoader, TerminationHook};
use crate::object_job::GameObjectJob;

/// A constructed game object and the render entities drawn for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedObject {
    pub handle: GameObjectHandle,
    pub name: String,
    pub entities: Vec<EntityHandle>,
}

/// Loads dynamic game objects in the background and hands them to the
/// collaborators, one per tick.
///
/// Runs its own loader, so a dead spawner never stalls world streaming.
pub struct GameObjectSpawner {
    loader: StreamingLoader<GameObjectJob>,
    spawned: HashMap<GameObjectHandle, SpawnedObject>,
    failed: usize,
}

impl GameObjectSpawner {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            loader: StreamingLoader::new("objects", GameObjectJob::new(source)),
            spawned: HashMap::new(),
            failed: 0,
        }
    }

    pub fn with_termination_hook(mut self, hook: TerminationHook) -> Self {
        self.loader = self.loader.with_termination_hook(hook);
        self
    }

    pub fn start(&mut self) -> Result<(), LoaderError> {
        self.loader.start()
    }

    pub fn stop(&mut self) {
        self.loader.stop();
    }

    pub fn spawn(&mut self, request: SpawnRequest) -> Result<(), LoaderError> {
        tracing::debug!(config = %request.config.display(), "spawn requested");
        self.loader.enqueue(request)
    }

    /// Construct at most one finished object.
    ///
    /// # Panics
    /// If called before [`start`](Self::start).
    pub fn tick(
        &mut self,
        gpu: &mut impl GpuBuffers,
        physics: &mut impl PhysicsWorld,
    ) -> Option<GameObjectHandle> {
        for dropped in self.loader.drain_dropped() {
            tracing::debug!(config = %dropped.request.config.display(), "spawn dropped");
            self.failed += 1;
        }
        let bundle = self.loader.poll_ready()?;
        Some(self.construct(bundle, gpu, physics))
    }

    fn construct(
        &mut self,
        bundle: GameObjectBundle,
        gpu: &mut impl GpuBuffers,
        physics: &mut impl PhysicsWorld,
    ) -> GameObjectHandle {
        let handle = physics.construct_game_object(&bundle.construction);
        let mut entities = Vec::with_capacity(bundle.entities.len());
        for entity in &bundle.entities {
            let (Some(mesh), Some(material)) = (
                bundle.resources.mesh(entity.mesh),
                bundle.resources.material(entity.material),
            ) else {
                tracing::warn!(entity = entity.id, "entity references missing resources");
                continue;
            };
            entities.push(gpu.upload_entity(EntityUpload {
                entity,
                mesh: (entity.mesh, mesh),
                material: (entity.material, material),
            }));
        }
        tracing::info!(
            name = %bundle.construction.name,
            ?handle,
            entities = entities.len(),
            "game object spawned"
        );
        self.spawned.insert(
            handle,
            SpawnedObject {
                handle,
                name: bundle.construction.name,
                entities,
            },
        );
        handle
    }

    /// Release the object's entities and destroy its body.
    /// Returns `false` for an unknown handle.
    pub fn despawn(
        &mut self,
        handle: GameObjectHandle,
        gpu: &mut impl GpuBuffers,
        physics: &mut impl PhysicsWorld,
    ) -> bool {
        let Some(object) = self.spawned.remove(&handle) else {
            return false;
        };
        for entity in object.entities {
            gpu.release_entity(entity);
        }
        physics.destroy_game_object(handle);
        tracing::debug!(name = %object.name, ?handle, "game object despawned");
        true
    }

    pub fn get(&self, handle: GameObjectHandle) -> Option<&SpawnedObject> {
        self.spawned.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.spawned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty()
    }

    /// Spawn requests that produced nothing.
    pub fn failed_count(&self) -> usize {
        self.failed
    }

    pub fn is_faulted(&self) -> bool {
        self.loader.is_faulted()
    }
}
