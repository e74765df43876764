//! Streaming: block grid, background loading, residency and eviction.
//!
//! # Invariants
//! - The resident set, GPU state and physics state are only mutated on the
//!   consumer thread, from `WorldStreamer::tick` and `GameObjectSpawner::tick`.
//! - A block is resident, pending, or neither; never both.
//! - A loader holds at most one finished bundle waiting for the consumer.

mod arena;
mod block_job;
mod bundle;
mod collab;
mod grid;
mod headless;
mod loader;
mod object_job;
mod spawner;
mod stats;
mod streamer;

#[cfg(test)]
mod fixtures;

pub use arena::ResourceArena;
pub use block_job::{BlockLoadJob, ResidentBlocks};
pub use bundle::{BlockBundle, Entity, GameObjectBundle, GameObjectConstruction, SpawnRequest};
pub use collab::{EntityHandle, EntityUpload, GameObjectHandle, GpuBuffers, PhysicsWorld};
pub use grid::BlockGrid;
pub use headless::{HeadlessGpu, HeadlessPhysics};
pub use loader::{
    DropReason, Dropped, LoadError, LoadJob, LoaderError, LoaderState, StreamingLoader,
    TerminationHook, WorkerFault,
};
pub use object_job::GameObjectJob;
pub use spawner::{GameObjectSpawner, SpawnedObject};
pub use stats::{StreamStats, TickTimer};
pub use streamer::{Block, TickReport, WorldStreamer};

pub fn crate_info() -> &'static str {
    "worldstream-stream v0.1.0"
}
