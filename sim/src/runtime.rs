/*
 * Township Pandemic/Economy Simulator (TownSim)
 * Copyright (c)  2022. TownSim Developers
 *
 * This file is part of TownSim.
 *
 * TownSim is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, version 3 of the License.
 *
 * TownSim is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with TownSim.  If not, see <https://www.gnu.org/licenses/>.
 *
 */

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::models::agent::AgentSet;
use crate::models::region::LocationSet;
use crate::models::{AgentId, LocationId};
use crate::simulator::Simulator;

/// Pacing policy of the simulation thread
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Speed {
    /// 15 frames per second
    Slow,
    /// 30 frames per second
    Normal,
    /// 60 frames per second
    Fast,
    /// Back-to-back ticks
    Unlimited,
}

impl Speed {
    pub fn frame_interval(self) -> Option<Duration> {
        match self {
            Speed::Slow => Some(Duration::from_millis(65)),
            Speed::Normal => Some(Duration::from_millis(33)),
            Speed::Fast => Some(Duration::from_millis(16)),
            Speed::Unlimited => None,
        }
    }
}

/// What changed on the display side, batched by the hour
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RefreshHint {
    Destinations,
    Ages,
    All,
}

/// A display operation the simulation side queues for the render side.
/// Carries ids rather than drawables so the simulation never touches the
/// display
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GraphicsOp {
    AddAgent(AgentId),
    RemoveAgent(AgentId),
    AddLocation(LocationId),
    RemoveLocation(LocationId),
    Refresh(RefreshHint),
}

/// Queue of display operations, drained and applied by the render thread
#[derive(Default)]
pub struct GraphicsQueue {
    ops: VecDeque<GraphicsOp>,
}

impl GraphicsQueue {
    pub fn push(&mut self, op: GraphicsOp) {
        self.ops.push_back(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = GraphicsOp>) {
        self.ops.extend(ops);
    }

    pub fn drain(&mut self) -> Vec<GraphicsOp> {
        self.ops.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The shared state of a running simulation, split into the three named
/// critical sections. Lock order where both are held: locations before
/// agents; the graphics queue is never held together with another lock
pub struct World {
    agents: Mutex<AgentSet>,
    locations: Mutex<LocationSet>,
    graphics: Mutex<GraphicsQueue>,
    reset: AtomicBool,
    running: AtomicBool,
}

impl World {
    pub fn new(agents: AgentSet, locations: LocationSet) -> World {
        World {
            agents: Mutex::new(agents),
            locations: Mutex::new(locations),
            graphics: Mutex::new(GraphicsQueue::default()),
            reset: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    /// Acquires the AgentSet section, refusing when a reset intervened.
    /// A pass that sees None must abandon without further mutation
    pub fn acquire_agents(&self) -> Option<MutexGuard<'_, AgentSet>> {
        let guard = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        if self.was_reset() {
            return None;
        }
        Some(guard)
    }

    /// Acquires the LocationSet section, refusing when a reset intervened
    pub fn acquire_locations(&self) -> Option<MutexGuard<'_, LocationSet>> {
        let guard = self.locations.lock().unwrap_or_else(PoisonError::into_inner);
        if self.was_reset() {
            return None;
        }
        Some(guard)
    }

    /// Appends display operations. Callers must have released the other
    /// sections first
    pub fn push_graphics(&self, ops: impl IntoIterator<Item = GraphicsOp>) {
        self.graphics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ops);
    }

    pub fn drain_graphics(&self) -> Vec<GraphicsOp> {
        self.graphics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
    }

    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::SeqCst);
    }

    pub fn clear_reset(&self) {
        self.reset.store(false, Ordering::SeqCst);
    }

    pub fn was_reset(&self) -> bool {
        self.reset.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The render thread's model of the screen: which agents and locations
/// currently have a drawable. Headless runs drop the operations instead
#[derive(Default)]
struct Scene {
    agents: HashSet<AgentId>,
    locations: HashSet<LocationId>,
    refreshes: u64,
}

impl Scene {
    fn apply(&mut self, op: GraphicsOp) {
        match op {
            GraphicsOp::AddAgent(id) => {
                self.agents.insert(id);
            }
            GraphicsOp::RemoveAgent(id) => {
                self.agents.remove(&id);
            }
            GraphicsOp::AddLocation(id) => {
                self.locations.insert(id);
            }
            GraphicsOp::RemoveLocation(id) => {
                self.locations.remove(&id);
            }
            GraphicsOp::Refresh(_) => {
                self.refreshes += 1;
            }
        }
    }
}

/// Owns the two cooperating threads: the simulation thread running ticks
/// under the pacing policy, and the render thread draining the graphics
/// queue
pub struct SimulationController {
    world: Arc<World>,
    speed: Arc<Mutex<Speed>>,
    worker: Option<JoinHandle<Simulator>>,
    render: Option<JoinHandle<()>>,
}

impl SimulationController {
    /// Spawns both threads and starts ticking immediately
    pub fn start(mut simulator: Simulator, speed: Speed, headless: bool) -> SimulationController {
        let world = simulator.world();
        let speed = Arc::new(Mutex::new(speed));

        let worker_world = Arc::clone(&world);
        let worker_speed = Arc::clone(&speed);
        let worker = thread::spawn(move || {
            info!("Simulation thread started");
            while worker_world.is_running() {
                let started = Instant::now();
                if let Err(e) = simulator.tick() {
                    error!("Tick failed: {}", e);
                    worker_world.stop();
                    break;
                }
                let pacing = *worker_speed.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(interval) = pacing.frame_interval() {
                    thread::sleep(interval.saturating_sub(started.elapsed()));
                }
            }
            info!("Simulation thread finished");
            simulator
        });

        let render_world = Arc::clone(&world);
        let render = thread::spawn(move || {
            let mut scene = Scene::default();
            while render_world.is_running() {
                for op in render_world.drain_graphics() {
                    if !headless {
                        scene.apply(op);
                    }
                }
                thread::sleep(Duration::from_millis(33));
            }
            // One final sweep so nothing is left queued
            for op in render_world.drain_graphics() {
                if !headless {
                    scene.apply(op);
                }
            }
            debug!(
                "Render thread finished with {} agents and {} locations on screen",
                scene.agents.len(),
                scene.locations.len()
            );
        });

        SimulationController {
            world,
            speed,
            worker: Some(worker),
            render: Some(render),
        }
    }

    pub fn world(&self) -> Arc<World> {
        Arc::clone(&self.world)
    }

    /// Stops new ticks after the current one completes
    pub fn pause(&self) {
        self.world.stop();
    }

    /// Aborts the in-flight controller pass and stops the threads
    pub fn reset(&self) {
        self.world.request_reset();
        self.world.stop();
    }

    pub fn change_speed(&self, speed: Speed) {
        *self.speed.lock().unwrap_or_else(PoisonError::into_inner) = speed;
    }

    /// Waits for both threads and hands the simulator back
    pub fn join(mut self) -> Option<Simulator> {
        self.world.stop();
        let simulator = self.worker.take().and_then(|handle| handle.join().ok());
        if let Some(render) = self.render.take() {
            let _ = render.join();
        }
        simulator
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        self.world.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(render) = self.render.take() {
            let _ = render.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_in_order() {
        let mut queue = GraphicsQueue::default();
        queue.push(GraphicsOp::AddAgent(AgentId(1)));
        queue.push(GraphicsOp::RemoveAgent(AgentId(1)));
        queue.push(GraphicsOp::Refresh(RefreshHint::All));
        let ops = queue.drain();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], GraphicsOp::AddAgent(AgentId(1)));
        assert!(queue.is_empty());
    }

    #[test]
    fn reset_refuses_lock_acquisition() {
        let world = World::new(AgentSet::new(4), LocationSet::new());
        assert!(world.acquire_agents().is_some());
        world.request_reset();
        assert!(world.acquire_agents().is_none());
        assert!(world.acquire_locations().is_none());
        world.clear_reset();
        assert!(world.acquire_locations().is_some());
    }

    #[test]
    fn scene_tracks_adds_and_removes() {
        let mut scene = Scene::default();
        scene.apply(GraphicsOp::AddAgent(AgentId(3)));
        scene.apply(GraphicsOp::AddLocation(LocationId(9)));
        scene.apply(GraphicsOp::RemoveAgent(AgentId(3)));
        assert!(scene.agents.is_empty());
        assert_eq!(scene.locations.len(), 1);
    }

    #[test]
    fn pacing_intervals_match_the_frame_rates() {
        assert_eq!(Speed::Slow.frame_interval(), Some(Duration::from_millis(65)));
        assert_eq!(Speed::Normal.frame_interval(), Some(Duration::from_millis(33)));
        assert_eq!(Speed::Fast.frame_interval(), Some(Duration::from_millis(16)));
        assert_eq!(Speed::Unlimited.frame_interval(), None);
    }
}
