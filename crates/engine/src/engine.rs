//! The per-node turn loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use warpgrid_core::{scoped_rng, Agent, AgentCodec, GlobalCoord, Turn};
use warpgrid_net::{InboundQueue, Message, MessageKind, PeerLink, SentLog};
use warpgrid_world::{Cell, CheckpointStore, GridObserver, LocalGrid, Resolution};

use crate::pacer::TurnPacer;

/// Drives one node's turn loop: advance, checkpoint, simulate, broadcast,
/// drain, with rollback when a straggler arrives.
///
/// The engine is the only mutator of cell and checkpoint state; listener
/// tasks only ever touch the shared [`InboundQueue`].
pub struct TurnEngine<C: AgentCodec> {
    grid: LocalGrid,
    peers: Vec<Arc<PeerLink>>,
    inbound: Arc<InboundQueue>,
    checkpoints: CheckpointStore,
    sent: SentLog,
    codec: C,
    observer: Option<Box<dyn GridObserver>>,
    pacer: TurnPacer,
    seed: u64,
    turn: Turn,
    rolled_back: bool,
    retention: Option<i32>,
}

impl<C: AgentCodec> TurnEngine<C> {
    /// Build an engine over an initialized grid.
    pub fn new(grid: LocalGrid, codec: C, seed: u64) -> Self {
        Self {
            grid,
            peers: Vec::new(),
            inbound: Arc::new(InboundQueue::new()),
            checkpoints: CheckpointStore::new(),
            sent: SentLog::new(),
            codec,
            observer: None,
            pacer: TurnPacer::immediate(),
            seed,
            turn: Turn::ZERO,
            rolled_back: false,
            retention: None,
        }
    }

    /// Use an externally created inbound queue (client bootstrap wires the
    /// listener before the engine exists).
    pub fn with_inbound(mut self, inbound: Arc<InboundQueue>) -> Self {
        self.inbound = inbound;
        self
    }

    /// Attach a per-turn observer.
    pub fn with_observer(mut self, observer: Box<dyn GridObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Pace turns with the given scheduler tick.
    pub fn with_pacer(mut self, pacer: TurnPacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Keep only the newest `turns` checkpoints. Unset retains everything.
    pub fn with_retention(mut self, turns: i32) -> Self {
        self.retention = Some(turns);
        self
    }

    /// The shared inbound queue fed by listener tasks.
    pub fn inbound(&self) -> Arc<InboundQueue> {
        Arc::clone(&self.inbound)
    }

    /// Register a peer link. Routing consults peers in registration order.
    pub fn add_peer(&mut self, link: Arc<PeerLink>) {
        self.peers.push(link);
    }

    /// Registered peer links.
    pub fn peers(&self) -> &[Arc<PeerLink>] {
        &self.peers
    }

    /// The local grid.
    pub fn grid(&self) -> &LocalGrid {
        &self.grid
    }

    /// Mutable access to the local grid, e.g. for initial placement and
    /// the bootstrap split.
    pub fn grid_mut(&mut self) -> &mut LocalGrid {
        &mut self.grid
    }

    /// The node's current turn.
    pub fn turn(&self) -> Turn {
        self.turn
    }

    /// Run the loop until `horizon` turns have completed.
    ///
    /// Only a rollback-precondition violation (a straggler older than the
    /// retained checkpoints) aborts the run; per-peer failures are logged
    /// and the simulation continues.
    pub async fn run(&mut self, horizon: i32) -> Result<()> {
        while self.turn.0 < horizon {
            self.pacer.tick().await;
            self.step().await?;
        }
        info!(turns = horizon, "turn horizon reached");
        Ok(())
    }

    /// One full iteration of the turn state machine.
    pub async fn step(&mut self) -> Result<()> {
        // A rollback leaves the restored turn to be replayed: no advance,
        // and no checkpoint overwrite of the restored state.
        if !self.rolled_back {
            self.turn = self.turn.advance(1);
            self.checkpoints.save(self.turn, &self.grid, &self.codec);
            if let Some(retention) = self.retention {
                let floor = Turn(self.turn.0 - retention);
                self.checkpoints.prune_before(floor);
                self.sent.prune_through(floor);
            }
        }
        self.rolled_back = false;

        debug!(turn = self.turn.0, "starting turn");
        self.simulate().await;
        self.broadcast().await;
        self.drain().await?;

        if let Some(observer) = self.observer.as_mut() {
            observer.turn_complete(self.turn, &self.grid);
        }
        Ok(())
    }

    /// Give every agent in every cell its per-turn action.
    async fn simulate(&mut self) {
        for cell in self.grid.cells_mut() {
            cell.reset_turn_flags();
        }
        let coords: Vec<GlobalCoord> = self.grid.cells().map(Cell::coord).collect();
        for coord in coords {
            self.run_cell(coord).await;
        }
    }

    async fn run_cell(&mut self, coord: GlobalCoord) {
        while let Some(mut agent) = self
            .grid
            .cell_mut(coord)
            .and_then(|cell| cell.take_unacted())
        {
            let mut rng = scoped_rng(self.seed, coord.seed_key(), self.turn);
            match agent.propose_move(coord, self.turn, &mut rng) {
                None => {
                    if let Some(cell) = self.grid.cell_mut(coord) {
                        cell.add(agent);
                    }
                }
                Some(request) => {
                    let target = coord.offset(request.dx, request.dy);
                    self.dispatch_move(target, agent).await;
                }
            }
        }
    }

    /// Route a move: local deposit, peer transfer, or dropped with a log.
    async fn dispatch_move(&mut self, target: GlobalCoord, agent: Box<dyn Agent>) {
        let target = self.grid.normalize(target);
        let resolution = self
            .grid
            .resolve(target, self.peers.iter().map(|link| link.as_ref()));
        match resolution {
            Ok(Resolution::Local(coord)) => {
                if let Err(err) = self.grid.place_agent(coord, agent) {
                    warn!(error = %err, "local deposit failed; dropping agent");
                }
            }
            Ok(Resolution::Peer(index)) => {
                let link = &self.peers[index];
                let message =
                    Message::send_agent(self.turn, target, &self.codec.encode(agent.as_ref()));
                match link.send(&message).await {
                    Ok(()) => self.sent.record(index, message),
                    Err(err) => {
                        warn!(error = %err, "agent transfer failed; dropping agent");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "no owner for move target; dropping agent");
            }
        }
    }

    /// Tell every live peer this node finished the turn.
    async fn broadcast(&mut self) {
        for link in &self.peers {
            if !link.is_alive() {
                continue;
            }
            if let Err(err) = link.send_end_turn(self.turn).await {
                warn!(peer = link.id(), error = %err, "end-of-turn broadcast failed");
            }
        }
    }

    /// Drain every currently-pending inbound message.
    ///
    /// A message whose send turn precedes the current turn is a straggler:
    /// roll back to that turn, then keep processing from the restored turn.
    /// Arrivals after the queue is observed empty wait for the next turn.
    async fn drain(&mut self) -> Result<()> {
        if self.inbound.is_empty_hint() {
            return Ok(());
        }
        debug!(pending = self.inbound.len(), "draining inbound queue");
        while let Some(message) = self.inbound.pop_min() {
            if message.send_turn < self.turn {
                self.roll_back(message.send_turn).await?;
            }
            self.apply(&message);
        }
        Ok(())
    }

    fn apply(&mut self, message: &Message) {
        if message.kind != MessageKind::SendAgent {
            return;
        }
        if !message.sign {
            // An anti-message whose partner was already processed: the
            // rollback above rewound the deposit, so there is nothing left
            // to apply.
            debug!(send_turn = message.send_turn.0, "discarding unmatched anti-message");
            return;
        }
        let (coord, bytes) = match message.agent_payload() {
            Ok(parts) => parts,
            Err(err) => {
                warn!(error = %err, "malformed agent transfer; dropping");
                return;
            }
        };
        let agent = match self.codec.decode(bytes) {
            Ok(agent) => agent,
            Err(err) => {
                warn!(%coord, error = %err, "agent transfer failed to decode; dropping");
                return;
            }
        };
        match self.grid.place_agent(coord, agent) {
            Ok(()) => debug!(%coord, send_turn = message.send_turn.0, "agent arrived"),
            Err(err) => warn!(error = %err, "inbound agent targets non-local cell; dropping"),
        }
    }

    /// Restore `target`'s checkpoint and annihilate newer outbound sends.
    async fn roll_back(&mut self, target: Turn) -> Result<()> {
        warn!(
            current = self.turn.0,
            target = target.0,
            "straggler received; rolling back"
        );
        // Undo effects at the receivers before undoing them here.
        for (peer_index, message) in self.sent.drain_after(target) {
            let Some(link) = self.peers.get(peer_index) else {
                continue;
            };
            if let Err(err) = link.send(&message.antimessage()).await {
                warn!(peer = link.id(), error = %err, "anti-message send failed");
            }
        }
        self.checkpoints
            .restore(target, &mut self.grid, &self.codec)
            .context("rollback precondition violated; aborting node")?;
        self.turn = target;
        self.rolled_back = true;
        Ok(())
    }
}
