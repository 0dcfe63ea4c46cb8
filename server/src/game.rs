//! Authoritative game engine.
//!
//! [`GameEngine`] exclusively owns every player, the apple, the game mode and
//! the respawn queue. All mutation is synchronous and goes through its methods,
//! each of which returns the [`Dispatch`]es the transport should deliver. Time
//! is passed in as epoch milliseconds so the engine never reads a clock itself.

use crate::movement::{MovementAuthority, MovementInput, Proposal};
use crate::player::Player;
use crate::scheduler::RespawnQueue;
use crate::spawn::{random_free_cell, spawn_direction};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::rules::{advance, detect_collision, next_head};
use shared::{
    ClientMessage, Collision, DeathReason, Direction, GameMode, GameSnapshot, MapId, MapLayout,
    MovementKind, Position, ServerMessage, BOOST_MULTIPLIER, GRID_SIZE, RESPAWN_DELAY_MS,
};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown player {0}")]
    UnknownPlayer(u32),
    #[error("Player {0} already exists")]
    DuplicatePlayer(u32),
    #[error("{0} updates are not accepted with {1}-side movement")]
    UnsupportedMovement(&'static str, MovementKind),
    #[error("Segment update without segments")]
    EmptySegments,
    #[error("Message type is handled by the transport")]
    NotAnEngineMessage,
}

/// A message the transport must deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Direct {
        player_id: u32,
        message: ServerMessage,
    },
    Broadcast(ServerMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    pub grid_size: i32,
    pub respawn_delay_ms: u64,
    /// Engine ticks per move for a snake that is not boosting.
    pub boost_multiplier: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            respawn_delay_ms: RESPAWN_DELAY_MS,
            boost_multiplier: BOOST_MULTIPLIER,
        }
    }
}

#[derive(Debug)]
pub struct GameEngine {
    config: GameConfig,
    players: BTreeMap<u32, Player>,
    apple: Position,
    mode: GameMode,
    current_map: MapId,
    layout: MapLayout,
    respawns: RespawnQueue,
    authority: Box<dyn MovementAuthority>,
    rng: StdRng,
    tick: u64,
}

impl GameEngine {
    pub fn new(config: GameConfig, authority: Box<dyn MovementAuthority>) -> Self {
        Self::with_rng(config, authority, StdRng::from_entropy())
    }

    pub fn with_rng(
        config: GameConfig,
        authority: Box<dyn MovementAuthority>,
        mut rng: StdRng,
    ) -> Self {
        let apple = random_free_cell(&mut rng, config.grid_size, &HashSet::new());
        info!(
            "Engine ready: {}x{} grid, {}-side movement, apple at {}",
            config.grid_size,
            config.grid_size,
            authority.kind(),
            apple
        );

        Self {
            config,
            players: BTreeMap::new(),
            apple,
            mode: GameMode::Selection,
            current_map: MapId::Classic,
            layout: MapLayout::classic(),
            respawns: RespawnQueue::new(),
            authority,
            rng,
            tick: 0,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn movement_kind(&self) -> MovementKind {
        self.authority.kind()
    }

    pub fn apple(&self) -> Position {
        self.apple
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn current_map(&self) -> MapId {
        self.current_map
    }

    pub fn layout(&self) -> &MapLayout {
        &self.layout
    }

    pub fn player(&self, player_id: u32) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn player_mut(&mut self, player_id: u32) -> Option<&mut Player> {
        self.players.get_mut(&player_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_respawn_scheduled(&self, player_id: u32) -> bool {
        self.respawns.contains(player_id)
    }

    /// Moves the apple to set up a scenario.
    #[cfg(any(test, feature = "test-support"))]
    pub fn place_apple(&mut self, position: Position) {
        self.apple = position;
    }

    /// Creates a session with a one-cell snake on a free cell.
    ///
    /// The new player is told its id first, then gets a full snapshot.
    pub fn add_player(&mut self, player_id: u32) -> Result<Vec<Dispatch>, EngineError> {
        if self.players.contains_key(&player_id) {
            return Err(EngineError::DuplicatePlayer(player_id));
        }

        let spawn = self.free_cell();
        let direction = spawn_direction(spawn, self.config.grid_size);
        let player = Player::new(player_id, spawn, direction);
        info!(
            "Added player {} at {} heading {:?} (hue {})",
            player_id, spawn, direction, player.hue
        );
        self.players.insert(player_id, player);

        Ok(vec![
            Dispatch::Direct {
                player_id,
                message: ServerMessage::AssignId { id: player_id },
            },
            Dispatch::Direct {
                player_id,
                message: ServerMessage::GameState(self.snapshot()),
            },
        ])
    }

    /// Deletes a session and cancels any respawn it was waiting for.
    pub fn remove_player(&mut self, player_id: u32) -> bool {
        let cancelled = self.respawns.cancel(player_id);
        match self.players.remove(&player_id) {
            Some(_) => {
                info!(
                    "Removed player {}{}",
                    player_id,
                    if cancelled { " (pending respawn cancelled)" } else { "" }
                );
                true
            }
            None => false,
        }
    }

    /// Routes one decoded client message to the matching engine operation.
    pub fn handle_message(
        &mut self,
        player_id: u32,
        message: ClientMessage,
        now: u64,
    ) -> Result<Vec<Dispatch>, EngineError> {
        match message {
            ClientMessage::Move { direction } => {
                self.apply_movement(player_id, MovementInput::Direction(direction), now)
            }
            ClientMessage::PositionUpdate {
                segments,
                direction,
            } => self.apply_movement(
                player_id,
                MovementInput::Segments {
                    segments,
                    direction,
                },
                now,
            ),
            ClientMessage::BoostUpdate { is_boosting } => {
                self.set_boosting(player_id, is_boosting)?;
                Ok(Vec::new())
            }
            ClientMessage::MapSelection { map_id } => {
                self.select_map(player_id, map_id)?;
                Ok(Vec::new())
            }
            ClientMessage::GameModeUpdate { mode } => {
                self.require_player(player_id)?;
                info!("Player {} requested {} mode", player_id, mode);
                Ok(self.set_game_mode(mode))
            }
            ClientMessage::Died { reason } => self.report_death(player_id, reason, now),
            ClientMessage::Ping { .. } => Err(EngineError::NotAnEngineMessage),
        }
    }

    /// Hands a movement message to the configured authority and applies the result.
    ///
    /// Ignored outside `playing` mode and while the player is respawning.
    pub fn apply_movement(
        &mut self,
        player_id: u32,
        input: MovementInput,
        now: u64,
    ) -> Result<Vec<Dispatch>, EngineError> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(EngineError::UnknownPlayer(player_id))?;

        if self.mode != GameMode::Playing || !player.is_active() {
            debug!("Ignoring movement from player {} (not in play)", player_id);
            return Ok(Vec::new());
        }

        match self.authority.on_input(player, input)? {
            Proposal::Replace {
                segments,
                direction,
            } => Ok(self.commit_submitted(player_id, segments, direction, now)),
            Proposal::Advance(_) | Proposal::Hold => Ok(Vec::new()),
        }
    }

    /// Advances the simulation by one engine tick.
    pub fn tick(&mut self, now: u64) -> Vec<Dispatch> {
        self.tick += 1;
        if self.mode != GameMode::Playing {
            return Vec::new();
        }

        let mut moves: Vec<(u32, Vec<Position>, bool)> = Vec::new();
        for (id, player) in self.players.iter_mut() {
            if !player.is_active() {
                continue;
            }
            if let Proposal::Advance(direction) =
                self.authority.on_tick(player, self.config.boost_multiplier)
            {
                let Some(head) = player.head() else {
                    continue;
                };
                let grows = next_head(head, direction, &self.layout) == self.apple;
                moves.push((*id, advance(&player.segments, direction, grows, &self.layout), grows));
            }
        }

        if moves.is_empty() {
            return Vec::new();
        }
        debug!("Tick {}: {} snakes moving", self.tick, moves.len());

        // Every collision is judged against the board after all moves of this tick.
        let mut board: HashMap<u32, &[Position]> = self
            .players
            .values()
            .filter(|p| p.is_active())
            .map(|p| (p.id, p.segments.as_slice()))
            .collect();
        for (id, segments, _) in &moves {
            board.insert(*id, segments.as_slice());
        }

        let mut deaths: Vec<(u32, Collision)> = Vec::new();
        for (id, segments, _) in &moves {
            let others = board
                .iter()
                .filter(|(other, _)| *other != id)
                .map(|(other, segs)| (*other, *segs));
            if let Some(collision) =
                detect_collision(segments, others, self.config.grid_size, &self.layout)
            {
                deaths.push((*id, collision));
            }
        }
        deaths.sort_by_key(|(id, _)| *id);

        let mut eaters = Vec::new();
        for (id, segments, grows) in moves {
            if deaths.iter().any(|(dead, _)| *dead == id) {
                continue;
            }
            if let Some(player) = self.players.get_mut(&id) {
                player.segments = segments;
                if grows {
                    eaters.push(id);
                }
            }
        }

        let mut dispatches = Vec::new();
        for (id, collision) in deaths {
            dispatches.extend(self.handle_death(id, collision, now));
        }
        for id in eaters {
            dispatches.extend(self.consume_apple(id));
        }
        dispatches
    }

    /// Fires every respawn whose deadline has passed.
    pub fn poll_respawns(&mut self, now: u64) -> Vec<Dispatch> {
        let due = self.respawns.pop_due(now);
        due.into_iter().flat_map(|id| self.respawn(id)).collect()
    }

    pub fn next_respawn_at(&self) -> Option<u64> {
        self.respawns.next_deadline()
    }

    /// Kills a player: empties its snake, schedules the respawn and announces the death.
    pub fn handle_death(&mut self, player_id: u32, collision: Collision, now: u64) -> Vec<Dispatch> {
        let delay = self.config.respawn_delay_ms;
        let Some(player) = self.players.get_mut(&player_id) else {
            return Vec::new();
        };
        if !player.is_active() {
            return Vec::new();
        }

        let deadline = now + delay;
        player.kill(deadline);
        self.respawns.schedule(player_id, deadline);
        info!(
            "Player {} died ({}{}), respawning at {}",
            player_id,
            collision.reason,
            collision
                .collided_with
                .map(|other| format!(" into {}", other))
                .unwrap_or_default(),
            deadline
        );

        vec![Dispatch::Broadcast(ServerMessage::Death {
            player_id,
            reason: collision.reason,
            collided_with: collision.collided_with,
            respawn_delay: delay,
        })]
    }

    /// Brings a respawning player back with a fresh one-cell snake.
    ///
    /// A no-op for players that are gone or already active.
    pub fn respawn(&mut self, player_id: u32) -> Vec<Dispatch> {
        match self.players.get(&player_id) {
            Some(player) if player.is_respawning() => {}
            Some(_) => {
                debug!("Respawn for player {} skipped: already active", player_id);
                return Vec::new();
            }
            None => {
                debug!("Respawn for player {} skipped: no longer connected", player_id);
                return Vec::new();
            }
        }

        self.respawns.cancel(player_id);
        let spawn = self.free_cell();
        let direction = spawn_direction(spawn, self.config.grid_size);
        if let Some(player) = self.players.get_mut(&player_id) {
            player.revive(spawn, direction);
        }
        info!("Player {} respawned at {}", player_id, spawn);

        vec![Dispatch::Broadcast(ServerMessage::Respawn {
            player_id,
            position: spawn,
            direction,
        })]
    }

    pub fn set_boosting(&mut self, player_id: u32, boosting: bool) -> Result<(), EngineError> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(EngineError::UnknownPlayer(player_id))?;
        if player.boosting != boosting {
            debug!("Player {} boosting: {}", player_id, boosting);
        }
        player.boosting = boosting;
        Ok(())
    }

    /// Records a non-binding map vote; `None` withdraws it.
    pub fn select_map(&mut self, player_id: u32, map: Option<MapId>) -> Result<(), EngineError> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(EngineError::UnknownPlayer(player_id))?;
        player.map_vote = map;
        debug!("Player {} voted for {:?}", player_id, map);
        Ok(())
    }

    /// Map chosen by the current votes.
    ///
    /// Most votes wins. On a tie the map whose earliest voter joined first wins.
    /// Without votes the result is `classic`.
    pub fn resolve_map_vote(&self) -> MapId {
        let mut tally: Vec<(MapId, usize)> = Vec::new();
        for vote in self.players.values().filter_map(|p| p.map_vote) {
            match tally.iter_mut().find(|(map, _)| *map == vote) {
                Some((_, count)) => *count += 1,
                None => tally.push((vote, 1)),
            }
        }

        // Players iterate in join order, so the first maximum is the tie-break winner.
        let mut winner: Option<(MapId, usize)> = None;
        for (map, count) in tally {
            if winner.map_or(true, |(_, best)| count > best) {
                winner = Some((map, count));
            }
        }
        winner.map(|(map, _)| map).unwrap_or_default()
    }

    /// Switches the global mode.
    ///
    /// Entering `playing` locks in the voted map and revives everyone still waiting.
    pub fn set_game_mode(&mut self, mode: GameMode) -> Vec<Dispatch> {
        if mode == self.mode {
            return Vec::new();
        }

        let mut dispatches = Vec::new();
        if mode == GameMode::Playing {
            self.current_map = self.resolve_map_vote();
            self.layout = MapLayout::load(self.current_map, self.config.grid_size);
            info!("Starting play on map {}", self.current_map);
            if self.layout.is_portal(self.apple) {
                self.apple = self.free_cell();
                debug!("Apple moved off a portal to {}", self.apple);
            }

            let waiting: Vec<u32> = self
                .players
                .values()
                .filter(|p| p.is_respawning())
                .map(|p| p.id)
                .collect();
            for id in waiting {
                dispatches.extend(self.respawn(id));
            }
        } else {
            info!("Back to map selection");
        }

        self.mode = mode;
        for player in self.players.values_mut() {
            player.ticks_since_move = 0;
        }
        debug!("Mode switched to {}", mode);

        dispatches.insert(0, Dispatch::Broadcast(ServerMessage::GameModeUpdate { mode }));
        dispatches
    }

    /// Honours a client's death claim only if the server's own check agrees.
    pub fn report_death(
        &mut self,
        player_id: u32,
        claimed: DeathReason,
        now: u64,
    ) -> Result<Vec<Dispatch>, EngineError> {
        let player = self.require_player(player_id)?;
        if self.mode != GameMode::Playing || !player.is_active() {
            return Ok(Vec::new());
        }

        match self.collision_for(player_id, &player.segments) {
            Some(collision) => {
                if collision.reason != claimed {
                    debug!(
                        "Player {} claimed {} but collided with {}",
                        player_id, claimed, collision.reason
                    );
                }
                Ok(self.handle_death(player_id, collision, now))
            }
            None => {
                warn!(
                    "Ignoring unconfirmed death claim ({}) from player {}",
                    claimed, player_id
                );
                Ok(Vec::new())
            }
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            players: self.players.values().map(Player::snapshot).collect(),
            apple: self.apple,
            grid_size: self.config.grid_size,
            game_mode: self.mode,
            current_map: self.current_map,
        }
    }

    /// Adopts client-submitted segments after re-deriving growth and collisions.
    fn commit_submitted(
        &mut self,
        player_id: u32,
        mut segments: Vec<Position>,
        direction: Direction,
        now: u64,
    ) -> Vec<Dispatch> {
        let Some(player) = self.players.get(&player_id) else {
            return Vec::new();
        };

        let grows = segments.first() == Some(&self.apple);
        let allowed = player.size as usize + usize::from(grows);
        if segments.len() > allowed {
            debug!(
                "Player {} submitted {} segments, trimming to {}",
                player_id,
                segments.len(),
                allowed
            );
            segments.truncate(allowed);
        }

        if let Some(collision) = self.collision_for(player_id, &segments) {
            return self.handle_death(player_id, collision, now);
        }

        if let Some(player) = self.players.get_mut(&player_id) {
            player.segments = segments;
            player.direction = direction;
            player.size = player.size.min(player.segments.len() as u32).max(1);
        }

        if grows {
            self.consume_apple(player_id)
        } else {
            Vec::new()
        }
    }

    /// Grows the eater and moves the apple off every active snake.
    fn consume_apple(&mut self, player_id: u32) -> Vec<Dispatch> {
        let Some(player) = self.players.get_mut(&player_id) else {
            return Vec::new();
        };
        player.size = player.segments.len() as u32;
        let size = player.size;

        let eaten = self.apple;
        let blocked = self.blocked_cells();
        self.apple = random_free_cell(&mut self.rng, self.config.grid_size, &blocked);
        info!(
            "Player {} ate the apple at {} (size {}), new apple at {}",
            player_id, eaten, size, self.apple
        );

        vec![Dispatch::Broadcast(ServerMessage::AppleEat {
            player_id,
            new_apple: self.apple,
        })]
    }

    fn collision_for(&self, player_id: u32, segments: &[Position]) -> Option<Collision> {
        let others = self
            .players
            .values()
            .filter(|p| p.id != player_id && p.is_active())
            .map(|p| (p.id, p.segments.as_slice()));
        detect_collision(segments, others, self.config.grid_size, &self.layout)
    }

    /// Cells an apple or spawn must avoid: active snakes and portal entries.
    fn blocked_cells(&self) -> HashSet<Position> {
        self.players
            .values()
            .filter(|p| p.is_active())
            .flat_map(|p| p.segments.iter().copied())
            .chain(self.layout.portal_cells())
            .collect()
    }

    /// Free cell for a new snake, also keeping clear of the apple.
    fn free_cell(&mut self) -> Position {
        let mut blocked = self.blocked_cells();
        blocked.insert(self.apple);
        random_free_cell(&mut self.rng, self.config.grid_size, &blocked)
    }

    fn require_player(&self, player_id: u32) -> Result<&Player, EngineError> {
        self.players
            .get(&player_id)
            .ok_or(EngineError::UnknownPlayer(player_id))
    }
}
