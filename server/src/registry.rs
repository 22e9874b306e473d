//! Server-side player slots for the hosted session
//!
//! This module tracks everyone who has joined the session:
//! - A fixed table of [`MAX_PLAYERS`] slots indexed by player id
//! - The last full [`PlayerState`] each player reported
//! - The peer address each player speaks from
//! - A cancellation token per player for any work tied to that player
//!
//! Ids arrive from the network and race with disconnects, so every operation
//! tolerates stale or out-of-range ids: mutators do nothing and getters return
//! `None`. Nothing here ever fails.

use log::debug;
use protocol::{PlayerState, Point3};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Number of player slots in a session
pub const MAX_PLAYERS: usize = 16;

/// A player occupying one slot
#[derive(Debug)]
pub struct Player {
    /// Slot index, also the id other peers know this player by
    pub id: u32,
    /// Last state reported for this player, replaced wholesale on update
    pub state: PlayerState,
    /// Cosmetic fleece id
    pub skin: i32,
    /// Address the player's datagrams come from, once known
    pub peer: Option<SocketAddr>,
    cancellation: CancellationToken,
}

impl Player {
    fn new(id: u32, position: Point3, skin: i32, cancellation: CancellationToken) -> Self {
        Self {
            id,
            state: PlayerState::idle_at(position),
            skin,
            peer: None,
            cancellation,
        }
    }

    /// Token cancelled when this player is deleted or the session ends
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Fixed-capacity slot table owned by the session server
///
/// Every player token is a child of the token the registry was created with,
/// so cancelling the session cancels all per-player work as well.
#[derive(Debug)]
pub struct PlayerRegistry {
    slots: [Option<Player>; MAX_PLAYERS],
    parent: CancellationToken,
}

impl PlayerRegistry {
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            slots: Default::default(),
            parent,
        }
    }

    fn slot(&self, id: u32) -> Option<&Player> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: u32) -> Option<&mut Player> {
        let player = self.slots.get_mut(id as usize).and_then(Option::as_mut);
        if player.is_none() {
            debug!("Ignoring stale player id {}", id);
        }
        player
    }

    /// Creates a player in slot `id`, or refreshes the skin and position of
    /// the player already there.
    pub fn create(&mut self, id: u32, position: Point3, skin: i32) {
        let Some(slot) = self.slots.get_mut(id as usize) else {
            debug!("Ignoring out-of-range player id {}", id);
            return;
        };

        if let Some(player) = slot.as_mut() {
            player.skin = skin;
            player.state.position = position;
            return;
        }
        *slot = Some(Player::new(id, position, skin, self.parent.child_token()));
        debug!("Player {} created at {:?}", id, position);
    }

    /// Releases slot `id` and cancels that player's token
    pub fn delete(&mut self, id: u32) {
        let Some(player) = self.slots.get_mut(id as usize).and_then(Option::take) else {
            debug!("Ignoring delete of empty player slot {}", id);
            return;
        };
        player.cancellation.cancel();
        debug!("Player {} deleted", id);
    }

    pub fn move_to(&mut self, id: u32, position: Point3) {
        if let Some(player) = self.slot_mut(id) {
            player.state.position = position;
        }
    }

    pub fn set_skin(&mut self, id: u32, skin: i32) {
        if let Some(player) = self.slot_mut(id) {
            player.skin = skin;
        }
    }

    pub fn set_state(&mut self, id: u32, state: PlayerState) {
        if let Some(player) = self.slot_mut(id) {
            player.state = state;
        }
    }

    pub fn get_state(&self, id: u32) -> Option<&PlayerState> {
        self.slot(id).map(|player| &player.state)
    }

    pub fn get(&self, id: u32) -> Option<&Player> {
        self.slot(id)
    }

    /// Lowest id whose slot is free
    pub fn first_free(&self) -> Option<u32> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|index| index as u32)
    }

    pub fn attach_peer(&mut self, id: u32, addr: SocketAddr) {
        if let Some(player) = self.slot_mut(id) {
            player.peer = Some(addr);
        }
    }

    /// Finds the player whose datagrams come from `addr`
    pub fn find_by_peer(&self, addr: SocketAddr) -> Option<u32> {
        self.players()
            .find(|player| player.peer == Some(addr))
            .map(|player| player.id)
    }

    /// Ids and addresses of every player with a known peer
    pub fn peers(&self) -> Vec<(u32, SocketAddr)> {
        self.players()
            .filter_map(|player| player.peer.map(|addr| (player.id, addr)))
            .collect()
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.slots.iter().flatten()
    }

    /// Deletes every player
    pub fn clear(&mut self) {
        for id in 0..MAX_PLAYERS as u32 {
            if self.slot(id).is_some() {
                self.delete(id);
            }
        }
    }

    /// Returns the number of occupied slots
    pub fn len(&self) -> usize {
        self.players().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::State;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn registry() -> PlayerRegistry {
        PlayerRegistry::new(CancellationToken::new())
    }

    #[test]
    fn test_registry_creation() {
        let registry = registry();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.first_free(), Some(0));
    }

    #[test]
    fn test_create_player() {
        let mut registry = registry();
        let position = Point3::new(1.0, 2.0, 3.0);
        registry.create(3, position, 7);

        let player = registry.get(3).unwrap();
        assert_eq!(player.id, 3);
        assert_eq!(player.skin, 7);
        assert_eq!(player.state, PlayerState::idle_at(position));
        assert_eq!(player.peer, None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_existing_updates_in_place() {
        let mut registry = registry();
        registry.create(2, Point3::new(1.0, 1.0, 1.0), 0);
        registry.set_state(2, PlayerState::new(State::Dancing, 1.0, 2.0, true, 4.0, Point3::default()));
        let token = registry.get(2).unwrap().cancellation().clone();

        registry.create(2, Point3::new(9.0, 9.0, 9.0), 5);

        let player = registry.get(2).unwrap();
        assert_eq!(player.skin, 5);
        assert_eq!(player.state.position, Point3::new(9.0, 9.0, 9.0));
        assert_eq!(player.state.current, State::Dancing);
        assert!(!token.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_out_of_range_ids_are_ignored() {
        let mut registry = registry();
        let far = MAX_PLAYERS as u32;

        registry.create(far, Point3::default(), 0);
        registry.create(u32::MAX, Point3::default(), 0);
        registry.move_to(far, Point3::new(1.0, 0.0, 0.0));
        registry.set_state(far, PlayerState::default());
        registry.set_skin(far, 3);
        registry.attach_peer(far, test_addr());
        registry.delete(far);

        assert!(registry.is_empty());
        assert!(registry.get_state(far).is_none());
        assert!(registry.get(u32::MAX).is_none());
    }

    #[test]
    fn test_empty_slot_operations_are_ignored() {
        let mut registry = registry();
        registry.move_to(4, Point3::new(1.0, 0.0, 0.0));
        registry.set_state(4, PlayerState::default());
        registry.delete(4);

        assert!(registry.get_state(4).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_set_state_replaces_whole_state() {
        let mut registry = registry();
        registry.create(0, Point3::new(5.0, 5.0, 5.0), 0);

        let state = PlayerState::new(State::Casting, 0.5, 0.5, true, 2.0, Point3::new(-1.0, 0.0, 1.0));
        registry.set_state(0, state);
        assert_eq!(registry.get_state(0), Some(&state));
    }

    #[test]
    fn test_move_to() {
        let mut registry = registry();
        registry.create(1, Point3::default(), 0);
        registry.move_to(1, Point3::new(4.0, 5.0, 6.0));
        assert_eq!(
            registry.get_state(1).unwrap().position,
            Point3::new(4.0, 5.0, 6.0)
        );
    }

    #[test]
    fn test_delete_cancels_player_token() {
        let mut registry = registry();
        registry.create(5, Point3::default(), 0);
        let token = registry.get(5).unwrap().cancellation().clone();

        registry.delete(5);
        assert!(token.is_cancelled());
        assert!(registry.get(5).is_none());
        assert_eq!(registry.first_free(), Some(0));
    }

    #[test]
    fn test_parent_cancellation_reaches_players() {
        let parent = CancellationToken::new();
        let mut registry = PlayerRegistry::new(parent.clone());
        registry.create(0, Point3::default(), 0);
        registry.create(1, Point3::default(), 0);

        parent.cancel();
        assert!(registry.players().all(|p| p.cancellation().is_cancelled()));
    }

    #[test]
    fn test_first_free_fills_gaps() {
        let mut registry = registry();
        for id in 0..3 {
            registry.create(id, Point3::default(), 0);
        }
        registry.delete(1);
        assert_eq!(registry.first_free(), Some(1));
    }

    #[test]
    fn test_full_registry_has_no_free_slot() {
        let mut registry = registry();
        for id in 0..MAX_PLAYERS as u32 {
            registry.create(id, Point3::default(), 0);
        }
        assert_eq!(registry.len(), MAX_PLAYERS);
        assert_eq!(registry.first_free(), None);
    }

    #[test]
    fn test_find_by_peer() {
        let mut registry = registry();
        registry.create(0, Point3::default(), 0);
        registry.create(1, Point3::default(), 0);
        registry.attach_peer(0, test_addr());
        registry.attach_peer(1, test_addr2());

        assert_eq!(registry.find_by_peer(test_addr()), Some(0));
        assert_eq!(registry.find_by_peer(test_addr2()), Some(1));

        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(registry.find_by_peer(unknown), None);

        let mut peers = registry.peers();
        peers.sort();
        assert_eq!(peers, vec![(0, test_addr()), (1, test_addr2())]);
    }

    #[test]
    fn test_clear_cancels_everyone() {
        let mut registry = registry();
        registry.create(0, Point3::default(), 0);
        registry.create(15, Point3::default(), 0);
        let tokens: Vec<_> = registry
            .players()
            .map(|p| p.cancellation().clone())
            .collect();

        registry.clear();
        assert!(registry.is_empty());
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
    }
}
