//! Player action state and its wire codec
//!
//! A `PlayerState` is the full snapshot of what one player is doing: the
//! action state machine's current node, orientation, guard flag, the timer
//! of the current timed action and the world position. Receivers replace
//! their copy wholesale with each decoded snapshot.

use crate::codec::{self, Reader};
use crate::error::{CodecError, Result};
use crate::point::Point3;

/// Magic tag leading every encoded player state
pub const PLAYER_STATE_MAGIC: u32 = 0xAB_3245;

/// Fixed header size: magic and state tag, three floats and the guard byte
pub const PLAYER_STATE_MIN_LEN: usize = 4 * 2 + 4 * 3 + 1;

/// Every action state a player can be in. Discriminants are the wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum State {
    #[default]
    Idle = 0,
    Moving,
    Attacking,
    Defending,
    SignPostAttack,
    RecoverFromAttack,
    AimDodge,
    Dodging,
    Fleeing,
    Inventory,
    Map,
    WeaponSelect,
    CustomAction0,
    InActive,
    RaiseAlarm,
    Casting,
    TimedAction,
    Worshipping,
    Sleeping,
    BeingCarried,
    HitThrown,
    HitLeft,
    HitRight,
    HitRecover,
    Teleporting,
    SignPostCounterAttack,
    RecoverFromCounterAttack,
    Charging,
    Vulnerable,
    Converting,
    Unconverted,
    FoundItem,
    Dieing,
    Dead,
    Building,
    Respawning,
    AwaitRecruit,
    PickedUp,
    SacrificeRecruit,
    Recruited,
    Dancing,
    SpawnIn,
    SpawnOut,
    CrowdWorship,
    Grapple,
    DashAcrossIsland,
    ChargingHeavyAttack,
    Elevator,
    Grabbed,
    CustomAnimation,
    Preach,
    Stealth,
    GameOver,
    KnockBack,
    Aiming,
    Meditate,
    Resurrecting,
    IdleCarryingBody,
    MovingCarryingBody,
    Heal,
    Reeling,
    TiedToAltar,
    FinalGameOver,
    KnockedOut,
    CoopReviving,
}

impl State {
    /// All states in tag order; `ALL[n]` has tag `n`.
    pub const ALL: [State; 65] = [
        State::Idle,
        State::Moving,
        State::Attacking,
        State::Defending,
        State::SignPostAttack,
        State::RecoverFromAttack,
        State::AimDodge,
        State::Dodging,
        State::Fleeing,
        State::Inventory,
        State::Map,
        State::WeaponSelect,
        State::CustomAction0,
        State::InActive,
        State::RaiseAlarm,
        State::Casting,
        State::TimedAction,
        State::Worshipping,
        State::Sleeping,
        State::BeingCarried,
        State::HitThrown,
        State::HitLeft,
        State::HitRight,
        State::HitRecover,
        State::Teleporting,
        State::SignPostCounterAttack,
        State::RecoverFromCounterAttack,
        State::Charging,
        State::Vulnerable,
        State::Converting,
        State::Unconverted,
        State::FoundItem,
        State::Dieing,
        State::Dead,
        State::Building,
        State::Respawning,
        State::AwaitRecruit,
        State::PickedUp,
        State::SacrificeRecruit,
        State::Recruited,
        State::Dancing,
        State::SpawnIn,
        State::SpawnOut,
        State::CrowdWorship,
        State::Grapple,
        State::DashAcrossIsland,
        State::ChargingHeavyAttack,
        State::Elevator,
        State::Grabbed,
        State::CustomAnimation,
        State::Preach,
        State::Stealth,
        State::GameOver,
        State::KnockBack,
        State::Aiming,
        State::Meditate,
        State::Resurrecting,
        State::IdleCarryingBody,
        State::MovingCarryingBody,
        State::Heal,
        State::Reeling,
        State::TiedToAltar,
        State::FinalGameOver,
        State::KnockedOut,
        State::CoopReviving,
    ];

    pub fn tag(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for State {
    type Error = CodecError;

    fn try_from(tag: i32) -> Result<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|index| State::ALL.get(index).copied())
            .ok_or(CodecError::InvalidState(tag))
    }
}

/// Snapshot of one player's simulated condition
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerState {
    pub current: State,
    pub facing: f32,
    pub look: f32,
    pub defending: bool,
    pub timer: f32,
    pub position: Point3,
}

impl PlayerState {
    pub fn new(
        current: State,
        facing: f32,
        look: f32,
        defending: bool,
        timer: f32,
        position: Point3,
    ) -> Self {
        Self {
            current,
            facing,
            look,
            defending,
            timer,
            position,
        }
    }

    /// A player standing idle at `position`
    pub fn idle_at(position: Point3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PLAYER_STATE_MIN_LEN + 4 + 16);
        codec::write_u32(&mut out, PLAYER_STATE_MAGIC);
        codec::write_i32(&mut out, self.current.tag());
        codec::write_f32(&mut out, self.facing);
        codec::write_f32(&mut out, self.look);
        codec::write_bool(&mut out, self.defending);
        codec::write_f32(&mut out, self.timer);
        // A 16-byte block is always within the payload limit.
        let position = self.position.encode();
        codec::write_i32(&mut out, position.len() as i32);
        out.extend_from_slice(&position);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < PLAYER_STATE_MIN_LEN {
            return Err(CodecError::TooShort {
                needed: PLAYER_STATE_MIN_LEN,
                actual: data.len(),
            });
        }
        let mut reader = Reader::new(data);
        reader.expect_magic(PLAYER_STATE_MAGIC)?;
        let current = State::try_from(reader.read_i32()?)?;
        let facing = reader.read_f32()?;
        let look = reader.read_f32()?;
        let defending = reader.read_bool()?;
        let timer = reader.read_f32()?;
        let position = Point3::decode(reader.read_prefixed()?.unwrap_or_default())?;
        Ok(Self {
            current,
            facing,
            look,
            defending,
            timer,
            position,
        })
    }
}
