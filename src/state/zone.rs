//! Zone definitions and per-tick membership tracking.
//!
//! The tracker owns the set of active zones and, for every zone, the set of
//! players currently inside it. Each tick it is handed the latest player
//! positions and reports what changed as [`MembershipEvent`]s. Within one
//! tick all `Enter` events come before any `Exit` event, so a player moving
//! directly between two overlapping zones is never briefly in no zone.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PlayerId, ZoneId};
use crate::world::Vec3;

/// Geometric extent of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneShape {
    Circle { center: Vec3, radius: f32 },
    Box { center: Vec3, half_extents: Vec3 },
}

impl ZoneShape {
    pub fn center(&self) -> Vec3 {
        match self {
            Self::Circle { center, .. } | Self::Box { center, .. } => *center,
        }
    }

    /// Point-in-shape test. Boundary points are inside.
    pub fn contains(&self, point: &Vec3) -> bool {
        match self {
            Self::Circle { center, radius } => center.distance(point) <= *radius,
            Self::Box {
                center,
                half_extents,
            } => {
                (point.x - center.x).abs() <= half_extents.x
                    && (point.y - center.y).abs() <= half_extents.y
                    && (point.z - center.z).abs() <= half_extents.z
            }
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        match self {
            Self::Circle { radius, .. } if !positive(*radius) => Err("radius must be positive"),
            Self::Box { half_extents, .. }
                if !(positive(half_extents.x)
                    && positive(half_extents.y)
                    && positive(half_extents.z)) =>
            {
                Err("box extents must be positive")
            }
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Circle { .. } => "circle",
            Self::Box { .. } => "box",
        }
    }
}

impl fmt::Display for ZoneShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Circle { center, radius } => write!(f, "circle at {} r={:.1}", center, radius),
            Self::Box {
                center,
                half_extents,
            } => write!(f, "box at {} half={}", center, half_extents),
        }
    }
}

/// A named zone. Immutable once activated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub id: ZoneId,
    pub name: String,
    pub shape: ZoneShape,
}

impl ZoneDefinition {
    /// Validated constructor.
    pub fn new(
        id: impl Into<ZoneId>,
        name: impl Into<String>,
        shape: ZoneShape,
    ) -> Result<Self, ZoneError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ZoneError::InvalidShape {
                zone_id: id,
                reason: "zone id must not be empty",
            });
        }
        shape.validate().map_err(|reason| ZoneError::InvalidShape {
            zone_id: id.clone(),
            reason,
        })?;
        Ok(Self {
            id,
            name: name.into(),
            shape,
        })
    }

    /// Circle zone named after its id.
    pub fn circle(id: impl Into<ZoneId>, center: Vec3, radius: f32) -> Result<Self, ZoneError> {
        let id = id.into();
        Self::new(id.clone(), id, ZoneShape::Circle { center, radius })
    }

    /// Box zone named after its id.
    pub fn cuboid(
        id: impl Into<ZoneId>,
        center: Vec3,
        half_extents: Vec3,
    ) -> Result<Self, ZoneError> {
        let id = id.into();
        Self::new(
            id.clone(),
            id,
            ZoneShape::Box {
                center,
                half_extents,
            },
        )
    }

    pub fn contains(&self, point: &Vec3) -> bool {
        self.shape.contains(point)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "id": self.id,
            "name": self.name,
            "shape": self.shape.kind(),
            "center": self.shape.center(),
        });
        match self.shape {
            ZoneShape::Circle { radius, .. } => obj["radius"] = serde_json::json!(radius),
            ZoneShape::Box { half_extents, .. } => {
                obj["half_extents"] = serde_json::json!(half_extents)
            }
        }
        obj
    }
}

/// Zone errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneError {
    InvalidShape {
        zone_id: ZoneId,
        reason: &'static str,
    },
    AlreadyActive(ZoneId),
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidShape { zone_id, reason } => {
                write!(f, "Invalid zone '{}': {}", zone_id, reason)
            }
            Self::AlreadyActive(zone_id) => write!(f, "Zone '{}' is already active", zone_id),
        }
    }
}

impl std::error::Error for ZoneError {}

/// Players currently inside one zone.
#[derive(Debug, Clone)]
pub struct ZoneMembershipState {
    members: BTreeSet<PlayerId>,
    pub created_at: DateTime<Utc>,
}

impl ZoneMembershipState {
    fn new() -> Self {
        Self {
            members: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.members.contains(&player_id)
    }

    pub fn members(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.members.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A membership change detected during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Enter { player_id: PlayerId, zone_id: ZoneId },
    Exit { player_id: PlayerId, zone_id: ZoneId },
}

impl MembershipEvent {
    pub fn player_id(&self) -> PlayerId {
        match self {
            Self::Enter { player_id, .. } | Self::Exit { player_id, .. } => *player_id,
        }
    }

    pub fn zone_id(&self) -> &str {
        match self {
            Self::Enter { zone_id, .. } | Self::Exit { zone_id, .. } => zone_id,
        }
    }

    pub fn is_enter(&self) -> bool {
        matches!(self, Self::Enter { .. })
    }
}

impl fmt::Display for MembershipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter { player_id, zone_id } => write!(f, "Enter({}, {})", player_id, zone_id),
            Self::Exit { player_id, zone_id } => write!(f, "Exit({}, {})", player_id, zone_id),
        }
    }
}

/// Active zones and their members.
#[derive(Debug, Default)]
pub struct ZoneMembershipTracker {
    zones: BTreeMap<ZoneId, ZoneDefinition>,
    membership: BTreeMap<ZoneId, ZoneMembershipState>,
    /// player_id → zones the player is in
    player_index: BTreeMap<PlayerId, BTreeSet<ZoneId>>,
}

impl ZoneMembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a zone with no members.
    pub fn add_zone(&mut self, definition: ZoneDefinition) -> Result<(), ZoneError> {
        if self.zones.contains_key(&definition.id) {
            return Err(ZoneError::AlreadyActive(definition.id));
        }
        let zone_id = definition.id.clone();
        self.membership
            .insert(zone_id.clone(), ZoneMembershipState::new());
        self.zones.insert(zone_id, definition);
        Ok(())
    }

    /// Stop tracking a zone. Members are dropped without exit events.
    pub fn remove_zone(&mut self, zone_id: &str) -> Option<(ZoneDefinition, ZoneMembershipState)> {
        let definition = self.zones.remove(zone_id)?;
        let state = self
            .membership
            .remove(zone_id)
            .unwrap_or_else(ZoneMembershipState::new);

        for player_id in state.members() {
            if let Some(zones) = self.player_index.get_mut(&player_id) {
                zones.remove(zone_id);
                if zones.is_empty() {
                    self.player_index.remove(&player_id);
                }
            }
        }
        Some((definition, state))
    }

    pub fn definition(&self, zone_id: &str) -> Option<&ZoneDefinition> {
        self.zones.get(zone_id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ZoneDefinition> {
        self.zones.values()
    }

    /// All zones containing a position.
    pub fn zones_containing(&self, position: &Vec3) -> BTreeSet<ZoneId> {
        self.zones
            .values()
            .filter(|z| z.contains(position))
            .map(|z| z.id.clone())
            .collect()
    }

    /// First zone (by id) containing a position.
    pub fn zone_containing(&self, position: &Vec3) -> Option<ZoneId> {
        self.zones
            .values()
            .find(|z| z.contains(position))
            .map(|z| z.id.clone())
    }

    /// Membership query. Unknown zones report "not a member".
    pub fn is_member(&self, player_id: PlayerId, zone_id: &str) -> bool {
        self.membership
            .get(zone_id)
            .map(|m| m.contains(player_id))
            .unwrap_or(false)
    }

    pub fn member_count(&self, zone_id: &str) -> usize {
        self.membership.get(zone_id).map(|m| m.len()).unwrap_or(0)
    }

    pub fn members(&self, zone_id: &str) -> Vec<PlayerId> {
        self.membership
            .get(zone_id)
            .map(|m| m.members().collect())
            .unwrap_or_default()
    }

    /// Zones a player is currently in.
    pub fn zones_of(&self, player_id: PlayerId) -> BTreeSet<ZoneId> {
        self.player_index
            .get(&player_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Update membership for a batch of player positions.
    ///
    /// `None` positions (vanished objects) count as outside every zone.
    /// Returns all `Enter` events followed by all `Exit` events.
    pub fn tick<I>(&mut self, positions: I) -> Vec<MembershipEvent>
    where
        I: IntoIterator<Item = (PlayerId, Option<Vec3>)>,
    {
        let mut enters = Vec::new();
        let mut exits = Vec::new();

        for (player_id, position) in positions {
            let (entered, left) = self.update_player(player_id, position);
            enters.extend(entered);
            exits.extend(left);
        }

        enters.extend(exits);
        enters
    }

    fn update_player(
        &mut self,
        player_id: PlayerId,
        position: Option<Vec3>,
    ) -> (Vec<MembershipEvent>, Vec<MembershipEvent>) {
        let now = match position {
            Some(p) => self.zones_containing(&p),
            None => BTreeSet::new(),
        };
        let before = self.zones_of(player_id);

        let entered: Vec<MembershipEvent> = now
            .difference(&before)
            .map(|zone_id| MembershipEvent::Enter {
                player_id,
                zone_id: zone_id.clone(),
            })
            .collect();
        let left: Vec<MembershipEvent> = before
            .difference(&now)
            .map(|zone_id| MembershipEvent::Exit {
                player_id,
                zone_id: zone_id.clone(),
            })
            .collect();

        for event in entered.iter().chain(left.iter()) {
            debug!(player = player_id, zone = %event.zone_id(), enter = event.is_enter(), "membership changed");
        }

        for zone_id in &now {
            if let Some(m) = self.membership.get_mut(zone_id) {
                m.members.insert(player_id);
            }
        }
        for zone_id in before.difference(&now) {
            if let Some(m) = self.membership.get_mut(zone_id) {
                m.members.remove(&player_id);
            }
        }

        if now.is_empty() {
            self.player_index.remove(&player_id);
        } else {
            self.player_index.insert(player_id, now);
        }

        (entered, left)
    }

    /// Drop a player from every zone without emitting events.
    pub fn remove_player(&mut self, player_id: PlayerId) -> BTreeSet<ZoneId> {
        let zones = self.player_index.remove(&player_id).unwrap_or_default();
        for zone_id in &zones {
            if let Some(m) = self.membership.get_mut(zone_id) {
                m.members.remove(&player_id);
            }
        }
        zones
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn arena() -> ZoneDefinition {
        ZoneDefinition::circle("arena", Vec3::new(-1000.0, 5.0, -500.0), 50.0).unwrap()
    }

    #[test]
    fn test_circle_membership_scenario() {
        let mut tracker = ZoneMembershipTracker::new();
        tracker.add_zone(arena()).unwrap();

        assert_eq!(
            tracker.zone_containing(&Vec3::new(-1000.0, 5.0, -520.0)),
            Some("arena".to_string())
        );
        assert_eq!(tracker.zone_containing(&Vec3::new(-1000.0, 5.0, -440.0)), None);
    }

    #[test]
    fn test_box_membership() {
        let zone = ZoneDefinition::cuboid("pit", Vec3::ZERO, Vec3::new(10.0, 2.0, 5.0)).unwrap();
        assert!(zone.contains(&Vec3::new(10.0, -2.0, 5.0)));
        assert!(!zone.contains(&Vec3::new(10.0, 2.5, 0.0)));
        assert!(!zone.contains(&Vec3::new(0.0, 0.0, -5.1)));
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        assert!(matches!(
            ZoneDefinition::circle("a", Vec3::ZERO, 0.0),
            Err(ZoneError::InvalidShape { .. })
        ));
        assert!(ZoneDefinition::circle("a", Vec3::ZERO, f32::NAN).is_err());
        assert!(ZoneDefinition::cuboid("b", Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0)).is_err());
        assert!(ZoneDefinition::circle(" ", Vec3::ZERO, 1.0).is_err());
    }

    #[test]
    fn test_duplicate_zone() {
        let mut tracker = ZoneMembershipTracker::new();
        tracker.add_zone(arena()).unwrap();
        assert_eq!(
            tracker.add_zone(arena()),
            Err(ZoneError::AlreadyActive("arena".to_string()))
        );
    }

    #[test]
    fn test_tick_enter_and_exit() {
        let mut tracker = ZoneMembershipTracker::new();
        tracker.add_zone(arena()).unwrap();
        let inside = Vec3::new(-1000.0, 5.0, -500.0);

        let events = tracker.tick([(1, Some(inside))]);
        assert_eq!(
            events,
            vec![MembershipEvent::Enter {
                player_id: 1,
                zone_id: "arena".to_string()
            }]
        );
        assert!(tracker.is_member(1, "arena"));

        // No change, no events
        assert!(tracker.tick([(1, Some(inside))]).is_empty());

        let events = tracker.tick([(1, None)]);
        assert_eq!(
            events,
            vec![MembershipEvent::Exit {
                player_id: 1,
                zone_id: "arena".to_string()
            }]
        );
        assert!(!tracker.is_member(1, "arena"));
        assert!(tracker.zones_of(1).is_empty());
    }

    #[test]
    fn test_enter_events_precede_exit_events() {
        let mut tracker = ZoneMembershipTracker::new();
        tracker
            .add_zone(ZoneDefinition::circle("a", Vec3::ZERO, 10.0).unwrap())
            .unwrap();
        tracker
            .add_zone(ZoneDefinition::circle("b", Vec3::new(100.0, 0.0, 0.0), 10.0).unwrap())
            .unwrap();

        tracker.tick([(1, Some(Vec3::ZERO)), (2, Some(Vec3::new(100.0, 0.0, 0.0)))]);

        // Both players teleport to the other zone in the same tick.
        let events = tracker.tick([
            (1, Some(Vec3::new(100.0, 0.0, 0.0))),
            (2, Some(Vec3::ZERO)),
        ]);
        let kinds: Vec<bool> = events.iter().map(|e| e.is_enter()).collect();
        assert_eq!(kinds, vec![true, true, false, false]);
        assert_eq!(tracker.members("a"), vec![2]);
        assert_eq!(tracker.members("b"), vec![1]);
    }

    #[test]
    fn test_unknown_zone_is_not_member() {
        let tracker = ZoneMembershipTracker::new();
        assert!(!tracker.is_member(1, "missing"));
        assert_eq!(tracker.member_count("missing"), 0);
        assert!(tracker.members("missing").is_empty());
    }

    #[test]
    fn test_remove_zone_drops_members_silently() {
        let mut tracker = ZoneMembershipTracker::new();
        tracker.add_zone(arena()).unwrap();
        tracker.tick([(7, Some(Vec3::new(-1000.0, 5.0, -500.0)))]);

        let (definition, state) = tracker.remove_zone("arena").unwrap();
        assert_eq!(definition.id, "arena");
        assert_eq!(state.members().collect::<Vec<_>>(), vec![7]);
        assert!(tracker.zones_of(7).is_empty());
        assert!(!tracker.is_member(7, "arena"));
        assert!(tracker.remove_zone("arena").is_none());
    }

    #[test]
    fn test_remove_player() {
        let mut tracker = ZoneMembershipTracker::new();
        tracker.add_zone(arena()).unwrap();
        tracker.tick([(3, Some(Vec3::new(-1000.0, 5.0, -500.0)))]);

        let zones = tracker.remove_player(3);
        assert!(zones.contains("arena"));
        assert_eq!(tracker.member_count("arena"), 0);
    }

    #[test]
    fn test_zone_json() {
        let json = arena().to_json();
        assert_eq!(json["shape"], "circle");
        assert_eq!(json["radius"], 50.0);
        assert_eq!(json["center"]["x"], -1000.0);
    }

    proptest! {
        #[test]
        fn circle_containment_matches_distance(
            x in -200.0f32..200.0,
            y in -200.0f32..200.0,
            z in -200.0f32..200.0,
            radius in 1.0f32..150.0,
        ) {
            let zone = ZoneDefinition::circle("c", Vec3::ZERO, radius).unwrap();
            let point = Vec3::new(x, y, z);
            prop_assert_eq!(zone.contains(&point), Vec3::ZERO.distance(&point) <= radius);
        }

        #[test]
        fn box_containment_matches_axes(
            x in -50.0f32..50.0,
            y in -50.0f32..50.0,
            z in -50.0f32..50.0,
            hx in 1.0f32..40.0,
            hy in 1.0f32..40.0,
            hz in 1.0f32..40.0,
        ) {
            let center = Vec3::new(3.0, -2.0, 1.0);
            let zone = ZoneDefinition::cuboid("b", center, Vec3::new(hx, hy, hz)).unwrap();
            let point = Vec3::new(x, y, z);
            let expected = (x - center.x).abs() <= hx
                && (y - center.y).abs() <= hy
                && (z - center.z).abs() <= hz;
            prop_assert_eq!(zone.contains(&point), expected);
        }

        #[test]
        fn tracker_agrees_with_shape(x in -100.0f32..100.0, z in -100.0f32..100.0) {
            let mut tracker = ZoneMembershipTracker::new();
            let zone = ZoneDefinition::circle("c", Vec3::ZERO, 40.0).unwrap();
            let expected = zone.contains(&Vec3::new(x, 0.0, z));
            tracker.add_zone(zone).unwrap();
            tracker.tick([(1, Some(Vec3::new(x, 0.0, z)))]);
            prop_assert_eq!(tracker.is_member(1, "c"), expected);
        }
    }
}
