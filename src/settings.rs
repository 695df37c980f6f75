//! Lobby settings record (C2): a fixed 21-slot heterogeneous tuple carried
//! over the wire as a single `SFS_ARRAY`.
//!
//! The positional schema is fixed by spec.md §3; nothing here reorders or
//! widens a slot's type. Team/handicap assignments key on a player's
//! canonical string form ([`crate::identity::PlayerId::canonical`]) rather
//! than a structured key, matching the wire shape the client expects.

use crate::codec::{SfsObject, TypedValue};
use crate::error::SettingsError;

/// Number of fixed positional slots in the settings tuple.
pub const SETTINGS_SLOT_COUNT: usize = 21;

/// Length of the game-options flag array (slot 18).
pub const GAME_OPTIONS_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct LobbySettings {
    pub display_name: String,
    pub kind_of_lobby: i8,
    pub version_key: i16,
    pub game_setup: i16,
    pub rules_set: i16,
    pub replay: bool,
    pub location: i16,
    pub human_hq_invalid: Vec<bool>,
    pub ai_fill: bool,
    pub map_size: i8,
    pub terrain: i16,
    pub speed: i8,
    pub map_name: String,
    pub seed: i32,
    pub latitude: i16,
    pub resource_min: i8,
    pub resource_presence: i8,
    pub colony_class: i16,
    pub game_options: Vec<bool>,
    /// Keyed by a player's canonical string form; value is the team index.
    pub team_assignments: Vec<(String, i16)>,
    /// Keyed by a player's canonical string form; value is the handicap.
    pub handicap_assignments: Vec<(String, i16)>,
}

impl LobbySettings {
    /// A minimal settings record suitable for tests and for `createRoom`
    /// requests that don't specify every field, carrying the given display
    /// name and otherwise-empty/zeroed slots.
    pub fn defaults(display_name: impl Into<String>) -> Self {
        LobbySettings {
            display_name: display_name.into(),
            kind_of_lobby: 0,
            version_key: 0,
            game_setup: 0,
            rules_set: 0,
            replay: false,
            location: 0,
            human_hq_invalid: Vec::new(),
            ai_fill: false,
            map_size: 0,
            terrain: 0,
            speed: 0,
            map_name: String::new(),
            seed: 0,
            latitude: 0,
            resource_min: 0,
            resource_presence: 0,
            colony_class: 0,
            game_options: vec![false; GAME_OPTIONS_LEN],
            team_assignments: Vec::new(),
            handicap_assignments: Vec::new(),
        }
    }

    /// Serializes to the wire-level 21-element `SFS_ARRAY`.
    pub fn to_tuple(&self) -> TypedValue {
        let mut team = SfsObject::new();
        for (player, team_idx) in &self.team_assignments {
            team.insert(player.clone(), TypedValue::Short(*team_idx));
        }

        let mut handicap = SfsObject::new();
        for (player, value) in &self.handicap_assignments {
            handicap.insert(player.clone(), TypedValue::Short(*value));
        }

        TypedValue::SfsArray(vec![
            TypedValue::Utf(self.display_name.clone()),
            TypedValue::Byte(self.kind_of_lobby),
            TypedValue::Short(self.version_key),
            TypedValue::Short(self.game_setup),
            TypedValue::Short(self.rules_set),
            TypedValue::Bool(self.replay),
            TypedValue::Short(self.location),
            TypedValue::BoolArray(self.human_hq_invalid.clone()),
            TypedValue::Bool(self.ai_fill),
            TypedValue::Byte(self.map_size),
            TypedValue::Short(self.terrain),
            TypedValue::Byte(self.speed),
            TypedValue::Utf(self.map_name.clone()),
            TypedValue::Int(self.seed),
            TypedValue::Short(self.latitude),
            TypedValue::Byte(self.resource_min),
            TypedValue::Byte(self.resource_presence),
            TypedValue::Short(self.colony_class),
            TypedValue::BoolArray(self.game_options.clone()),
            TypedValue::SfsObject(team),
            TypedValue::SfsObject(handicap),
        ])
    }

    /// Parses a wire-level `SFS_ARRAY` back into a settings record. Fails
    /// with [`SettingsError::WrongLength`] if the array isn't exactly
    /// [`SETTINGS_SLOT_COUNT`] elements, or [`SettingsError::SlotTypeMismatch`]
    /// if any positional slot has the wrong tag.
    pub fn from_tuple(value: &TypedValue) -> Result<Self, SettingsError> {
        let slots = match value {
            TypedValue::SfsArray(items) => items,
            _ => return Err(SettingsError::WrongLength(0)),
        };

        if slots.len() != SETTINGS_SLOT_COUNT {
            return Err(SettingsError::WrongLength(slots.len()));
        }

        let slot_str = |idx: usize| -> Result<String, SettingsError> {
            slots[idx]
                .as_str()
                .map(str::to_string)
                .map_err(|_| slot_mismatch(idx, "UTF_STRING", slots[idx].type_name()))
        };
        let slot_byte = |idx: usize| -> Result<i8, SettingsError> {
            slots[idx]
                .as_byte()
                .map_err(|_| slot_mismatch(idx, "BYTE", slots[idx].type_name()))
        };
        let slot_short = |idx: usize| -> Result<i16, SettingsError> {
            slots[idx]
                .as_short()
                .map_err(|_| slot_mismatch(idx, "SHORT", slots[idx].type_name()))
        };
        let slot_bool = |idx: usize| -> Result<bool, SettingsError> {
            slots[idx]
                .as_bool()
                .map_err(|_| slot_mismatch(idx, "BOOL", slots[idx].type_name()))
        };
        let slot_bool_array = |idx: usize| -> Result<Vec<bool>, SettingsError> {
            slots[idx]
                .as_bool_array()
                .map_err(|_| slot_mismatch(idx, "BOOL_ARRAY", slots[idx].type_name()))
        };
        let slot_int = |idx: usize| -> Result<i32, SettingsError> {
            slots[idx]
                .as_int()
                .map_err(|_| slot_mismatch(idx, "INT", slots[idx].type_name()))
        };
        let slot_object = |idx: usize| -> Result<Vec<(String, i16)>, SettingsError> {
            let obj = slots[idx]
                .as_object()
                .map_err(|_| slot_mismatch(idx, "SFS_OBJECT", slots[idx].type_name()))?;
            obj.iter()
                .map(|(key, value)| {
                    value
                        .as_short()
                        .map(|short| (key.to_string(), short))
                        .map_err(|_| slot_mismatch(idx, "SFS_OBJECT<SHORT>", value.type_name()))
                })
                .collect()
        };

        Ok(LobbySettings {
            display_name: slot_str(0)?,
            kind_of_lobby: slot_byte(1)?,
            version_key: slot_short(2)?,
            game_setup: slot_short(3)?,
            rules_set: slot_short(4)?,
            replay: slot_bool(5)?,
            location: slot_short(6)?,
            human_hq_invalid: slot_bool_array(7)?,
            ai_fill: slot_bool(8)?,
            map_size: slot_byte(9)?,
            terrain: slot_short(10)?,
            speed: slot_byte(11)?,
            map_name: slot_str(12)?,
            seed: slot_int(13)?,
            latitude: slot_short(14)?,
            resource_min: slot_byte(15)?,
            resource_presence: slot_byte(16)?,
            colony_class: slot_short(17)?,
            game_options: slot_bool_array(18)?,
            team_assignments: slot_object(19)?,
            handicap_assignments: slot_object(20)?,
        })
    }
}

fn slot_mismatch(slot: usize, expected: &'static str, found: &'static str) -> SettingsError {
    SettingsError::SlotTypeMismatch {
        slot,
        expected,
        found,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_defaults() {
        let settings = LobbySettings::defaults("Test Lobby");
        let tuple = settings.to_tuple();
        let decoded = LobbySettings::from_tuple(&tuple).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn roundtrip_with_assignments() {
        let mut settings = LobbySettings::defaults("Scenario Alpha");
        settings.team_assignments.push(("steam:1001".into(), 0));
        settings.team_assignments.push(("steam:1002".into(), 1));
        settings.handicap_assignments.push(("steam:1001".into(), 50));

        let tuple = settings.to_tuple();
        let decoded = LobbySettings::from_tuple(&tuple).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn tuple_has_exactly_21_slots_and_game_options_length() {
        let settings = LobbySettings::defaults("Test Lobby");
        let tuple = settings.to_tuple();
        let slots = tuple.as_array().unwrap();
        assert_eq!(slots.len(), SETTINGS_SLOT_COUNT);
        assert_eq!(slots[0].as_str().unwrap(), "Test Lobby");
        assert_eq!(slots[18].as_bool_array().unwrap().len(), GAME_OPTIONS_LEN);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short_array = TypedValue::SfsArray(vec![TypedValue::Int(0); 5]);
        let err = LobbySettings::from_tuple(&short_array).unwrap_err();
        assert!(matches!(err, SettingsError::WrongLength(5)));
    }

    #[test]
    fn slot_type_mismatch_is_rejected() {
        let mut settings = LobbySettings::defaults("Test Lobby").to_tuple();
        if let TypedValue::SfsArray(slots) = &mut settings {
            slots[0] = TypedValue::Int(5); // display name should be a string
        }
        let err = LobbySettings::from_tuple(&settings).unwrap_err();
        match err {
            SettingsError::SlotTypeMismatch { slot, .. } => assert_eq!(slot, 0),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
