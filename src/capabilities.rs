use crate::error::{AppError, AppResult};
use crate::models::MessageType;

/// Maps each message type (and calling) to the minimum match level that
/// unlocks it. Levels are 1..=max_level; level 1 is text-only, level 2 adds
/// photo sharing, level 3 adds voice messages and calls, higher levels are
/// reserved for future unlocks.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    pub text_min_level: i32,
    pub sticker_min_level: i32,
    pub gif_min_level: i32,
    pub photo_min_level: i32,
    pub location_min_level: i32,
    pub voice_min_level: i32,
    pub call_min_level: i32,
    pub max_level: i32,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self {
            text_min_level: 1,
            sticker_min_level: 1,
            gif_min_level: 1,
            photo_min_level: 2,
            location_min_level: 2,
            voice_min_level: 3,
            call_min_level: 3,
            max_level: 4,
        }
    }
}

impl CapabilityTable {
    pub fn with_max_level(max_level: i32) -> Self {
        Self {
            max_level,
            ..Self::default()
        }
    }

    pub fn min_level(&self, ty: MessageType) -> i32 {
        match ty {
            MessageType::Text => self.text_min_level,
            MessageType::Sticker => self.sticker_min_level,
            MessageType::Gif => self.gif_min_level,
            MessageType::Photo => self.photo_min_level,
            MessageType::Location => self.location_min_level,
            MessageType::Voice => self.voice_min_level,
        }
    }

    pub fn can_send(&self, level: i32, ty: MessageType) -> bool {
        level >= self.min_level(ty)
    }

    pub fn can_call(&self, level: i32) -> bool {
        level >= self.call_min_level
    }

    /// Gate a send request. The rejection is permanent until the match level
    /// advances; it carries the required level so the UI can say why.
    pub fn check_send(&self, level: i32, ty: MessageType) -> AppResult<()> {
        let required = self.min_level(ty);
        if level >= required {
            Ok(())
        } else {
            Err(AppError::CapabilityDenied { required, level })
        }
    }

    pub fn check_call(&self, level: i32) -> AppResult<()> {
        if self.can_call(level) {
            Ok(())
        } else {
            Err(AppError::CapabilityDenied {
                required: self.call_min_level,
                level,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_one_is_text_only() {
        let table = CapabilityTable::default();
        assert!(table.can_send(1, MessageType::Text));
        assert!(table.can_send(1, MessageType::Sticker));
        assert!(table.can_send(1, MessageType::Gif));
        assert!(!table.can_send(1, MessageType::Photo));
        assert!(!table.can_send(1, MessageType::Voice));
        assert!(!table.can_call(1));
    }

    #[test]
    fn level_two_adds_photo_and_location() {
        let table = CapabilityTable::default();
        assert!(table.can_send(2, MessageType::Photo));
        assert!(table.can_send(2, MessageType::Location));
        assert!(!table.can_send(2, MessageType::Voice));
        assert!(!table.can_call(2));
    }

    #[test]
    fn level_three_adds_voice_and_calls() {
        let table = CapabilityTable::default();
        assert!(table.can_send(3, MessageType::Voice));
        assert!(table.can_call(3));
    }

    #[test]
    fn denial_names_the_required_level() {
        let table = CapabilityTable::default();
        match table.check_send(1, MessageType::Voice) {
            Err(AppError::CapabilityDenied { required, level }) => {
                assert_eq!(required, 3);
                assert_eq!(level, 1);
            }
            other => panic!("expected CapabilityDenied, got {other:?}"),
        }
        match table.check_call(2) {
            Err(AppError::CapabilityDenied { required, level }) => {
                assert_eq!(required, 3);
                assert_eq!(level, 2);
            }
            other => panic!("expected CapabilityDenied, got {other:?}"),
        }
    }
}
