//! SETTINGS frame payload: raw (identifier, value) pairs as they appear on
//! the wire, plus the typed [`Settings`] table the connection state machine
//! negotiates from them.

use crate::error::Error;
use crate::types::{ErrorCode, SettingsParameter};
use enum_map::EnumMap;
use num_traits::FromPrimitive;

/// One raw SETTINGS parameter as parsed off the wire. Unknown identifiers
/// are kept here (rather than dropped at decode time) so the connection
/// layer can silently ignore them per RFC 7540 §6.5.2, exactly as it would
/// any other unrecognized extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub identifier: u16,
    pub value: u32,
}

/// A fully-typed settings table, used for both "what we advertised" and
/// "what the peer advertised". Values not yet seen hold the RFC 7540 §11.3
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    table: EnumMap<SettingsParameter, u32>,
}

impl Settings {
    #[must_use]
    pub fn defaults() -> Self {
        let mut table = EnumMap::default();
        table[SettingsParameter::HeaderTableSize] = 4096;
        table[SettingsParameter::EnablePush] = 1;
        table[SettingsParameter::MaxConcurrentStreams] = u32::MAX;
        table[SettingsParameter::InitialWindowSize] = 65_535;
        table[SettingsParameter::MaxFrameSize] = 16_384;
        table[SettingsParameter::MaxHeaderListSize] = u32::MAX;
        Self { table }
    }

    /// The local defaults this crate advertises at connection open, built
    /// from the caller-supplied [`crate::limits::Config`] rather than fixed
    /// constants, so a caller that overrides e.g. `max_frame_size` actually
    /// sees it reflected in the opening SETTINGS frame.
    #[must_use]
    pub fn local_defaults(config: &crate::limits::Config) -> Self {
        let mut settings = Self::defaults();
        settings.table[SettingsParameter::EnablePush] = 0;
        settings.table[SettingsParameter::HeaderTableSize] = config.header_table_size;
        settings.table[SettingsParameter::MaxConcurrentStreams] = config.max_concurrent_streams;
        settings.table[SettingsParameter::InitialWindowSize] = config.initial_window_size;
        settings.table[SettingsParameter::MaxFrameSize] = config.max_frame_size;
        settings.table[SettingsParameter::MaxHeaderListSize] = config.max_header_list_size;
        settings
    }

    #[must_use]
    pub fn get(&self, param: SettingsParameter) -> u32 {
        self.table[param]
    }

    pub fn set(&mut self, param: SettingsParameter, value: u32) {
        self.table[param] = value;
    }

    /// Apply one wire update, validating its value per RFC 7540 §6.5.2.
    /// Unknown identifiers are silently ignored, never an error.
    pub fn apply(&mut self, update: SettingsUpdate) -> Result<(), Error> {
        let Some(param) = SettingsParameter::from_u16(update.identifier) else {
            return Ok(());
        };
        match param {
            SettingsParameter::EnablePush => {
                if update.value > 1 {
                    return Err(Error::protocol(
                        ErrorCode::ProtocolError,
                        "SETTINGS_ENABLE_PUSH must be 0 or 1",
                    ));
                }
            }
            SettingsParameter::MaxFrameSize => {
                if !(16_384..=16_777_215).contains(&update.value) {
                    return Err(Error::protocol(
                        ErrorCode::ProtocolError,
                        "SETTINGS_MAX_FRAME_SIZE out of range",
                    ));
                }
            }
            SettingsParameter::InitialWindowSize => {
                if update.value > crate::types::U31_MAX {
                    return Err(Error::protocol(
                        ErrorCode::FlowControlError,
                        "SETTINGS_INITIAL_WINDOW_SIZE exceeds 2^31-1",
                    ));
                }
            }
            SettingsParameter::HeaderTableSize
            | SettingsParameter::MaxConcurrentStreams
            | SettingsParameter::MaxHeaderListSize => {}
        }
        self.table[param] = update.value;
        Ok(())
    }

    /// Produce the wire updates needed to advertise `self` relative to the
    /// RFC defaults, suitable for the opening SETTINGS frame.
    #[must_use]
    pub fn to_wire_updates(&self) -> Vec<SettingsUpdate> {
        use SettingsParameter::*;
        [
            HeaderTableSize,
            EnablePush,
            MaxConcurrentStreams,
            InitialWindowSize,
            MaxFrameSize,
            MaxHeaderListSize,
        ]
        .into_iter()
        .map(|param| SettingsUpdate {
            identifier: param as u16,
            value: self.table[param],
        })
        .collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identifier_is_ignored() {
        let mut settings = Settings::defaults();
        settings.apply(SettingsUpdate {
            identifier: 0xFF,
            value: 42,
        }).unwrap();
    }

    #[test]
    fn enable_push_out_of_range_is_protocol_error() {
        let mut settings = Settings::defaults();
        let err = settings
            .apply(SettingsUpdate {
                identifier: SettingsParameter::EnablePush as u16,
                value: 2,
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn initial_window_size_over_max_is_flow_control_error() {
        let mut settings = Settings::defaults();
        let err = settings
            .apply(SettingsUpdate {
                identifier: SettingsParameter::InitialWindowSize as u16,
                value: 1 << 31,
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FlowControlError));
    }
}
