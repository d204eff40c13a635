// status.rs: packed network status ("netstat") byte

use std::fmt;

/// A participant of the ground-station network whose liveness the
/// server reports in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Participant {
    GuiClient,
    RoofUhf,
    RoofXband,
    Haystack,
    Track,
}

impl Participant {
    pub const ALL: [Participant; 5] = [
        Participant::GuiClient,
        Participant::RoofUhf,
        Participant::RoofXband,
        Participant::Haystack,
        Participant::Track,
    ];

    pub const fn mask(self) -> u8 {
        match self {
            Participant::GuiClient => 0x80,
            Participant::RoofUhf => 0x40,
            Participant::RoofXband => 0x20,
            Participant::Haystack => 0x10,
            Participant::Track => 0x08,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Participant::GuiClient => "GUI",
            Participant::RoofUhf => "UHF",
            Participant::RoofXband => "XBAND",
            Participant::Haystack => "HAYSTACK",
            Participant::Track => "TRACK",
        }
    }
}

/// Bits 7..3 are the five participants; bits 2..0 are reserved and are
/// carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusByte(u8);

impl StatusByte {
    pub const EMPTY: StatusByte = StatusByte(0);

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_online(self, p: Participant) -> bool {
        self.0 & p.mask() != 0
    }

    #[must_use]
    pub const fn with(self, p: Participant, online: bool) -> Self {
        if online {
            Self(self.0 | p.mask())
        } else {
            Self(self.0 & !p.mask())
        }
    }
}

impl From<u8> for StatusByte {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StatusByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in Participant::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let state = if self.is_online(*p) { "ONLINE" } else { "OFFLINE" };
            write!(f, "{}={}", p.label(), state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roof_uhf_alone_is_0x40() {
        let s = StatusByte::EMPTY
            .with(Participant::GuiClient, false)
            .with(Participant::RoofUhf, true)
            .with(Participant::RoofXband, false)
            .with(Participant::Haystack, false)
            .with(Participant::Track, false);
        assert_eq!(s.raw(), 0x40);
    }

    #[test]
    fn f8_reports_everyone_online() {
        let s = StatusByte::from_raw(0xF8);
        for p in Participant::ALL {
            assert!(s.is_online(p), "{p:?} should be online");
        }
    }

    #[test]
    fn reserved_bits_pass_through() {
        let s = StatusByte::from_raw(0x05).with(Participant::Track, true);
        assert_eq!(s.raw(), 0x0D);
        assert_eq!(s.with(Participant::Track, false).raw(), 0x05);
    }

    #[test]
    fn display_lists_every_participant() {
        let s = StatusByte::from_raw(0xC0);
        assert_eq!(
            s.to_string(),
            "GUI=ONLINE UHF=ONLINE XBAND=OFFLINE HAYSTACK=OFFLINE TRACK=OFFLINE"
        );
    }
}
