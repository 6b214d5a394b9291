// SPDX-License-Identifier: AGPL-3.0-only

//! Handshake channels and sentinels.
//!
//! All channels share one start-flag word and one finish-flag word (see
//! [`crate::map`]); a channel is identified purely by the 64-bit sentinel
//! value. Start sentinels live in the low half, finish sentinels in the high
//! half with the nibbles swapped, so no start value can ever equal a finish
//! value.

/// One logical CPU ↔ thermal-top transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// CPU runs inference on the stored sensor records.
    Compute,
    /// CPU reconstructs and stores sensor records.
    StoreSensor,
    /// CPU reads back the prediction buffer.
    StorePrediction,
    /// CPU reads back the scheduler action.
    StoreAction,
}

impl Channel {
    /// All channels in counter order.
    pub const ALL: [Self; 4] = [
        Self::Compute,
        Self::StoreSensor,
        Self::StorePrediction,
        Self::StoreAction,
    ];

    /// Sentinel the thermal top writes to the start flag.
    #[must_use]
    pub const fn start_sentinel(self) -> u64 {
        match self {
            Self::Compute => 0x0000_0000_A5A5_A5A5,
            Self::StoreSensor => 0x0000_0000_B1B1_B1B1,
            Self::StorePrediction => 0x0000_0000_C2C2_C2C2,
            Self::StoreAction => 0x0000_0000_D3D3_D3D3,
        }
    }

    /// Sentinel the CPU writes to the finish flag.
    #[must_use]
    pub const fn finish_sentinel(self) -> u64 {
        match self {
            Self::Compute => 0x5A5A_5A5A_0000_0000,
            Self::StoreSensor => 0x1B1B_1B1B_0000_0000,
            Self::StorePrediction => 0x2C2C_2C2C_0000_0000,
            Self::StoreAction => 0x3D3D_3D3D_0000_0000,
        }
    }

    /// Position in [`Channel::ALL`]; also the cycle-counter slot.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Compute => 0,
            Self::StoreSensor => 1,
            Self::StorePrediction => 2,
            Self::StoreAction => 3,
        }
    }

    /// Channel whose start sentinel equals `word`, if any.
    #[must_use]
    pub fn from_start_sentinel(word: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.start_sentinel() == word)
    }

    /// Channel whose finish sentinel equals `word`, if any.
    #[must_use]
    pub fn from_finish_sentinel(word: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.finish_sentinel() == word)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compute => write!(f, "compute"),
            Self::StoreSensor => write!(f, "store-sensor"),
            Self::StorePrediction => write!(f, "store-pred"),
            Self::StoreAction => write!(f, "store-action"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_unique() {
        let mut all: Vec<u64> = Channel::ALL
            .iter()
            .flat_map(|c| [c.start_sentinel(), c.finish_sentinel()])
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8);
    }

    #[test]
    fn sentinel_lookup_is_exact() {
        assert_eq!(Channel::from_start_sentinel(0xA5A5_A5A5), Some(Channel::Compute));
        assert_eq!(Channel::from_start_sentinel(0xA5A5_A5A4), None);
        // A finish value is never mistaken for a start.
        assert_eq!(Channel::from_start_sentinel(0x5A5A_5A5A_0000_0000), None);
        assert_eq!(
            Channel::from_finish_sentinel(0x2C2C_2C2C_0000_0000),
            Some(Channel::StorePrediction)
        );
    }

    #[test]
    fn index_matches_all_order() {
        for (i, c) in Channel::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }
}
