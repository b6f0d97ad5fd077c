use clap::ValueEnum;
use serde_with::SerializeDisplay;
use strum_macros::{Display, EnumIter};

use crate::sdk::DataType;

/// A sensor stream the bridge can start and stop.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Display,
    EnumIter,
    ValueEnum,
    SerializeDisplay,
)]
#[strum(serialize_all = "lowercase")]
pub enum Capability {
    /// Heart rate with RR intervals.
    Hr,
    /// Electrocardiogram.
    Ecg,
    /// Accelerometer.
    Acc,
    /// Photoplethysmography (optical heart rate).
    Ppg,
    /// Pulse-to-pulse intervals.
    Ppi,
}

impl Capability {
    /// Returns the SDK stream data type behind this capability.
    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            Self::Hr => DataType::Hr,
            Self::Ecg => DataType::Ecg,
            Self::Acc => DataType::Acc,
            Self::Ppg => DataType::Ppg,
            Self::Ppi => DataType::Ppi,
        }
    }

    /// Maps an SDK data type to a streamable capability, if the bridge exposes one.
    #[must_use]
    pub fn from_data_type(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Hr => Some(Self::Hr),
            DataType::Ecg => Some(Self::Ecg),
            DataType::Acc => Some(Self::Acc),
            DataType::Ppg => Some(Self::Ppg),
            DataType::Ppi => Some(Self::Ppi),
            DataType::Gyro | DataType::Magnetometer => None,
        }
    }

    /// Returns whether starting this stream first negotiates settings with the device.
    #[must_use]
    pub fn negotiates_settings(self) -> bool {
        matches!(self, Self::Ecg | Self::Acc | Self::Ppg)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_capability_round_trips_through_its_data_type() {
        for capability in Capability::iter() {
            assert_eq!(
                Some(capability),
                Capability::from_data_type(capability.data_type())
            );
        }
    }

    #[rstest]
    #[case(DataType::Gyro)]
    #[case(DataType::Magnetometer)]
    fn motion_only_data_types_have_no_capability(#[case] data_type: DataType) {
        assert_eq!(None, Capability::from_data_type(data_type));
    }

    #[rstest]
    #[case(Capability::Hr, false)]
    #[case(Capability::Ecg, true)]
    #[case(Capability::Acc, true)]
    #[case(Capability::Ppg, true)]
    #[case(Capability::Ppi, false)]
    fn only_ecg_acc_and_ppg_negotiate_settings(
        #[case] capability: Capability,
        #[case] expected: bool,
    ) {
        assert_eq!(expected, capability.negotiates_settings());
    }
}
