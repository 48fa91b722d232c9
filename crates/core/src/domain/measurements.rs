use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// Body profile captured by the (external) try-on flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasurements {
    pub user_id: UserId,
    pub height: f64,
    pub weight: f64,
    pub chest_circumference: Option<f64>,
    pub chest_width: Option<f64>,
    pub waist: Option<f64>,
    pub waist_width: Option<f64>,
}

impl BodyMeasurements {
    pub fn chest(&self) -> f64 {
        self.chest_circumference.or(self.chest_width).unwrap_or(0.0)
    }

    pub fn waist(&self) -> f64 {
        self.waist.or(self.waist_width).unwrap_or(0.0)
    }
}

/// Coarse clothing size used to post-filter personalized results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeLabel {
    S,
    M,
    L,
    XL,
    XXL,
}

impl SizeLabel {
    /// Bands the averaged chest/waist measurement (inches). No profile means M.
    pub fn from_measurements(measurements: Option<&BodyMeasurements>) -> Self {
        let Some(measurements) = measurements else {
            return Self::M;
        };

        let average = (measurements.chest() + measurements.waist()) / 2.0;
        if average < 34.0 {
            Self::S
        } else if average < 38.0 {
            Self::M
        } else if average < 42.0 {
            Self::L
        } else if average < 46.0 {
            Self::XL
        } else {
            Self::XXL
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
            Self::XL => "XL",
            Self::XXL => "XXL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BodyMeasurements, SizeLabel};
    use crate::domain::user::UserId;

    fn profile(chest: Option<f64>, waist: Option<f64>) -> BodyMeasurements {
        BodyMeasurements {
            user_id: UserId("u-1".to_owned()),
            height: 170.0,
            weight: 65.0,
            chest_circumference: chest,
            chest_width: None,
            waist,
            waist_width: None,
        }
    }

    #[test]
    fn missing_profile_defaults_to_medium() {
        assert_eq!(SizeLabel::from_measurements(None), SizeLabel::M);
    }

    #[test]
    fn bands_follow_averaged_measurement() {
        let cases = [
            (30.0, 32.0, SizeLabel::S),
            (36.0, 34.0, SizeLabel::M),
            (38.0, 38.0, SizeLabel::L),
            (44.0, 42.0, SizeLabel::XL),
            (48.0, 46.0, SizeLabel::XXL),
        ];

        for (chest, waist, expected) in cases {
            assert_eq!(
                SizeLabel::from_measurements(Some(&profile(Some(chest), Some(waist)))),
                expected,
                "chest={chest} waist={waist}"
            );
        }
    }

    #[test]
    fn width_fields_stand_in_for_circumferences() {
        let mut measurements = profile(None, None);
        measurements.chest_width = Some(40.0);
        measurements.waist_width = Some(40.0);

        assert_eq!(SizeLabel::from_measurements(Some(&measurements)), SizeLabel::L);
    }

    #[test]
    fn empty_measurements_band_as_small() {
        assert_eq!(SizeLabel::from_measurements(Some(&profile(None, None))), SizeLabel::S);
    }
}
