use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];
}

#[derive(Clone, Copy, Debug, Default)]
pub enum Interpolation {
    Linear,
    Nearest,
    #[default]
    None,
}

#[derive(Clone, Copy, Debug, Default)]
pub enum SortBy {
    /// Position along the slice normal, derived from ImagePositionPatient
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}

/// DICOM modalities the pipeline knows how to convert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    CT,
    MR,
    PT,
    RTSTRUCT,
    Other(String),
}

impl Modality {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CT" => Modality::CT,
            "MR" => Modality::MR,
            "PT" => Modality::PT,
            "RTSTRUCT" => Modality::RTSTRUCT,
            other => Modality::Other(other.to_string()),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Modality::CT | Modality::MR | Modality::PT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modalities_case_insensitively() {
        assert_eq!(Modality::parse("ct"), Modality::CT);
        assert_eq!(Modality::parse(" RTSTRUCT "), Modality::RTSTRUCT);
        assert_eq!(Modality::parse("RTDOSE"), Modality::Other("RTDOSE".into()));
        assert!(Modality::parse("PT").is_image());
        assert!(!Modality::RTSTRUCT.is_image());
    }
}
