//! PET specific handling: scaling activity concentration to SUV (body weight).

use crate::error::Result;
use crate::preprocess::read_string;
use crate::volume::Volume;

use dicom::object::{InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use std::path::Path;
use tracing::{debug, warn};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Inputs of the body weight SUV formula.
#[derive(Clone, Debug, PartialEq)]
pub struct SuvParameters {
    pub weight_kg: f64,
    pub total_dose_bq: f64,
    pub half_life_s: f64,
    pub injection_time_s: f64,
    pub scan_time_s: f64,
}

impl SuvParameters {
    /// Read the parameters from a PET image header. `None` when the image is
    /// not in Bq/ml or an input is missing.
    pub fn from_dicom(object: &InMemDicomObject) -> Option<Self> {
        let units = read_string(object, tags::UNITS)?;
        if !units.eq_ignore_ascii_case("BQML") {
            debug!(%units, "PET units are not Bq/ml");
            return None;
        }

        let weight_kg = object.element(tags::PATIENT_WEIGHT).ok()?.to_float64().ok()?;
        let information = object
            .element(tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE)
            .ok()?
            .items()?
            .first()?;
        let total_dose_bq = information
            .element(tags::RADIONUCLIDE_TOTAL_DOSE)
            .ok()?
            .to_float64()
            .ok()?;
        let half_life_s = information
            .element(tags::RADIONUCLIDE_HALF_LIFE)
            .ok()?
            .to_float64()
            .ok()?;
        let injection_time_s =
            parse_dicom_time(&read_string(information, tags::RADIOPHARMACEUTICAL_START_TIME)?)?;
        let scan_time_s = read_string(object, tags::SERIES_TIME)
            .or_else(|| read_string(object, tags::ACQUISITION_TIME))
            .and_then(|time| parse_dicom_time(&time))?;

        (weight_kg > 0.0 && total_dose_bq > 0.0 && half_life_s > 0.0).then_some(Self {
            weight_kg,
            total_dose_bq,
            half_life_s,
            injection_time_s,
            scan_time_s,
        })
    }

    /// Multiplier turning Bq/ml into SUV.
    pub fn factor(&self) -> f64 {
        let mut elapsed = self.scan_time_s - self.injection_time_s;
        if elapsed < 0.0 {
            // scan after midnight
            elapsed += SECONDS_PER_DAY;
        }
        let decayed_dose = self.total_dose_bq * 2f64.powf(-elapsed / self.half_life_s);
        self.weight_kg * 1000.0 / decayed_dose
    }
}

/// Seconds since midnight of a DICOM TM value (`HHMMSS.FFFFFF`, `HH:MM:SS` also accepted).
pub fn parse_dicom_time(value: &str) -> Option<f64> {
    let value: String = value.trim().chars().filter(|c| *c != ':').collect();
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value.as_str(), ""),
    };
    if whole.len() < 2 || whole.len() > 6 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| -> f64 {
        whole
            .get(range)
            .and_then(|digits| digits.parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let fraction = if fraction.is_empty() {
        0.0
    } else {
        format!("0.{fraction}").parse::<f64>().ok()?
    };
    Some(field(0..2) * 3600.0 + field(2..4) * 60.0 + field(4..6) + fraction)
}

/// Scale a PET volume to SUV using the header of one of its files.
pub(crate) fn apply_suv(header_file: &Path, volume: &mut Volume) -> Result<()> {
    let object = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(header_file)?;
    let Some(parameters) = SuvParameters::from_dicom(&object) else {
        warn!(
            file = %header_file.display(),
            "PET series lacks SUV inputs, keeping raw values"
        );
        return Ok(());
    };
    let factor = parameters.factor() as f32;
    debug!(factor, "scaling PET volume to SUV");
    volume.data_mut().mapv_inplace(|value| value * factor);
    Ok(())
}
