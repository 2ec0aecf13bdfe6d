//! Deployment profiles.
//!
//! A profile ties a transducer/construct setup to the frequencies it can
//! treat, the operator choice lists and the calibration table.  Five profiles
//! ship built in; others can be loaded from JSON.  The active profile is
//! chosen once at startup.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dose::{CalibrationEntry, CalibrationTable};
use crate::error::{Error, Result};

/// Maximum number of RF switches chained on the transmit path.
pub const MAX_SWITCHES: usize = 4;

/// One switch position per chained switch, in switch order.
pub type SwitchPositions = heapless::Vec<u8, MAX_SWITCHES>;

/// Profile selected when none is named.
pub const DEFAULT_PROFILE: &str = "INVITRO_8MM";

/// Identifiers of the built-in profiles.
pub const BUILTIN_PROFILES: [&str; 5] = [
    "INVITRO_5MM",
    "INVITRO_7MM",
    "INVITRO_8MM",
    "INVITRO_9MM",
    "INVIVO_FLANK",
];

const DURATIONS_S: [f64; 7] = [5.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0];
const BURST_LENGTHS_S: [f64; 5] = [0.002, 0.01, 0.02, 0.03, 0.04];
const DUTY_CYCLES: [f64; 5] = [0.005, 0.01, 0.02, 0.05, 0.1];
const RADIALL_SN: &str = "31ASW22007189";

/// A treatment deployment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    /// Treatable frequencies (kHz), in default treatment order.
    pub frequencies_khz: Vec<u32>,
    pub durations_s: Vec<f64>,
    pub default_duration_s: f64,
    pub burst_lengths_s: Vec<f64>,
    pub default_burst_length_s: f64,
    pub duty_cycles: Vec<f64>,
    pub default_duty_cycle: f64,
    /// Serial numbers of the RF switches, in chain order.
    pub switch_serials: Vec<String>,
    /// Switch positions routing each frequency to its transducer.
    pub switch_positions: BTreeMap<u32, SwitchPositions>,
    pub calibration: CalibrationTable,
}

impl Profile {
    /// Look up a built-in profile by id (case-insensitive).
    pub fn builtin(id: &str) -> Result<Self> {
        let profile = match id.to_ascii_uppercase().as_str() {
            "INVITRO_5MM" => invitro(
                "INVITRO_5MM",
                "In Vitro - 5 mm Construct (5 mm focus)",
                [
                    (0.000902218, 0.98513),
                    (9.16599e-05, 1.8052),
                    (0.00263101, 1.31123),
                    (0.00118082, 3.59022),
                    (0.00454404, 4.44493),
                    (0.00400679, 4.23882),
                    (0.00594782, 5.08561),
                    (0.00230978, 7.18467),
                ],
            ),
            "INVITRO_7MM" => invitro(
                "INVITRO_7MM",
                "In Vitro - 3 mm Construct (7 mm focus)",
                [
                    (0.000272721, 1.00882),
                    (5.1e-05, 1.74814),
                    (0.00238414, 1.37123),
                    (0.00147526, 2.93425),
                    (0.00436146, 3.84824),
                    (0.00396148, 4.1849),
                    (0.00604727, 5.25464),
                    (0.00150102, 8.30002),
                ],
            ),
            "INVITRO_8MM" => invitro(
                "INVITRO_8MM",
                "In Vitro - 2 mm Construct (8 mm focus)",
                [
                    (0.00025164, 0.930838),
                    (4.88529e-05, 1.67454),
                    (0.00239558, 1.37781),
                    (0.00135768, 2.70039),
                    (0.00410544, 3.62235),
                    (0.00373053, 3.94092),
                    (0.00589971, 5.12642),
                    (0.00153149, 8.46851),
                ],
            ),
            "INVITRO_9MM" => invitro(
                "INVITRO_9MM",
                "In Vitro - 1 mm Construct (9 mm focus)",
                [
                    (-9.77007e-05, 0.929885),
                    (0.00011734, 1.61955),
                    (0.00226992, 1.37723),
                    (0.00120503, 2.54603),
                    (0.00398744, 3.44336),
                    (0.00343827, 3.8081),
                    (0.00592242, 5.12277),
                    (0.000642585, 8.34208),
                ],
            ),
            "INVIVO_FLANK" => invivo_flank(),
            _ => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown profile {id:?}; built-in profiles are {}",
                    BUILTIN_PROFILES.join(", ")
                )));
            }
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Parse and validate a JSON profile.
    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Read, parse and validate a JSON profile file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Switch positions for a frequency, if it is routed.
    pub fn positions_for(&self, frequency_khz: u32) -> Option<&SwitchPositions> {
        self.switch_positions.get(&frequency_khz)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(format!("{}: {msg}", self.id)));

        if self.frequencies_khz.is_empty() {
            return invalid("no frequencies".into());
        }
        for (i, f) in self.frequencies_khz.iter().enumerate() {
            if *f == 0 {
                return invalid("zero frequency".into());
            }
            if self.frequencies_khz[..i].contains(f) {
                return invalid(format!("duplicate frequency {f} kHz"));
            }
            if !self.calibration.contains(*f) {
                return invalid(format!("{f} kHz has no calibration entry"));
            }
        }
        for (f, positions) in &self.switch_positions {
            if positions.len() != self.switch_serials.len() {
                return invalid(format!(
                    "{f} kHz routes {} positions through {} switches",
                    positions.len(),
                    self.switch_serials.len()
                ));
            }
        }
        if !matches!(Duration::try_from_secs_f64(self.default_duration_s), Ok(d) if !d.is_zero()) {
            return invalid(format!(
                "default duration {} s must be positive and representable",
                self.default_duration_s
            ));
        }
        if self.default_burst_length_s.is_nan() || self.default_burst_length_s <= 0.0 {
            return invalid("default burst length must be positive".into());
        }
        if self.default_duty_cycle.is_nan()
            || self.default_duty_cycle <= 0.0
            || self.default_duty_cycle > 1.0
        {
            return invalid("default duty cycle outside (0, 1]".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

const INVITRO_FREQUENCIES: [u32; 8] = [70, 100, 150, 230, 300, 500, 670, 1000];
const INVITRO_P_REF: [f64; 8] = [
    502.693, 600.833, 735.867, 911.208, 1040.67, 1343.5, 1555.22, 1900.0,
];

fn positions(p: &[u8]) -> SwitchPositions {
    p.iter().copied().collect()
}

fn choice_defaults(
    id: &str,
    name: &str,
    frequencies_khz: Vec<u32>,
    switch_positions: BTreeMap<u32, SwitchPositions>,
    calibration: CalibrationTable,
) -> Profile {
    Profile {
        id: id.into(),
        name: name.into(),
        frequencies_khz,
        durations_s: DURATIONS_S.to_vec(),
        default_duration_s: 120.0,
        burst_lengths_s: BURST_LENGTHS_S.to_vec(),
        default_burst_length_s: 0.04,
        duty_cycles: DUTY_CYCLES.to_vec(),
        default_duty_cycle: 0.1,
        switch_serials: vec![RADIALL_SN.into()],
        switch_positions,
        calibration,
    }
}

fn invitro(id: &str, name: &str, coeffs: [(f64, f64); 8]) -> Profile {
    let calibration = INVITRO_FREQUENCIES
        .iter()
        .zip(INVITRO_P_REF)
        .zip(coeffs)
        .map(|((f, p_ref), (a, b))| (*f, CalibrationEntry::new(p_ref, a, b)))
        .collect();
    let switch_positions = INVITRO_FREQUENCIES
        .iter()
        .zip(1u8..)
        .map(|(f, p)| (*f, positions(&[p])))
        .collect();
    choice_defaults(
        id,
        name,
        INVITRO_FREQUENCIES.to_vec(),
        switch_positions,
        calibration,
    )
}

fn invivo_flank() -> Profile {
    let calibration = [
        (100, CalibrationEntry::new(601.0, 0.000635469, 1.55504)),
        (150, CalibrationEntry::new(736.0, 0.00286927, 1.64955)),
        (230, CalibrationEntry::new(850.0, 0.00263603, 3.70915)),
    ]
    .into_iter()
    .collect();
    let switch_positions = [(100, positions(&[1])), (150, positions(&[3])), (230, positions(&[5]))]
        .into_iter()
        .collect();
    choice_defaults(
        "INVIVO_FLANK",
        "In Vivo - Flank",
        vec![100, 150, 230],
        switch_positions,
        calibration,
    )
}
