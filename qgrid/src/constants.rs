// Purpose: physical constants of the liquid-argon charge readout
pub const V_DRIFT: f64 = 1.601e-3; // mm/ns, electron drift velocity at nominal field
pub const E_LIFETIME: f64 = 10.0e6; // ns, electron lifetime for the nominal argon purity
pub const W_ION: f64 = 23.6e-6; // MeV per electron-ion pair

// Coordinate labels used when axes are built without an explicit title
pub const DRIFT_LABEL: &str = "x [mm]";
pub const T1_LABEL: &str = "y [mm]";
pub const T2_LABEL: &str = "z [mm]";

/// Converts a drift coordinate (mm) to a drift time (ns).
#[inline]
pub fn drift_time(coordinate: f64, drift_velocity: f64) -> f64 {
    coordinate / drift_velocity
}

/// Number of ionization electrons corresponding to a deposited energy (MeV).
#[inline]
pub fn electrons_from_energy(energy_mev: f64) -> f64 {
    energy_mev / W_ION
}
