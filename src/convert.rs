//! Conversions between raw converter counts and physical units.

/// Linear ADC mapping: `volts = counts * full_scale_volts / full_scale_counts`.
#[derive(Debug, Clone, Copy)]
pub struct LinearAdc {
    pub full_scale_volts: f64,
    pub full_scale_counts: f64,
}

/// Input voltage divider of the power controller, 40 V across a 10-bit ADC.
pub const PZPOWER_INPUT: LinearAdc = LinearAdc {
    full_scale_volts: 40.0,
    full_scale_counts: 1024.0,
};

impl LinearAdc {
    fn step(&self) -> f64 {
        self.full_scale_volts / self.full_scale_counts
    }

    pub fn to_volts(&self, counts: u16) -> f64 {
        f64::from(counts) * self.step()
    }

    /// Nearest count for `volts`, saturating at the ends of the `u16` range.
    pub fn to_counts(&self, volts: f64) -> u16 {
        (volts / self.step()).round() as u16
    }
}

/// NTC thermistor in the lower leg of a divider fed from `v_source`,
/// modelled with the simplified beta equation.
#[derive(Debug, Clone, Copy)]
pub struct Thermistor {
    pub beta: f64,
    /// Resistance at 25 °C.
    pub r25: f64,
    pub r_source: f64,
    pub v_source: f64,
}

/// Board thermistor of the power controller, measured in raw ADC counts.
pub const PZPOWER_BOARD: Thermistor = Thermistor {
    beta: 3977.0,
    r25: 10_000.0,
    r_source: 10_000.0,
    v_source: 1024.0,
};

impl Thermistor {
    pub fn celsius(&self, reading: f64) -> f64 {
        let r_t = (reading * self.r_source) / (self.v_source - reading);
        let kelvin = 1.0 / ((1.0 / self.beta) * (r_t / self.r25).ln() + 1.0 / 298.15);
        kelvin - 273.15
    }
}
