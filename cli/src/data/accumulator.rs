const WATTS_PER_KILOWATT: f64 = 1000.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// kWh drawn by `power_watts` over `interval_secs`.
pub fn energy_kwh(power_watts: f64, interval_secs: f64) -> f64 {
    (power_watts / WATTS_PER_KILOWATT) * (interval_secs / SECONDS_PER_HOUR)
}

/// Running energy total for the lifetime of the process.
///
/// Only ever grows. Sessions snapshot it; they never reset it.
#[derive(Debug, Clone, Default)]
pub struct EnergyAccumulator {
    total_kwh: f64,
}

impl EnergyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one interval of draw and returns the new total. Invalid power or
    /// a non-positive interval adds nothing.
    pub fn integrate(&mut self, power_watts: f64, interval_secs: f64) -> f64 {
        if power_watts.is_finite()
            && power_watts > 0.0
            && interval_secs.is_finite()
            && interval_secs > 0.0
        {
            self.total_kwh += energy_kwh(power_watts, interval_secs);
        }
        self.total_kwh
    }

    pub fn current(&self) -> f64 {
        self.total_kwh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_increment() {
        let mut acc = EnergyAccumulator::new();
        let total = acc.integrate(200.0, 5.0);
        assert!((total - 0.000_277_777_8).abs() < 1e-10);
        assert_eq!(acc.current(), total);
    }

    #[test]
    fn test_accumulates_across_calls() {
        let mut acc = EnergyAccumulator::new();
        for _ in 0..720 {
            acc.integrate(1000.0, 5.0);
        }
        assert!((acc.current() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_decreases() {
        let mut acc = EnergyAccumulator::new();
        let inputs = [
            (150.0, 5.0),
            (-40.0, 5.0),
            (f64::NAN, 5.0),
            (f64::INFINITY, 5.0),
            (90.0, 0.0),
            (90.0, -5.0),
            (0.0, 5.0),
            (310.0, 1.0),
        ];

        let mut previous = acc.current();
        for (power, interval) in inputs {
            let total = acc.integrate(power, interval);
            assert!(total >= previous, "{power} W over {interval}s decreased the total");
            assert!(total.is_finite());
            previous = total;
        }
        assert!((previous - energy_kwh(150.0, 5.0) - energy_kwh(310.0, 1.0)).abs() < 1e-12);
    }
}
