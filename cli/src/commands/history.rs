use color_eyre::eyre::Result;

use crate::daemon::PowerSample;

use super::{client_error, connect, format_timestamp};

pub fn run(hours: u32, session: Option<String>, json: bool) -> Result<()> {
    let mut client = connect()?;

    let samples = match &session {
        Some(id) => client.get_session_samples(id),
        None => client.get_power_history(hours),
    }
    .map_err(client_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }

    match &session {
        Some(id) => println!("Samples for session {}", id),
        None => println!("Samples from the last {} hour(s)", hours),
    }
    println!("{}", "=".repeat(72));

    if samples.is_empty() {
        println!("No samples recorded.");
        return Ok(());
    }

    print_table(&samples);
    print_summary(&samples);
    Ok(())
}

pub fn run_total() -> Result<()> {
    let mut client = connect()?;
    let totals = client.get_totals().map_err(client_error)?;

    println!("Energy:    {:.4} kWh", totals.total_kwh);
    println!("Rate:      {:.2} per kWh", totals.electricity_rate);
    println!("Cost:      {:.2}", totals.total_cost);
    Ok(())
}

fn print_table(samples: &[PowerSample]) {
    println!(
        "{:<19}  {:>9}  {:>10}  {:>6}  {:>6}  {:>6}",
        "Time", "Power W", "kWh", "CPU%", "GPU%", "MEM%"
    );
    println!("{}", "-".repeat(72));
    for sample in samples {
        println!(
            "{:<19}  {:>9.1}  {:>10.5}  {:>6.1}  {:>6.1}  {:>6.1}",
            format_timestamp(sample.timestamp),
            sample.power_watts,
            sample.accumulated_kwh,
            sample.cpu_util_pct,
            sample.gpu_util_pct,
            sample.mem_util_pct
        );
    }
}

fn print_summary(samples: &[PowerSample]) {
    let avg = samples.iter().map(|s| s.power_watts).sum::<f64>() / samples.len() as f64;
    let max = samples.iter().map(|s| s.power_watts).fold(0.0, f64::max);
    println!("{}", "-".repeat(72));
    println!(
        "{} samples, average {:.1} W, peak {:.1} W",
        samples.len(),
        avg,
        max
    );
}
