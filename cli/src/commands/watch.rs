use color_eyre::eyre::Result;
use serde_json::json;

use crate::daemon::DataSnapshot;

use super::{client_error, connect};

pub fn run(count: u32, compact: bool) -> Result<()> {
    let mut client = connect()?;
    client.subscribe().map_err(client_error)?;
    let mut counter = 0u32;

    loop {
        let snapshot = client.next_update().map_err(client_error)?;
        let doc = to_document(&snapshot);

        if compact {
            println!("{}", serde_json::to_string(&doc)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }

        counter += 1;
        if count > 0 && counter >= count {
            break;
        }
    }

    Ok(())
}

fn to_document(snapshot: &DataSnapshot) -> serde_json::Value {
    let components: Vec<_> = snapshot
        .components
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "kind": c.kind.label(),
                "model": c.model,
                "watts": c.power_watts,
                "utilization": c.utilization_pct,
                "temperature": c.temperature_c,
            })
        })
        .collect();

    json!({
        "timestamp": chrono::DateTime::from_timestamp_millis(snapshot.timestamp)
            .map(|dt| dt.to_rfc3339()),
        "power": {
            "total_watts": snapshot.sample.power_watts,
            "accumulated_kwh": snapshot.sample.accumulated_kwh,
            "cpu_util": snapshot.sample.cpu_util_pct,
            "gpu_util": snapshot.sample.gpu_util_pct,
            "mem_util": snapshot.sample.mem_util_pct,
        },
        "session": snapshot.session.as_ref().map(|s| &s.id),
        "components": components,
    })
}
