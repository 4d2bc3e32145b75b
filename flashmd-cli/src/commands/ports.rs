//! Serial port listing.

use anyhow::Result;
use console::style;
use flashmd::{DetectedPort, detect_ports, format_port_list};

fn port_json(port: &DetectedPort) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "device": port.device.name(),
        "dumper": port.device.is_dumper(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// `list-ports`: show serial ports, dumpers only unless `all`.
pub(crate) fn cmd_list_ports(json: bool, all: bool) -> Result<()> {
    let detected: Vec<DetectedPort> = detect_ports()
        .into_iter()
        .filter(|p| all || p.device.is_dumper())
        .collect();

    if json {
        let ports: Vec<serde_json::Value> = detected.iter().map(port_json).collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());
    if detected.is_empty() {
        let hint = if all {
            "No serial ports found"
        } else {
            "No FlashMaster MD found (use --all to show every port)"
        };
        eprintln!("  {}", style(hint).dim());
    } else {
        for line in format_port_list(&detected) {
            println!("  {line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashmd::DeviceKind;

    #[test]
    fn test_port_json_shape() {
        let port = DetectedPort {
            name: "/dev/ttyACM0".to_string(),
            device: DeviceKind::FlashMaster,
            vid: Some(0x0483),
            pid: Some(0x5740),
            manufacturer: Some("STMicroelectronics".to_string()),
            product: None,
            serial: None,
        };
        let value = port_json(&port);
        assert_eq!(value["name"], "/dev/ttyACM0");
        assert_eq!(value["device"], "FlashMaster MD");
        assert_eq!(value["dumper"], true);
        assert_eq!(value["vid"], 0x0483);
        assert!(value["product"].is_null());
    }
}
