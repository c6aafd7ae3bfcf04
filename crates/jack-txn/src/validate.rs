//! Structural validation run by `Commit` before any namespace is
//! persisted. Deliberately shallow: it catches the invariants the data
//! model states for `interfaces`/`routes` (spec.md §3) that are cheap to
//! check against the document alone. Deeper kernel-dependent checks
//! (does a device actually exist, does a gateway's subnet match an
//! interface) belong to `jack-network`'s reconciliation, which runs at
//! apply time and fails the same way.

use jack_core::Value;

pub fn validate_namespace(name: &str, value: &Value) -> Vec<String> {
    match name {
        "interfaces" => validate_interfaces(value),
        "routes" => validate_routes(value),
        _ => Vec::new(),
    }
}

fn validate_interfaces(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(ifaces) = value.as_object() else {
        return vec!["interfaces namespace must be an object".to_string()];
    };

    let device_names: Vec<&str> = ifaces
        .values()
        .filter_map(|v| v.as_object())
        .filter_map(|o| o.get("device").and_then(Value::as_str))
        .collect();

    for (name, iface) in ifaces {
        let Some(obj) = iface.as_object() else {
            errors.push(format!("interfaces.{name}: must be an object"));
            continue;
        };
        let iface_type = obj.get("type").and_then(Value::as_str).unwrap_or("");
        let protocol = obj.get("protocol").and_then(Value::as_str).unwrap_or("");

        if protocol == "static" {
            let ipaddr = obj.get("ipaddr").and_then(Value::as_str).unwrap_or("");
            let netmask = obj.get("netmask").and_then(Value::as_str).unwrap_or("");
            if ipaddr.is_empty() || netmask.is_empty() {
                errors.push(format!(
                    "interfaces.{name}: protocol=static requires non-empty ipaddr and netmask"
                ));
            }
        }

        match iface_type {
            "vlan" => {
                let parent = obj.get("device").and_then(Value::as_str).unwrap_or("");
                let vlan_id = obj.get("vlan_id");
                let vlan_id_ok = matches!(vlan_id, Some(Value::Int(n)) if *n > 0);
                if !vlan_id_ok {
                    errors.push(format!("interfaces.{name}: vlan_id must be > 0"));
                }
                if parent.is_empty() {
                    errors.push(format!("interfaces.{name}: vlan requires a parent device"));
                } else if !device_names.contains(&parent) && parent != name {
                    errors.push(format!(
                        "interfaces.{name}: vlan parent device '{parent}' not found"
                    ));
                }
            }
            "bridge" => {
                if !matches!(obj.get("bridge_ports"), Some(Value::List(_)) | None) {
                    errors.push(format!("interfaces.{name}: bridge_ports must be a list"));
                }
            }
            "" => errors.push(format!("interfaces.{name}: missing 'type'")),
            _ => {}
        }
    }
    errors
}

fn validate_routes(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(routes) = value.as_object() else {
        return vec!["routes namespace must be an object".to_string()];
    };
    for (name, route) in routes {
        let Some(obj) = route.as_object() else {
            errors.push(format!("routes.{name}: must be an object"));
            continue;
        };
        let gateway = obj.get("gateway").and_then(Value::as_str).unwrap_or("");
        let interface = obj.get("interface").and_then(Value::as_str).unwrap_or("");
        if gateway.is_empty() && interface.is_empty() {
            errors.push(format!(
                "routes.{name}: must specify at least one of gateway, interface"
            ));
        }
        if let Some(Value::Int(metric)) = obj.get("metric") {
            if *metric < 0 {
                errors.push(format!("routes.{name}: metric must be >= 0"));
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_interface_without_ipaddr_fails() {
        let mut ns = Value::object();
        ns.set_path(&["wan", "type"], Value::String("physical".into()))
            .unwrap();
        ns.set_path(&["wan", "protocol"], Value::String("static".into()))
            .unwrap();
        let errors = validate_namespace("interfaces", &ns);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn vlan_with_missing_parent_fails() {
        let mut ns = Value::object();
        ns.set_path(&["eth0.10", "type"], Value::String("vlan".into()))
            .unwrap();
        ns.set_path(&["eth0.10", "device"], Value::String("eth0".into()))
            .unwrap();
        ns.set_path(&["eth0.10", "vlan_id"], Value::Int(10)).unwrap();
        let errors = validate_namespace("interfaces", &ns);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("parent device"));
    }

    #[test]
    fn route_without_gateway_or_interface_fails() {
        let mut ns = Value::object();
        ns.set_path(&["r1", "destination"], Value::String("default".into()))
            .unwrap();
        let errors = validate_namespace("routes", &ns);
        assert_eq!(errors.len(), 1);
    }
}
