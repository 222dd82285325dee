//! Context filter: decides which captured values travel with a callable.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::callable::{Callable, Capture};
use crate::error::{LandingError, Result};
use crate::settings::Policy;
use crate::wire;


/// The captured environment of `callable`, restricted to values that survive
/// a wire round trip under a name Python can assign to.
///
/// Under [`Policy::Strict`] the first value that cannot travel fails the
/// whole call. Under [`Policy::BestEffort`] it is dropped.
pub fn filter(callable: &Callable, policy: Policy) -> Result<BTreeMap<String, Value>> {
    let mut kept = BTreeMap::new();
    for (name, capture) in callable.captures() {
        match check(name, capture) {
            Ok(value) => {
                kept.insert(name.clone(), value);
            }
            Err(reason) => match policy {
                Policy::Strict => {
                    return Err(LandingError::UnencodableContext {
                        callable: callable.name().to_string(),
                        entry: name.clone(),
                        reason,
                    });
                }
                Policy::BestEffort => {
                    debug!(callable = callable.name(), entry = %name, %reason, "dropping captured value");
                }
            },
        }
    }
    Ok(kept)
}

fn check(name: &str, capture: &Capture) -> std::result::Result<Value, String> {
    if !wire::is_identifier(name) {
        return Err(format!("'{}' is not a valid Python name", name));
    }
    if wire::is_reserved(name) {
        return Err(format!(
            "names starting with '{}' are reserved",
            wire::RESERVED_PREFIX
        ));
    }
    match capture {
        Capture::Encoded(value) => wire::round_trip(value),
        Capture::Unencodable { reason, .. } => Err(reason.clone()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Callable {
        Callable::new("collect_info", "def collect_info():\n    return data\n").unwrap()
    }

    #[test]
    fn encodable_values_pass_unchanged() {
        let c = base().capture("data", &3).capture("prefix", "LOG");
        let kept = filter(&c, Policy::Strict).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept["data"], json!(3));
        assert_eq!(kept["prefix"], json!("LOG"));
    }

    #[test]
    fn strict_rejects_opaque_values() {
        let c = base()
            .capture("data", &3)
            .capture_opaque::<std::net::TcpStream>("conn");
        let err = filter(&c, Policy::Strict).unwrap_err();
        match err {
            LandingError::UnencodableContext { callable, entry, .. } => {
                assert_eq!(callable, "collect_info");
                assert_eq!(entry, "conn");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn best_effort_drops_opaque_values() {
        let c = base()
            .capture("data", &3)
            .capture_opaque::<std::fs::File>("handle");
        let kept = filter(&c, Policy::BestEffort).unwrap();
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("data"));
    }

    #[test]
    fn invalid_names_cannot_travel() {
        let c = base().capture("@data", &3);
        assert!(filter(&c, Policy::Strict).is_err());
        assert!(filter(&c, Policy::BestEffort).unwrap().is_empty());
    }

    #[test]
    fn reserved_names_cannot_travel() {
        let c = base().capture("__landing_buffer", &3);
        match filter(&c, Policy::Strict).unwrap_err() {
            LandingError::UnencodableContext { entry, reason, .. } => {
                assert_eq!(entry, "__landing_buffer");
                assert!(reason.contains("reserved"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(filter(&c, Policy::BestEffort).unwrap().is_empty());
    }

    #[test]
    fn floats_pass_strict_filter_unchanged() {
        for x in wire::sample_floats(2000) {
            let c = base().capture("v", &x);
            let kept = filter(&c, Policy::Strict)
                .unwrap_or_else(|e| panic!("{:e} rejected: {}", x, e));
            assert_eq!(kept["v"].as_f64(), Some(x));
        }
    }

    #[test]
    fn empty_environment() {
        assert!(filter(&base(), Policy::Strict).unwrap().is_empty());
    }
}
