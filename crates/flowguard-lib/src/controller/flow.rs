//! Flow rule payload for `POST /flows/{deviceId}`

use serde::{Deserialize, Serialize};

const OUTPUT: &str = "OUTPUT";
const IN_PORT: &str = "IN_PORT";

/// Priority used for corrective reroute rules
pub const DEFAULT_FLOW_PRIORITY: u32 = 40_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRule {
    pub priority: u32,
    pub timeout: u32,
    pub is_permanent: bool,
    pub device_id: String,
    pub treatment: Treatment,
    pub selector: Selector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(rename = "type")]
    pub kind: String,
    pub port: String,
}

impl FlowRule {
    /// Permanent rule sending everything arriving on `in_port` out of `out_port`
    pub fn redirect(
        device_id: impl Into<String>,
        in_port: impl Into<String>,
        out_port: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            priority,
            timeout: 0,
            is_permanent: true,
            device_id: device_id.into(),
            treatment: Treatment {
                instructions: vec![Instruction {
                    kind: OUTPUT.to_string(),
                    port: out_port.into(),
                }],
            },
            selector: Selector {
                criteria: vec![Criterion {
                    kind: IN_PORT.to_string(),
                    port: in_port.into(),
                }],
            },
        }
    }

    pub fn in_port(&self) -> Option<&str> {
        self.selector
            .criteria
            .iter()
            .find(|c| c.kind == IN_PORT)
            .map(|c| c.port.as_str())
    }

    pub fn out_port(&self) -> Option<&str> {
        self.treatment
            .instructions
            .iter()
            .find(|i| i.kind == OUTPUT)
            .map(|i| i.port.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redirect_wire_shape() {
        let rule = FlowRule::redirect("of:0000000000000001", "1", "2", DEFAULT_FLOW_PRIORITY);
        let value = serde_json::to_value(&rule).unwrap();

        assert_eq!(
            value,
            json!({
                "priority": 40000,
                "timeout": 0,
                "isPermanent": true,
                "deviceId": "of:0000000000000001",
                "treatment": {"instructions": [{"type": "OUTPUT", "port": "2"}]},
                "selector": {"criteria": [{"type": "IN_PORT", "port": "1"}]}
            })
        );
    }

    #[test]
    fn test_port_accessors() {
        let rule = FlowRule::redirect("of:1", "3", "4", 10);
        assert_eq!(rule.in_port(), Some("3"));
        assert_eq!(rule.out_port(), Some("4"));
    }
}
