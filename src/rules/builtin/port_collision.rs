use std::sync::Arc;

use crate::error::Result;
use crate::host::PortProbe;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};

/// A port the repository's services bind is already taken on the host.
pub struct PortCollisionRisk {
    probe: Arc<dyn PortProbe>,
}

impl PortCollisionRisk {
    pub fn new(probe: Arc<dyn PortProbe>) -> Self {
        Self { probe }
    }
}

impl Rule for PortCollisionRisk {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "port_collision_risk".into(),
            name: "Service port already in use".into(),
            severity: Severity::High,
            category: Category::RuntimeEnvironment,
            description: "A port required by the repo's services is already bound".into(),
            when: "docker-compose or .env declares a port and something on the host already \
                   accepts connections on it."
                .into(),
            fix: "Stop the process holding the port, or remap it in docker-compose / .env."
                .into(),
            cluster: "Other".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if repo.required_ports.is_empty() {
            return Ok(None);
        }
        let in_use: Vec<u16> = repo
            .required_ports
            .iter()
            .copied()
            .filter(|&p| self.probe.in_use(p))
            .collect();
        if in_use.is_empty() {
            return Ok(None);
        }

        let listed: Vec<String> = in_use.iter().map(u16::to_string).collect();
        Ok(Some(Finding {
            rule_id: "port_collision_risk".into(),
            severity: Severity::High,
            message: "Required service port already in use.".into(),
            reason: format!(
                "Port(s) {} already bound. Startup will fail.",
                listed.join(", ")
            ),
            host_summary: host.platform(),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("required_ports", repo.required_ports.clone())
                .with("ports_in_use", in_use),
            category: Some(Category::RuntimeEnvironment),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Busy(Vec<u16>);

    impl PortProbe for Busy {
        fn in_use(&self, port: u16) -> bool {
            self.0.contains(&port)
        }
    }

    fn repo(ports: &[u16]) -> RepoProfile {
        RepoProfile {
            required_ports: ports.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn reports_only_busy_ports() {
        let rule = PortCollisionRisk::new(Arc::new(Busy(vec![5432])));
        let f = rule
            .evaluate(&repo(&[3000, 5432]), &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.reason, "Port(s) 5432 already bound. Startup will fail.");
        assert_eq!(
            f.evidence.get("ports_in_use").unwrap(),
            &serde_json::json!([5432])
        );
    }

    #[test]
    fn free_ports_are_silent() {
        let rule = PortCollisionRisk::new(Arc::new(Busy(vec![])));
        assert!(rule
            .evaluate(&repo(&[3000]), &HostProfile::default())
            .unwrap()
            .is_none());
    }
}
