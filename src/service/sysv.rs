// src/service/sysv.rs
//! sysvinit script detection

use super::{DetectedService, ServiceDetector, ServiceScope, UpgradeRule};
use crate::error::Result;
use crate::filesystem::PackageTree;

/// Executable files directly in `etc/init.d`
pub struct SysvInitDetector;

impl ServiceDetector for SysvInitDetector {
    fn manager(&self) -> &str {
        "sysvinit"
    }

    fn description(&self) -> &str {
        "sysvinit scripts in etc/init.d"
    }

    fn detect(&self, tree: &PackageTree) -> Result<Vec<DetectedService>> {
        let Some(dir) = tree.lookup("etc/init.d") else {
            return Ok(Vec::new());
        };
        let services = tree
            .get_node(dir)
            .children()
            .iter()
            .map(|&id| (id, tree.get_node(id)))
            .filter(|(_, node)| node.is_file() && node.meta().mode & 0o111 != 0)
            .map(|(id, node)| DetectedService {
                path: tree.get_path(id),
                names: vec![node.name().to_string()],
                type_of_service: "service".to_string(),
                scope: ServiceScope::System,
                enable_by_default: true,
                start_by_default: true,
                default_upgrade: UpgradeRule::Restart,
                cannot_enable: false,
            })
            .collect();
        Ok(services)
    }
}
