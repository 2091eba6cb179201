//! Release metadata exposed to templates as `.Release`

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::value::{Mapping, ValueNode};

/// Maximum release name length (leaves room for resource name suffixes)
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// Release information for templates
///
/// Created once per render and never mutated while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Revision number
    pub revision: u32,

    /// Is this an install operation?
    pub is_install: bool,

    /// Is this an upgrade operation?
    pub is_upgrade: bool,

    /// Service (always "Chartwright")
    pub service: String,
}

impl ReleaseInfo {
    /// Create release info for a new install
    pub fn for_install(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision: 1,
            is_install: true,
            is_upgrade: false,
            service: "Chartwright".to_string(),
        }
    }

    /// Create release info for an upgrade
    pub fn for_upgrade(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: false,
            is_upgrade: true,
            service: "Chartwright".to_string(),
        }
    }

    /// Check the invariants a render relies on
    pub fn validate(&self) -> Result<()> {
        validate_dns_label(&self.name)?;
        if self.revision == 0 {
            return Err(CoreError::InvalidRelease {
                message: "revision must be a positive integer".to_string(),
            });
        }
        if self.is_install == self.is_upgrade {
            return Err(CoreError::InvalidRelease {
                message: "exactly one of isInstall and isUpgrade must be set".to_string(),
            });
        }
        Ok(())
    }

    /// The `.Release` tree
    pub fn to_node(&self) -> ValueNode {
        let mut map = Mapping::new();
        map.insert("Name".into(), self.name.clone().into());
        map.insert("Namespace".into(), self.namespace.clone().into());
        map.insert("Revision".into(), self.revision.into());
        map.insert("IsInstall".into(), self.is_install.into());
        map.insert("IsUpgrade".into(), self.is_upgrade.into());
        map.insert("Service".into(), self.service.clone().into());
        ValueNode::Mapping(map)
    }
}

/// Validate a DNS-1123 label: lowercase alphanumerics and '-', alphanumeric at both ends
fn validate_dns_label(name: &str) -> Result<()> {
    let invalid = |reason: &str| CoreError::InvalidRelease {
        message: format!("release name '{}' {}", name, reason),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_RELEASE_NAME_LEN {
        return Err(invalid(&format!(
            "is longer than {} characters",
            MAX_RELEASE_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("may only contain lowercase letters, digits and '-'"));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with an alphanumeric character"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_upgrade_are_exclusive() {
        let install = ReleaseInfo::for_install("myapp", "default");
        assert!(install.is_install && !install.is_upgrade);
        assert_eq!(install.revision, 1);

        let upgrade = ReleaseInfo::for_upgrade("myapp", "default", 4);
        assert!(upgrade.is_upgrade && !upgrade.is_install);
        assert!(upgrade.validate().is_ok());

        let mut broken = install.clone();
        broken.is_upgrade = true;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_release_name_validation() {
        assert!(ReleaseInfo::for_install("my-app-2", "ns").validate().is_ok());
        assert!(ReleaseInfo::for_install("MyApp", "ns").validate().is_err());
        assert!(ReleaseInfo::for_install("-app", "ns").validate().is_err());
        assert!(ReleaseInfo::for_install("app_1", "ns").validate().is_err());
        assert!(ReleaseInfo::for_install("", "ns").validate().is_err());
        assert!(ReleaseInfo::for_install(&"a".repeat(54), "ns").validate().is_err());
    }

    #[test]
    fn test_zero_revision_rejected() {
        assert!(ReleaseInfo::for_upgrade("app", "ns", 0).validate().is_err());
    }

    #[test]
    fn test_to_node() {
        let node = ReleaseInfo::for_upgrade("web", "prod", 3).to_node();
        assert_eq!(node.get("Name"), Some(&ValueNode::from("web")));
        assert_eq!(node.get("Namespace"), Some(&ValueNode::from("prod")));
        assert_eq!(node.get("Revision"), Some(&ValueNode::Int(3)));
        assert_eq!(node.get("IsUpgrade"), Some(&ValueNode::Bool(true)));
        assert_eq!(node.get("Service"), Some(&ValueNode::from("Chartwright")));
    }
}
