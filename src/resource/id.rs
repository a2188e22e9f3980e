//! ARM Resource IDs
//!
//! Parses identifiers of the form
//! `/subscriptions/{id}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}(/{type}/{name})*`
//! into structured segments. Marker segments must use Azure's canonical
//! casing; every value is preserved verbatim.

use crate::error::MalformedResourceId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const SUBSCRIPTIONS: &str = "subscriptions";
const RESOURCE_GROUPS: &str = "resourceGroups";
const PROVIDERS: &str = "providers";

/// A parsed ARM resource ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AzureResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    /// Type/name pairs following the provider namespace, in source order
    pub path: Vec<(String, String)>,
}

impl AzureResourceId {
    /// Parse a resource ID string.
    pub fn parse(id: &str) -> Result<Self, MalformedResourceId> {
        let Some(rest) = id.strip_prefix('/') else {
            return Err(MalformedResourceId::new(id, "must start with '/subscriptions/'"));
        };
        let mut segments = rest.split('/');

        let subscription_id = expect_marker(id, &mut segments, SUBSCRIPTIONS)?;
        let resource_group = expect_marker(id, &mut segments, RESOURCE_GROUPS)?;
        let provider = expect_marker(id, &mut segments, PROVIDERS)?;

        let remaining: Vec<&str> = segments.collect();
        if remaining.is_empty() {
            return Err(MalformedResourceId::new(
                id,
                "missing resource type and name after provider namespace",
            ));
        }
        if remaining.len() % 2 != 0 {
            return Err(MalformedResourceId::new(
                id,
                format!(
                    "resource path has an odd number of segments ({}), expected type/name pairs",
                    remaining.len()
                ),
            ));
        }
        if remaining.iter().any(|s| s.is_empty()) {
            return Err(MalformedResourceId::new(id, "resource path contains an empty segment"));
        }

        let path = remaining
            .chunks_exact(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        Ok(Self {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            provider: provider.to_string(),
            path,
        })
    }

    /// Look up the name for a resource type segment.
    ///
    /// Type comparison ignores ASCII case; the first match wins.
    pub fn get(&self, resource_type: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(resource_type))
            .map(|(_, name)| name.as_str())
    }

    /// The innermost resource type (e.g. `subnets`)
    pub fn resource_type(&self) -> &str {
        self.path.last().map(|(t, _)| t.as_str()).unwrap_or_default()
    }

    /// The innermost resource name (e.g. `subnet1`)
    pub fn name(&self) -> &str {
        self.path.last().map(|(_, n)| n.as_str()).unwrap_or_default()
    }

    /// The owning resource group ID
    pub fn resource_group_id(&self) -> ResourceGroupId {
        ResourceGroupId {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
        }
    }

    /// ID of the enclosing resource, or `None` for a top-level resource.
    pub fn parent(&self) -> Option<Self> {
        if self.path.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.path.pop();
        Some(parent)
    }
}

impl fmt::Display for AzureResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{SUBSCRIPTIONS}/{}/{RESOURCE_GROUPS}/{}/{PROVIDERS}/{}",
            self.subscription_id, self.resource_group, self.provider
        )?;
        for (resource_type, name) in &self.path {
            write!(f, "/{resource_type}/{name}")?;
        }
        Ok(())
    }
}

impl FromStr for AzureResourceId {
    type Err = MalformedResourceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AzureResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AzureResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// ID of a resource group: `/subscriptions/{id}/resourceGroups/{rg}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceGroupId {
    pub subscription_id: String,
    pub resource_group: String,
}

impl ResourceGroupId {
    pub fn parse(id: &str) -> Result<Self, MalformedResourceId> {
        let Some(rest) = id.strip_prefix('/') else {
            return Err(MalformedResourceId::new(id, "must start with '/subscriptions/'"));
        };
        let mut segments = rest.split('/');

        let subscription_id = expect_marker(id, &mut segments, SUBSCRIPTIONS)?;
        let resource_group = expect_marker(id, &mut segments, RESOURCE_GROUPS)?;
        if segments.next().is_some() {
            return Err(MalformedResourceId::new(
                id,
                "unexpected segments after resource group name",
            ));
        }

        Ok(Self {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
        })
    }
}

impl fmt::Display for ResourceGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{SUBSCRIPTIONS}/{}/{RESOURCE_GROUPS}/{}",
            self.subscription_id, self.resource_group
        )
    }
}

impl FromStr for ResourceGroupId {
    type Err = MalformedResourceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Consume `marker/value` from the segment iterator.
fn expect_marker<'a>(
    id: &str,
    segments: &mut impl Iterator<Item = &'a str>,
    marker: &str,
) -> Result<&'a str, MalformedResourceId> {
    match segments.next() {
        Some(seg) if seg == marker => {}
        Some(seg) => {
            return Err(MalformedResourceId::new(
                id,
                format!("expected '{marker}' segment, found '{seg}'"),
            ))
        }
        None => return Err(MalformedResourceId::new(id, format!("missing '{marker}' segment"))),
    }

    match segments.next() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(MalformedResourceId::new(id, format!("empty value for '{marker}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBNET_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1";

    #[test]
    fn test_parse_subnet_id() {
        let id = AzureResourceId::parse(SUBNET_ID).unwrap();
        assert_eq!(id.subscription_id, "00000000-0000-0000-0000-000000000000");
        assert_eq!(id.resource_group, "rg1");
        assert_eq!(id.provider, "Microsoft.Network");
        assert_eq!(
            id.path,
            vec![
                ("virtualNetworks".to_string(), "vnet1".to_string()),
                ("subnets".to_string(), "subnet1".to_string()),
            ]
        );
        assert_eq!(id.resource_type(), "subnets");
        assert_eq!(id.name(), "subnet1");
    }

    #[test]
    fn test_display_round_trip() {
        let id = AzureResourceId::parse(SUBNET_ID).unwrap();
        assert_eq!(id.to_string(), SUBNET_ID);
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let err = AzureResourceId::parse(
            "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks",
        )
        .unwrap_err();
        assert!(err.reason.contains("odd number"));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let cases = [
            "",
            "subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/v",
            "/subscription/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/v",
            "/subscriptions//resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/v",
            "/subscriptions/sub1/resourceGroups//providers/Microsoft.Network/virtualNetworks/v",
            "/subscriptions/sub1/resourceGroups/rg1",
            "/subscriptions/sub1/resourceGroups/rg1/virtualNetworks/v",
            "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network",
            "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/v/",
            "/subscriptions/sub1/resourceGroups/rg1/providers//virtualNetworks/v",
        ];
        for case in cases {
            assert!(AzureResourceId::parse(case).is_err(), "should reject {case:?}");
        }
    }

    #[test]
    fn test_marker_casing_is_strict() {
        assert!(AzureResourceId::parse(
            "/subscriptions/sub1/resourcegroups/rg1/providers/Microsoft.Network/virtualNetworks/v"
        )
        .is_err());
        assert!(AzureResourceId::parse(
            "/Subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/v"
        )
        .is_err());
    }

    #[test]
    fn test_values_preserve_casing() {
        let id = AzureResourceId::parse(
            "/subscriptions/sub1/resourceGroups/MyRG/providers/microsoft.network/VirtualNetworks/VnetLocal",
        )
        .unwrap();
        assert_eq!(id.resource_group, "MyRG");
        assert_eq!(id.provider, "microsoft.network");
        assert_eq!(id.get("virtualNetworks"), Some("VnetLocal"));
        assert_eq!(id.get("VIRTUALNETWORKS"), Some("VnetLocal"));
        assert_eq!(id.get("subnets"), None);
    }

    #[test]
    fn test_parent_and_resource_group() {
        let id = AzureResourceId::parse(SUBNET_ID).unwrap();
        let parent = id.parent().unwrap();
        assert_eq!(parent.name(), "vnet1");
        assert!(parent.parent().is_none());
        assert_eq!(
            id.resource_group_id().to_string(),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1"
        );
    }

    #[test]
    fn test_resource_group_id() {
        let id = ResourceGroupId::parse("/subscriptions/sub1/resourceGroups/rg1").unwrap();
        assert_eq!(id.resource_group, "rg1");
        assert_eq!(id.to_string(), "/subscriptions/sub1/resourceGroups/rg1");
        assert!(ResourceGroupId::parse("/subscriptions/sub1/resourceGroups/rg1/providers").is_err());
        assert!(ResourceGroupId::parse("/subscriptions/sub1/resourceGroups/").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id: AzureResourceId = serde_json::from_value(serde_json::json!(SUBNET_ID)).unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!(SUBNET_ID));
        assert!(serde_json::from_value::<AzureResourceId>(serde_json::json!("/nope")).is_err());
    }
}
