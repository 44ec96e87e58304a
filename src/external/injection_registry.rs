//! Injection registry port (C2): resolves an allocated device into the
//! CDI device identifiers the node plugin hands back to the kubelet at
//! `NodePrepareResources` time.

use crate::domain::device::DeviceKind;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key used to look up an injection entry: vendor, device class, and the
/// vendor-assigned model name (spec error table: "injection lookup failed
/// for {vendor}/{class}/{name}").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InjectionKey {
    pub vendor: String,
    pub class: String,
    pub name: String,
}

impl InjectionKey {
    pub fn new(vendor: impl Into<String>, class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            class: class.into(),
            name: name.into(),
        }
    }

    /// Key for a physical device's injection descriptor. Spec §6: "name is
    /// the device UID for physical devices" — keying on the model instead
    /// would collapse two identical-model devices onto the same CDI entry.
    pub fn for_device(kind: DeviceKind, uid: &str) -> Self {
        let (vendor, class) = Self::vendor_class(kind);
        Self::new(vendor, class, uid)
    }

    fn vendor_class(kind: DeviceKind) -> (&'static str, &'static str) {
        match kind {
            DeviceKind::Gpu | DeviceKind::Vf => ("nvidia", "gpu"),
            DeviceKind::Accelerator => ("habana", "accelerator"),
            DeviceKind::CryptoEngine => ("intel", "crypto-engine"),
        }
    }
}

#[async_trait]
pub trait InjectionRegistry: Send + Sync {
    /// Return the CDI-qualified device IDs to inject for this device.
    async fn resolve(&self, key: &InjectionKey) -> Result<Vec<String>>;
}

pub type InjectionRegistryRef = Arc<dyn InjectionRegistry>;

/// Static table keyed by `(vendor, class, name)`, backing the reference
/// driver deployment where CDI IDs are pinned at install time rather than
/// discovered dynamically.
#[derive(Default)]
pub struct StaticInjectionRegistry {
    table: BTreeMap<InjectionKey, Vec<String>>,
}

impl StaticInjectionRegistry {
    pub fn new(table: BTreeMap<InjectionKey, Vec<String>>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl InjectionRegistry for StaticInjectionRegistry {
    async fn resolve(&self, key: &InjectionKey) -> Result<Vec<String>> {
        self.table.get(key).cloned().ok_or_else(|| Error::InjectionLookupFailed {
            vendor: key.vendor.clone(),
            class: key.class.clone(),
            name: key.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_device_keys_on_uid_not_model() {
        let a = InjectionKey::for_device(DeviceKind::Gpu, "pci0000:01:00.0");
        let b = InjectionKey::for_device(DeviceKind::Gpu, "pci0000:02:00.0");
        assert_ne!(a, b);
        assert_eq!(a.vendor, "nvidia");
        assert_eq!(a.class, "gpu");
    }

    #[tokio::test]
    async fn unknown_key_reports_injection_lookup_failed() {
        let registry = StaticInjectionRegistry::default();
        let key = InjectionKey::new("nvidia", "gpu", "model-a");
        let err = registry.resolve(&key).await.unwrap_err();
        assert!(matches!(err, Error::InjectionLookupFailed { .. }));
    }

    #[tokio::test]
    async fn known_key_resolves_cdi_ids() {
        let key = InjectionKey::new("nvidia", "gpu", "model-a");
        let mut table = BTreeMap::new();
        table.insert(key.clone(), vec!["nvidia.com/gpu=0".to_string()]);
        let registry = StaticInjectionRegistry::new(table);
        let ids = registry.resolve(&key).await.unwrap();
        assert_eq!(ids, vec!["nvidia.com/gpu=0".to_string()]);
    }
}
