use std::collections::HashMap;
use std::sync::Arc;

use config::{AdapterConfig, AdapterKind, TransportKind};
use error::{Error, Result};
use tracing::info;
use uuid::Uuid;

use crate::http::HttpProxyServer;
use crate::vmess::VmessServer;
use crate::{AdapterFactoryRef, DirectAdapterFactory, HttpAdapterFactory, VmessAdapterFactory};

/// Id the built-in direct factory is registered under.
pub const DIRECT_ADAPTER_ID: &str = "direct";

/// Registry of adapter factories keyed by their configured id.
pub struct AdapterFactoryManager {
    factories: HashMap<String, AdapterFactoryRef>,
    direct: AdapterFactoryRef,
}

impl Default for AdapterFactoryManager {
    fn default() -> Self {
        let direct: AdapterFactoryRef = Arc::new(DirectAdapterFactory);
        let mut factories = HashMap::new();
        factories.insert(DIRECT_ADAPTER_ID.to_string(), direct.clone());
        Self { factories, direct }
    }
}

impl AdapterFactoryManager {
    pub fn from_config(adapters: &[AdapterConfig]) -> Result<Self> {
        let mut manager = Self::default();
        for (i, adapter) in adapters.iter().enumerate() {
            let factory = build_factory(i, adapter)?;
            info!("register {} adapter {}", factory.kind(), adapter.id);
            manager.register(adapter.id.to_string(), factory);
        }
        Ok(manager)
    }

    pub fn register(&mut self, id: impl Into<String>, factory: AdapterFactoryRef) {
        self.factories.insert(id.into(), factory);
    }

    /// Ids are matched case-sensitively.
    pub fn get(&self, id: &str) -> Option<AdapterFactoryRef> {
        self.factories.get(id).cloned()
    }

    pub fn direct(&self) -> AdapterFactoryRef {
        self.direct.clone()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

fn build_factory(index: usize, adapter: &AdapterConfig) -> Result<AdapterFactoryRef> {
    let field = |name: &str| format!("adapters[{}].{}", index, name);
    let host = || {
        adapter
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::config(field("host"), "a server host is required"))
    };
    let port = || adapter.port.ok_or_else(|| Error::config(field("port"), "a server port is required"));

    let factory: AdapterFactoryRef = match adapter.kind {
        AdapterKind::Direct => Arc::new(DirectAdapterFactory),
        AdapterKind::Http => {
            let auth = match (&adapter.username, &adapter.password) {
                (Some(u), Some(p)) => Some((u.clone(), p.clone())),
                (Some(u), None) => Some((u.clone(), String::new())),
                (None, Some(_)) => {
                    return Err(Error::config(field("username"), "password given without a username"));
                }
                (None, None) => None,
            };
            Arc::new(HttpAdapterFactory::new(HttpProxyServer {
                host: host()?,
                port: port()?,
                auth,
            }))
        }
        AdapterKind::Vmess => {
            let uuid = adapter
                .uuid
                .as_deref()
                .ok_or_else(|| Error::config(field("uuid"), "a user id is required"))?;
            let uuid = Uuid::parse_str(uuid).map_err(|e| Error::config(field("uuid"), e.to_string()))?;
            Arc::new(VmessAdapterFactory::new(VmessServer {
                host: host()?,
                port: port()?,
                uuid,
                alter_id: adapter.alter_id.unwrap_or(0),
                transport: adapter.transport.unwrap_or(TransportKind::Ws),
                path: adapter.path.clone().unwrap_or_else(|| "/".to_string()),
                tls: adapter.tls,
            }))
        }
    };
    Ok(factory)
}

#[cfg(test)]
mod test {
    use super::*;
    use config::AdapterId;

    fn adapter(id: &str, kind: AdapterKind) -> AdapterConfig {
        AdapterConfig {
            id: AdapterId::Name(id.to_string()),
            kind,
            host: Some("proxy.example.com".to_string()),
            port: Some(8080),
            username: None,
            password: None,
            uuid: None,
            alter_id: None,
            path: None,
            transport: None,
            tls: false,
        }
    }

    #[test]
    fn test_from_config() {
        let mut vmess = adapter("Proxy", AdapterKind::Vmess);
        vmess.uuid = Some("b831381d-6324-4d53-ad4f-8cda48b30811".to_string());
        let mut http = adapter("2", AdapterKind::Http);
        http.id = AdapterId::Number(2);

        let manager = AdapterFactoryManager::from_config(&[vmess, http]).unwrap();
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.get("Proxy").unwrap().kind(), "vmess");
        assert!(manager.get("proxy").is_none());
        assert_eq!(manager.get("2").unwrap().kind(), "http");
        assert_eq!(manager.get(DIRECT_ADAPTER_ID).unwrap().kind(), "direct");
        assert_eq!(manager.direct().kind(), "direct");
    }

    #[test]
    fn test_missing_fields() {
        let vmess = adapter("v", AdapterKind::Vmess);
        match AdapterFactoryManager::from_config(&[vmess]) {
            Err(Error::Config { field, .. }) => assert_eq!(field, "adapters[0].uuid"),
            other => panic!("unexpected {:?}", other.map(|m| m.len())),
        }

        let mut bad_uuid = adapter("v", AdapterKind::Vmess);
        bad_uuid.uuid = Some("not-a-uuid".to_string());
        let mut http = adapter("h", AdapterKind::Http);
        http.port = None;
        match AdapterFactoryManager::from_config(&[http.clone()]) {
            Err(Error::Config { field, .. }) => assert_eq!(field, "adapters[0].port"),
            other => panic!("unexpected {:?}", other.map(|m| m.len())),
        }
        match AdapterFactoryManager::from_config(&[adapter("ok", AdapterKind::Direct), bad_uuid]) {
            Err(Error::Config { field, .. }) => assert_eq!(field, "adapters[1].uuid"),
            other => panic!("unexpected {:?}", other.map(|m| m.len())),
        }
    }
}
