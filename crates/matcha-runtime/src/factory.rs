//! Protocol and transport selection by configuration value.

use std::sync::Arc;

use matcha_adapter_onebot::{OneBotContext, OneBotV11, OneBotV12};
use matcha_core::Protocol;
use matcha_transport::Connector;
use tracing::debug;

use crate::config::{ProtocolKind, TransportKind};
use crate::error::{RuntimeError, RuntimeResult};

/// Builds the binding for `kind`.
pub fn create_protocol(kind: ProtocolKind, ctx: OneBotContext) -> Arc<dyn Protocol> {
    debug!(protocol = %kind, "Creating protocol binding");
    match kind {
        ProtocolKind::OnebotV11 => Arc::new(OneBotV11::new(ctx)),
        ProtocolKind::OnebotV12 => Arc::new(OneBotV12::new(ctx)),
    }
}

/// Builds the connector for `kind`, failing when its feature is disabled.
pub fn create_connector(kind: TransportKind) -> RuntimeResult<Arc<dyn Connector>> {
    match kind {
        #[cfg(feature = "ws-client")]
        TransportKind::WsClient => Ok(Arc::new(matcha_transport::WsConnector::new())),
        #[allow(unreachable_patterns)]
        other => Err(RuntimeError::TransportUnavailable(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcha_adapter_onebot::OneBotConfig;
    use matcha_core::{ActiveBot, Behav, ChatLog, FileCache, MemoryBlobs, MemoryStore};

    fn context() -> OneBotContext {
        let store = Arc::new(MemoryStore::new());
        let behav = Arc::new(Behav::new(
            store.clone(),
            Arc::new(ChatLog::new()),
            ActiveBot::default(),
        ));
        let files = Arc::new(FileCache::new(store, Arc::new(MemoryBlobs::new()), "http://cache"));
        OneBotContext::new(behav, files, OneBotConfig::default())
    }

    #[test]
    fn test_protocol_names_match_config_values() {
        for kind in [ProtocolKind::OnebotV11, ProtocolKind::OnebotV12] {
            assert_eq!(create_protocol(kind, context()).name(), kind.as_str());
        }
    }

    #[cfg(feature = "ws-client")]
    #[test]
    fn test_ws_client_connector() {
        assert!(create_connector(TransportKind::WsClient).is_ok());
    }
}
