//! The host-facing lifecycle surface, with a do-nothing variant.

use viewscope_core::NodeHandle;

use crate::{ServerConfig, ServerError, ViewServer};

/// What a host calls to expose its windows to inspection.
pub trait InspectorService: Send + Sync {
    /// Returns `Ok(false)` when already running.
    fn start(&self) -> Result<bool, ServerError>;

    /// Returns `false` when not running.
    fn stop(&self) -> bool;

    fn is_running(&self) -> bool;

    fn add_root(&self, root: NodeHandle, name: &str);

    fn remove_root(&self, root: &NodeHandle);

    fn set_focused(&self, root: Option<NodeHandle>);

    fn focused(&self) -> Option<NodeHandle>;
}

impl InspectorService for ViewServer {
    fn start(&self) -> Result<bool, ServerError> {
        ViewServer::start(self)
    }

    fn stop(&self) -> bool {
        ViewServer::stop(self)
    }

    fn is_running(&self) -> bool {
        ViewServer::is_running(self)
    }

    fn add_root(&self, root: NodeHandle, name: &str) {
        ViewServer::add_root(self, root, name);
    }

    fn remove_root(&self, root: &NodeHandle) {
        ViewServer::remove_root(self, root);
    }

    fn set_focused(&self, root: Option<NodeHandle>) {
        ViewServer::set_focused(self, root);
    }

    fn focused(&self) -> Option<NodeHandle> {
        ViewServer::focused(self)
    }
}

/// Inspector for builds where inspection is disabled: accepts every call,
/// opens no socket, remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopServer;

impl InspectorService for NoopServer {
    fn start(&self) -> Result<bool, ServerError> {
        Ok(false)
    }

    fn stop(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        false
    }

    fn add_root(&self, _root: NodeHandle, _name: &str) {}

    fn remove_root(&self, _root: &NodeHandle) {}

    fn set_focused(&self, _root: Option<NodeHandle>) {}

    fn focused(&self) -> Option<NodeHandle> {
        None
    }
}

/// The inspector for `config`: a started [`ViewServer`] when enabled,
/// otherwise a [`NoopServer`].
///
/// A server that fails to start is still returned, stopped, so the host keeps
/// working; the failure is logged.
pub fn inspector(config: ServerConfig) -> Box<dyn InspectorService> {
    if !config.enabled {
        tracing::debug!("view inspection disabled");
        return Box::new(NoopServer);
    }

    let server = ViewServer::new(config);
    if let Err(err) = server.start() {
        tracing::warn!(%err, "view server failed to start");
    }
    Box::new(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewscope_core::{Block, OwnerLoop};

    #[test]
    fn noop_server_ignores_everything() {
        let owner = OwnerLoop::new();
        let root = owner.attach(&Block::new("test.Root").into_ref());
        let service = NoopServer;

        assert!(!service.start().unwrap());
        service.add_root(root.clone(), "main");
        service.set_focused(Some(root));
        assert!(service.focused().is_none());
        assert!(!service.is_running());
        assert!(!service.stop());
    }

    #[test]
    fn disabled_config_yields_noop() {
        let service = inspector(ServerConfig::default().with_port(0).with_enabled(false));
        assert!(!service.is_running());
    }

    #[test]
    fn enabled_config_yields_running_server() {
        let service = inspector(ServerConfig::default().with_port(0));
        assert!(service.is_running());
        assert!(service.stop());
        assert!(!service.is_running());
    }

    #[test]
    fn trait_object_tracks_focus() {
        let owner = OwnerLoop::new();
        let root = owner.attach(&Block::new("test.Root").into_ref());
        let service: Box<dyn InspectorService> =
            Box::new(ViewServer::new(ServerConfig::default().with_port(0)));

        service.add_root(root.clone(), "main");
        service.set_focused(Some(root.clone()));
        assert_eq!(service.focused(), Some(root.clone()));
        service.remove_root(&root);
        assert_eq!(service.focused(), Some(root));
    }
}
