use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::adapter::{Connector, Session};
use crate::error::TransferError;
use crate::exec::ExecConnector;
use crate::file::FileConnector;
use crate::scheme::Scheme;
use crate::simulate::SimulateConnector;
use crate::target::{SessionOptions, Target};

/// Scheme to connector dispatch.
#[derive(Clone)]
pub struct AdapterRegistry {
    connectors: FxHashMap<Scheme, Arc<dyn Connector>>,
    simulate: Arc<dyn Connector>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.connectors.keys().copied().collect();
        schemes.sort();
        f.debug_struct("AdapterRegistry")
            .field("schemes", &schemes)
            .finish_non_exhaustive()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_local_adapters()
    }
}

impl AdapterRegistry {
    /// Registry without any connector.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            connectors: FxHashMap::default(),
            simulate: Arc::new(SimulateConnector),
        }
    }

    /// Registry with the built-in `file` and `exec` connectors.
    #[must_use]
    pub fn with_local_adapters() -> Self {
        let mut registry = Self::empty();
        registry.register(Scheme::File, Arc::new(FileConnector));
        registry.register(Scheme::Exec, Arc::new(ExecConnector));
        registry
    }

    /// Installs `connector` for `scheme`, returning the one it replaces.
    pub fn register(
        &mut self,
        scheme: Scheme,
        connector: Arc<dyn Connector>,
    ) -> Option<Arc<dyn Connector>> {
        self.connectors.insert(scheme, connector)
    }

    /// Whether a connector serves `scheme`.
    #[must_use]
    pub fn supports(&self, scheme: Scheme) -> bool {
        self.connectors.contains_key(&scheme)
    }

    /// Connects to `target`, through the simulator when `simulate` is set.
    pub fn connect(
        &self,
        target: &Target,
        options: &SessionOptions,
        simulate: bool,
    ) -> Result<Box<dyn Session>, TransferError> {
        if simulate {
            return self.simulate.connect(target, options);
        }
        let connector = self
            .connectors
            .get(&target.scheme)
            .ok_or(TransferError::UnsupportedScheme(target.scheme))?;
        connector.connect(target, options)
    }
}
