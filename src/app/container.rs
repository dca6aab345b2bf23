use std::sync::Arc;

use crate::adapters::{LibavBackend, LibavProbeAdapter};
use crate::app::{compress_interactor::Compressor, inspect_interactor::InspectInteractor};
use crate::config::SizefitConfig;
use crate::error::SizefitResult;
use crate::ports::{ProbePort, TranscodeBackend};

pub trait AppContainer: Send + Sync {
    type Backend: TranscodeBackend;

    fn compressor(&self) -> Arc<Compressor<Self::Backend>>;
    fn inspect_interactor(&self) -> Arc<InspectInteractor>;
}

pub struct DefaultAppContainer {
    compressor: Arc<Compressor<LibavBackend>>,
    inspect_interactor: Arc<InspectInteractor>,
}

impl DefaultAppContainer {
    pub fn new(config: &SizefitConfig) -> SizefitResult<Self> {
        let probe_port = Arc::new(LibavProbeAdapter::new()?);
        let backend = Arc::new(LibavBackend::new(config.pipeline.hardware_acceleration)?);

        let compressor = Arc::new(Compressor::new(
            Arc::clone(&probe_port) as Arc<dyn ProbePort>,
            backend,
            config,
        ));

        let inspect_interactor = Arc::new(InspectInteractor::new(
            Arc::clone(&probe_port) as Arc<dyn ProbePort>,
        ));

        Ok(Self {
            compressor,
            inspect_interactor,
        })
    }
}

impl AppContainer for DefaultAppContainer {
    type Backend = LibavBackend;

    fn compressor(&self) -> Arc<Compressor<LibavBackend>> {
        Arc::clone(&self.compressor)
    }

    fn inspect_interactor(&self) -> Arc<InspectInteractor> {
        Arc::clone(&self.inspect_interactor)
    }
}
