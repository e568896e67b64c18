//! Camera Registry - owns every running pipeline
//!
//! The registry is mutated from one task only (startup, then config reloads).
//! Readers such as the HTTP API see a lock-free [`CameraDirectory`] of
//! controller handles, swapped after each change.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::camera::{CameraPipeline, PipelineDeps, PipelineError};
use crate::config::watcher::ConfigEvent;
use crate::config::{ConfigChange, GateConfig};
use crate::controller::GateHandle;
use crate::types::CameraSession;

/// Read side of the registry.
#[derive(Clone, Default)]
pub struct CameraDirectory {
    handles: Arc<ArcSwap<BTreeMap<String, GateHandle>>>,
}

impl CameraDirectory {
    pub fn get(&self, camera_id: &str) -> Option<GateHandle> {
        self.handles.load().get(camera_id).cloned()
    }

    /// All handles, ordered by camera id.
    pub fn handles(&self) -> Vec<GateHandle> {
        self.handles.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.load().is_empty()
    }

    fn publish(&self, pipelines: &BTreeMap<String, CameraPipeline>) {
        let next = pipelines
            .iter()
            .map(|(id, p)| (id.clone(), p.handle().clone()))
            .collect();
        self.handles.store(Arc::new(next));
    }
}

pub struct CameraRegistry {
    deps: PipelineDeps,
    cancel: CancellationToken,
    pipelines: BTreeMap<String, CameraPipeline>,
    directory: CameraDirectory,
}

impl CameraRegistry {
    /// Pipelines started by this registry are children of `cancel`.
    pub fn new(deps: PipelineDeps, cancel: CancellationToken) -> Self {
        Self {
            deps,
            cancel,
            pipelines: BTreeMap::new(),
            directory: CameraDirectory::default(),
        }
    }

    pub fn directory(&self) -> CameraDirectory {
        self.directory.clone()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraPipeline> {
        self.pipelines.get(camera_id)
    }

    /// Start a pipeline for every enabled camera. Cameras that fail to
    /// start are logged and skipped; returns how many started.
    pub fn start_all(&mut self, config: &GateConfig) -> usize {
        for session in config.enabled_sessions() {
            let camera_id = session.camera_id.clone();
            if let Err(e) = self.start_pipeline(session, config) {
                error!(camera_id = %camera_id, error = %e, "[Registry] camera failed to start");
            }
        }
        self.directory.publish(&self.pipelines);
        info!(cameras = self.pipelines.len(), "[Registry] pipelines started");
        self.pipelines.len()
    }

    /// Start one camera. A camera already running is replaced.
    pub async fn add(&mut self, session: CameraSession, config: &GateConfig) -> Result<(), PipelineError> {
        if let Some(old) = self.pipelines.remove(&session.camera_id) {
            old.stop().await;
        }
        let result = self.start_pipeline(session, config);
        self.directory.publish(&self.pipelines);
        result
    }

    pub async fn remove(&mut self, camera_id: &str) -> bool {
        let Some(pipeline) = self.pipelines.remove(camera_id) else {
            return false;
        };
        self.directory.publish(&self.pipelines);
        pipeline.stop().await;
        true
    }

    fn start_pipeline(&mut self, session: CameraSession, config: &GateConfig) -> Result<(), PipelineError> {
        let pipeline = CameraPipeline::start(session, config, &self.deps, &self.cancel)?;
        self.pipelines.insert(pipeline.camera_id().to_string(), pipeline);
        Ok(())
    }

    /// Bring running pipelines in line with a reloaded config.
    pub async fn apply(&mut self, config: &GateConfig, changes: &[ConfigChange]) {
        let camera = |id: &str| config.cameras.iter().find(|c| c.id == id && c.enabled);

        for change in changes {
            match change {
                ConfigChange::CameraAdded(id) | ConfigChange::CameraChanged(id) => {
                    let Some(cam) = camera(id) else { continue };
                    info!(camera_id = %id, change = ?change, "[Registry] (re)starting camera");
                    if let Err(e) = self.add(cam.to_session(), config).await {
                        error!(camera_id = %id, error = %e, "[Registry] camera failed to start");
                    }
                }
                ConfigChange::CameraRemoved(id) => {
                    if self.remove(id).await {
                        info!(camera_id = %id, "[Registry] camera removed");
                    }
                }
                ConfigChange::EndpointsChanged(id) => {
                    let (Some(cam), Some(pipeline)) = (camera(id), self.pipelines.get_mut(id)) else {
                        continue;
                    };
                    info!(camera_id = %id, "[Registry] endpoints updated in place");
                    pipeline
                        .update_endpoints(cam.to_session().endpoints, cam.annotated)
                        .await;
                }
                ConfigChange::Timing | ConfigChange::PlateGrammar => {
                    info!(change = ?change, "[Registry] applies to cameras started from now on");
                }
                ConfigChange::Server | ConfigChange::History => {
                    warn!(change = ?change, "[Registry] change needs a process restart");
                }
            }
        }
    }

    /// Apply config events until cancelled, then stop every pipeline.
    pub async fn run(mut self, mut events: mpsc::Receiver<ConfigEvent>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(ConfigEvent::Reloaded { config, changes }) => {
                        self.apply(&config, &changes).await;
                    }
                    Some(ConfigEvent::Error(e)) => {
                        warn!(error = %e, "[Registry] config reload failed, cameras unchanged");
                    }
                    None => {
                        self.cancel.cancelled().await;
                        break;
                    }
                },
            }
        }
        self.shutdown().await;
    }

    pub async fn shutdown(mut self) {
        let pipelines = std::mem::take(&mut self.pipelines);
        self.directory.publish(&self.pipelines);
        for (_, pipeline) in pipelines {
            pipeline.stop().await;
        }
        info!("[Registry] all pipelines stopped");
    }
}
