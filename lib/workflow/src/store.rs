//! Collaborator seams: graph lookup and execution context persistence.
//!
//! The engine is generic over both traits so it can be tested with the
//! in-memory implementations and deployed against real storage. Context
//! stores keep each instance as one versioned [`Envelope`] document and
//! replace it whole on every save, so a reader never sees a partial write.

use crate::envelope::{self, Envelope};
use crate::error::StoreError;
use crate::execution::ExecutionContext;
use crate::graph::WorkflowGraph;
use async_trait::async_trait;
use nodeflow_core::{GraphId, InstanceId};
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Read-only source of workflow graphs.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Returns the graph, or `None` if no graph has this id.
    async fn get_graph(
        &self,
        graph_id: GraphId,
    ) -> Result<Option<Arc<WorkflowGraph>>, Report<StoreError>>;
}

/// Durable storage for execution contexts.
#[async_trait]
pub trait ExecutionContextStore: Send + Sync {
    /// Replaces the stored context for `context.instance_id` atomically.
    async fn save(&self, context: &ExecutionContext) -> Result<(), Report<StoreError>>;

    /// Returns the stored context, or `None` if the instance is unknown.
    async fn load(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<ExecutionContext>, Report<StoreError>>;
}

#[async_trait]
impl<T: GraphRepository + ?Sized> GraphRepository for Arc<T> {
    async fn get_graph(
        &self,
        graph_id: GraphId,
    ) -> Result<Option<Arc<WorkflowGraph>>, Report<StoreError>> {
        (**self).get_graph(graph_id).await
    }
}

#[async_trait]
impl<T: ExecutionContextStore + ?Sized> ExecutionContextStore for Arc<T> {
    async fn save(&self, context: &ExecutionContext) -> Result<(), Report<StoreError>> {
        (**self).save(context).await
    }

    async fn load(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<ExecutionContext>, Report<StoreError>> {
        (**self).load(instance_id).await
    }
}

/// Graph repository backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryGraphRepository {
    graphs: RwLock<HashMap<GraphId, Arc<WorkflowGraph>>>,
}

impl InMemoryGraphRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a graph under its own id, replacing any previous version.
    pub async fn insert(&self, graph: WorkflowGraph) -> GraphId {
        let id = graph.id();
        self.graphs.write().await.insert(id, Arc::new(graph));
        id
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    async fn get_graph(
        &self,
        graph_id: GraphId,
    ) -> Result<Option<Arc<WorkflowGraph>>, Report<StoreError>> {
        Ok(self.graphs.read().await.get(&graph_id).cloned())
    }
}

/// Context store holding encoded envelopes in memory.
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    documents: RwLock<HashMap<InstanceId, Vec<u8>>>,
}

impl InMemoryContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl ExecutionContextStore for InMemoryContextStore {
    async fn save(&self, context: &ExecutionContext) -> Result<(), Report<StoreError>> {
        let bytes = Envelope::new(context).encode()?;
        self.documents
            .write()
            .await
            .insert(context.instance_id, bytes);
        Ok(())
    }

    async fn load(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<ExecutionContext>, Report<StoreError>> {
        let documents = self.documents.read().await;
        documents
            .get(&instance_id)
            .map(|bytes| envelope::decode(bytes))
            .transpose()
    }
}

/// Context store writing one JSON envelope per instance into a directory.
#[derive(Debug, Clone)]
pub struct FileContextStore {
    dir: PathBuf,
}

impl FileContextStore {
    /// Uses `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, Report<StoreError>> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::WriteFailed {
                message: format!("create {}: {e}", dir.display()),
            })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, instance_id: InstanceId) -> PathBuf {
        self.dir.join(format!("{instance_id}.json"))
    }
}

#[async_trait]
impl ExecutionContextStore for FileContextStore {
    async fn save(&self, context: &ExecutionContext) -> Result<(), Report<StoreError>> {
        let bytes = Envelope::new(context).encode()?;
        let path = self.path_for(context.instance_id);
        let staging = path.with_extension("json.tmp");

        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| StoreError::WriteFailed {
                message: format!("write {}: {e}", staging.display()),
            })?;
        // Rename within one directory replaces the target atomically.
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StoreError::WriteFailed {
                message: format!("rename {}: {e}", path.display()),
            })?;

        debug!(instance_id = %context.instance_id, path = %path.display(), "context saved");
        Ok(())
    }

    async fn load(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<ExecutionContext>, Report<StoreError>> {
        let path = self.path_for(instance_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => envelope::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ReadFailed {
                message: format!("read {}: {e}", path.display()),
            }
            .into()),
        }
    }
}
