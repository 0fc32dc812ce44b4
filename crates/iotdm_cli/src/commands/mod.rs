//! CLI command implementations.

pub mod demo_tree;
pub mod reap;
pub mod stats;
pub mod verify;

use clap::ValueEnum;
use iotdm_core::{NewResource, TransactionManager, TreeError};
use iotdm_store::{ResourceId, ResourceType, StoreError};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The resource tree rejected an operation.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// The backing store failed outside the tree.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Output could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    Verification(usize),
}

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Shape of a generated demo tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeShape {
    /// CSE bases.
    pub cses: usize,
    /// Containers per CSE, held by one AE.
    pub containers: usize,
    /// Content instances per container.
    pub instances: usize,
}

/// Ids produced by [`populate`].
#[derive(Debug, Default)]
pub struct Populated {
    /// CSE base ids.
    pub cses: Vec<ResourceId>,
    /// Container ids.
    pub containers: Vec<ResourceId>,
    /// Content instance ids, grouped per container in append order.
    pub instances: Vec<Vec<ResourceId>>,
}

impl Populated {
    /// Every generated id.
    pub fn all_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.cses
            .iter()
            .chain(&self.containers)
            .chain(self.instances.iter().flatten())
    }
}

/// Fills `tm` with `shape`: each CSE holds one registered AE, which holds
/// the containers, which hold chained content instances.
pub fn populate(tm: &TransactionManager, shape: &TreeShape) -> Result<Populated, CliError> {
    let writer = tm.writer();
    let mut out = Populated::default();

    for c in 0..shape.cses {
        let cse_name = format!("InCSE{}", c + 1);
        let cse = writer.generate_resource_id()?;
        writer.create_resource(
            &NewResource::new(cse.clone(), cse_name.as_str(), ResourceId::null(), ResourceType::CSE_BASE)
                .with_content_json(json!({ "csi": format!("/{cse_name}") }).to_string()),
        )?;
        writer.create_cse_by_name(&cse_name, &cse)?;

        let ae = writer.generate_resource_id()?;
        let ae_id = format!("Cdemo{}", c + 1);
        writer.create_resource(
            &NewResource::new(ae.clone(), "demo-ae", cse.clone(), ResourceType::AE)
                .with_content_json(json!({ "aei": ae_id }).to_string()),
        )?;
        writer.create_ae_under_cse(&cse_name, &ae_id, &ae)?;

        for k in 0..shape.containers {
            let cnt = writer.generate_resource_id()?;
            writer.create_resource(&NewResource::new(
                cnt.clone(),
                format!("cnt{k}"),
                ae.clone(),
                ResourceType::CONTAINER,
            ))?;

            let mut chain = Vec::with_capacity(shape.instances);
            for i in 0..shape.instances {
                let cin = writer.generate_resource_id()?;
                let name = format!("cin{i}");
                writer.create_resource(
                    &NewResource::new(cin.clone(), name.as_str(), cnt.clone(), ResourceType::CONTENT_INSTANCE)
                        .with_content_json(json!({ "con": i }).to_string()),
                )?;
                writer.initialize_element_in_parent_list(ResourceType::CONTENT_INSTANCE, &cnt, &cin, &name)?;
                chain.push(cin);
            }
            out.containers.push(cnt);
            out.instances.push(chain);
        }
        out.cses.push(cse);
    }

    debug!(
        cses = out.cses.len(),
        containers = out.containers.len(),
        "demo tree populated"
    );
    Ok(out)
}
