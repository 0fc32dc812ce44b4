//! Benchmark utilities.

use iotdm_core::{NewResource, TransactionManager, TreeConfig, TreeResult};
use iotdm_store::{InMemoryStore, ResourceId, ResourceType};
use std::sync::Arc;

/// A tree with one CSE and `containers` containers of `instances` chained
/// content instances each.
pub struct BenchTree {
    /// The manager; background workers are not started.
    pub tm: TransactionManager,
    /// The CSE base id.
    pub cse: ResourceId,
    /// Container ids.
    pub containers: Vec<ResourceId>,
    /// Every content instance id.
    pub instances: Vec<ResourceId>,
}

/// Builds a [`BenchTree`] with `config`.
pub fn seeded_tree(config: TreeConfig, containers: usize, instances: usize) -> TreeResult<BenchTree> {
    let tm = TransactionManager::new(Arc::new(InMemoryStore::new()), config)?;
    let writer = tm.writer();

    let cse = writer.generate_resource_id()?;
    writer.create_resource(&NewResource::new(
        cse.clone(),
        "InCSE1",
        ResourceId::null(),
        ResourceType::CSE_BASE,
    ))?;
    writer.create_cse_by_name("InCSE1", &cse)?;

    let mut tree = BenchTree {
        tm,
        cse,
        containers: Vec::with_capacity(containers),
        instances: Vec::with_capacity(containers * instances),
    };
    for k in 0..containers {
        let cnt = tree.create(&format!("cnt{k}"), &tree.cse, ResourceType::CONTAINER)?;
        for i in 0..instances {
            let cin = tree.append(&cnt, &format!("cin{i}"))?;
            tree.instances.push(cin);
        }
        tree.containers.push(cnt);
    }
    Ok(tree)
}

impl BenchTree {
    /// Creates one resource with a sample payload.
    pub fn create(&self, name: &str, parent_id: &ResourceId, resource_type: ResourceType) -> TreeResult<ResourceId> {
        let writer = self.tm.writer();
        let id = writer.generate_resource_id()?;
        writer.create_resource(
            &NewResource::new(id.clone(), name, parent_id.clone(), resource_type)
                .with_content_json(sample_content(name)),
        )?;
        Ok(id)
    }

    /// Creates a content instance and appends it to its parent's chain.
    pub fn append(&self, parent_id: &ResourceId, name: &str) -> TreeResult<ResourceId> {
        let id = self.create(name, parent_id, ResourceType::CONTENT_INSTANCE)?;
        self.tm
            .writer()
            .initialize_element_in_parent_list(ResourceType::CONTENT_INSTANCE, parent_id, &id, name)?;
        Ok(id)
    }
}

/// A small attribute payload.
pub fn sample_content(name: &str) -> String {
    serde_json::json!({ "rn": name, "con": "21.5", "cnf": "text/plain:0" }).to_string()
}
