//! The module-aware resource index.
//!
//! Resources are partitioned into a local sub-index and one sub-index per
//! imported module. Invalidation is partition-granular: a changed local file
//! only re-scans the local partition.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::domain::{ResourceName, ResourceType};
use crate::error::CardoError;
use crate::resources::{
    CalculationData, CalculationResource, CardTypeData, FieldTypeData, FileResource,
    GraphModelData, GraphViewData, LinkTypeData, ReportData, ResourceContext, TemplateResource,
    WorkflowData,
};

/// Which partitions a listing draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    All,
    Local,
    Modules,
}

/// One cached resource object of any kind.
#[derive(Debug, Clone)]
pub enum ResourceEntry {
    CardType(FileResource<CardTypeData>),
    FieldType(FileResource<FieldTypeData>),
    LinkType(FileResource<LinkTypeData>),
    Workflow(FileResource<WorkflowData>),
    Template(TemplateResource),
    Report(FileResource<ReportData>),
    GraphModel(FileResource<GraphModelData>),
    GraphView(FileResource<GraphViewData>),
    Calculation(CalculationResource),
}

impl ResourceEntry {
    pub fn name(&self) -> &ResourceName {
        match self {
            ResourceEntry::CardType(r) => r.name(),
            ResourceEntry::FieldType(r) => r.name(),
            ResourceEntry::LinkType(r) => r.name(),
            ResourceEntry::Workflow(r) => r.name(),
            ResourceEntry::Template(r) => r.name(),
            ResourceEntry::Report(r) => r.name(),
            ResourceEntry::GraphModel(r) => r.name(),
            ResourceEntry::GraphView(r) => r.name(),
            ResourceEntry::Calculation(r) => r.name(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.name().resource_type()
    }

    /// Document as raw JSON, for `show` and validation reporting.
    pub fn raw(&self) -> Result<serde_json::Value, CardoError> {
        let to_value = |e| CardoError::InvalidInput(format!("Cannot serialize resource: {e}"));
        match self {
            ResourceEntry::CardType(r) => r.raw(),
            ResourceEntry::FieldType(r) => r.raw(),
            ResourceEntry::LinkType(r) => r.raw(),
            ResourceEntry::Workflow(r) => r.raw(),
            ResourceEntry::Template(r) => serde_json::to_value(r.show()).map_err(to_value),
            ResourceEntry::Report(r) => r.raw(),
            ResourceEntry::GraphModel(r) => r.raw(),
            ResourceEntry::GraphView(r) => r.raw(),
            ResourceEntry::Calculation(r) => serde_json::to_value(r.show()).map_err(to_value),
        }
    }

    pub fn validate(&self, content: Option<&serde_json::Value>) -> Result<Vec<String>, CardoError> {
        match self {
            ResourceEntry::CardType(r) => r.validate(content),
            ResourceEntry::FieldType(r) => r.validate(content),
            ResourceEntry::LinkType(r) => r.validate(content),
            ResourceEntry::Workflow(r) => r.validate(content),
            ResourceEntry::Template(r) => r.validate(content),
            ResourceEntry::Report(r) => r.validate(content),
            ResourceEntry::GraphModel(r) => r.validate(content),
            ResourceEntry::GraphView(r) => r.validate(content),
            ResourceEntry::Calculation(r) => r.validate(content),
        }
    }
}

#[derive(Debug, Default)]
struct Partition {
    entries: BTreeMap<ResourceName, ResourceEntry>,
    fresh: bool,
}

/// Typed, module-aware map of resource objects.
#[derive(Debug)]
pub struct ResourceCache {
    ctx: ResourceContext,
    local: Partition,
    modules: BTreeMap<String, Partition>,
}

impl ResourceCache {
    pub fn new(ctx: ResourceContext, module_prefixes: &[String]) -> Self {
        let modules = module_prefixes
            .iter()
            .map(|prefix| (prefix.clone(), Partition::default()))
            .collect();
        Self { ctx, local: Partition::default(), modules }
    }

    /// Rebuild every stale partition from disk.
    pub fn refresh(&mut self) -> Result<(), CardoError> {
        if !self.local.fresh {
            let local_prefix = self.ctx.local_prefix.clone();
            self.local.entries = scan_partition(&self.ctx, &local_prefix)?;
            self.local.fresh = true;
        }
        for (prefix, partition) in &mut self.modules {
            if !partition.fresh {
                partition.entries = scan_partition(&self.ctx, prefix)?;
                partition.fresh = true;
            }
        }
        Ok(())
    }

    /// Register a new module partition (marked stale until refreshed).
    pub fn add_module(&mut self, prefix: &str) {
        self.modules.insert(prefix.to_string(), Partition::default());
    }

    pub fn remove_module(&mut self, prefix: &str) {
        self.modules.remove(prefix);
    }

    pub fn module_prefixes(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Whether any partition needs a re-scan.
    pub fn is_stale(&self) -> bool {
        !self.local.fresh || self.modules.values().any(|p| !p.fresh)
    }

    /// Invalidate the local partition.
    pub fn changed(&mut self) {
        debug!("resource cache: local partition invalidated");
        self.local.fresh = false;
    }

    /// Invalidate one module partition, or all of them.
    pub fn changed_modules(&mut self, prefix: Option<&str>) {
        match prefix {
            Some(prefix) => {
                if let Some(partition) = self.modules.get_mut(prefix) {
                    partition.fresh = false;
                }
            }
            None => {
                for partition in self.modules.values_mut() {
                    partition.fresh = false;
                }
            }
        }
    }

    /// Derive the affected partition from a changed path and invalidate it.
    pub fn handle_file_system_change(&mut self, path: &Path) {
        let Some(name) = self.ctx.paths.resource_name_of(path, &self.ctx.local_prefix) else {
            return;
        };
        if name.prefix() == self.ctx.local_prefix {
            self.changed();
        } else {
            self.changed_modules(Some(name.prefix()));
        }
    }

    fn partition(&self, prefix: &str) -> Option<&Partition> {
        if prefix == self.ctx.local_prefix {
            Some(&self.local)
        } else {
            self.modules.get(prefix)
        }
    }

    fn partition_mut(&mut self, prefix: &str) -> Option<&mut Partition> {
        if prefix == self.ctx.local_prefix {
            Some(&mut self.local)
        } else {
            self.modules.get_mut(prefix)
        }
    }

    pub fn by_name(&self, name: &ResourceName) -> Result<&ResourceEntry, CardoError> {
        self.partition(name.prefix())
            .and_then(|p| p.entries.get(name))
            .ok_or_else(|| CardoError::ResourceNotFound(name.to_string()))
    }

    pub fn by_name_mut(&mut self, name: &ResourceName) -> Result<&mut ResourceEntry, CardoError> {
        let not_found = CardoError::ResourceNotFound(name.to_string());
        self.partition_mut(name.prefix())
            .and_then(|p| p.entries.get_mut(name))
            .ok_or(not_found)
    }

    pub fn exists(&self, name: &ResourceName) -> bool {
        self.partition(name.prefix()).is_some_and(|p| p.entries.contains_key(name))
    }

    /// Find by type and bare identifier, preferring local over modules.
    pub fn find(&self, rt: ResourceType, identifier: &str) -> Option<&ResourceEntry> {
        let local = ResourceName::new(self.ctx.local_prefix.clone(), rt, identifier);
        if let Some(entry) = self.local.entries.get(&local) {
            return Some(entry);
        }
        self.modules.iter().find_map(|(prefix, partition)| {
            partition.entries.get(&ResourceName::new(prefix.clone(), rt, identifier))
        })
    }

    /// Insert a freshly created resource.
    pub fn add(&mut self, entry: ResourceEntry) -> Result<(), CardoError> {
        let name = entry.name().clone();
        let partition = self
            .partition_mut(name.prefix())
            .ok_or_else(|| CardoError::ModuleNotImported(name.prefix().to_string()))?;
        if partition.entries.contains_key(&name) {
            return Err(CardoError::ResourceExists(name.to_string()));
        }
        partition.entries.insert(name, entry);
        Ok(())
    }

    /// Drop a resource from the index.
    pub fn remove(&mut self, name: &ResourceName) -> Result<ResourceEntry, CardoError> {
        let not_found = CardoError::ResourceNotFound(name.to_string());
        self.partition_mut(name.prefix())
            .and_then(|p| p.entries.remove(name))
            .ok_or(not_found)
    }

    /// Swap the key of a cached instance after a rename; the instance itself
    /// has already been renamed on disk.
    pub fn rename(&mut self, old: &ResourceName, new: ResourceName) -> Result<(), CardoError> {
        let entry = self.remove(old)?;
        let partition = self
            .partition_mut(new.prefix())
            .ok_or_else(|| CardoError::ModuleNotImported(new.prefix().to_string()))?;
        partition.entries.insert(new, entry);
        Ok(())
    }

    /// Names of all resources of one type within a scope, sorted.
    pub fn resource_names(&self, rt: ResourceType, scope: ResourceScope) -> Vec<ResourceName> {
        let mut names: Vec<ResourceName> = Vec::new();
        if matches!(scope, ResourceScope::All | ResourceScope::Local) {
            names.extend(
                self.local.entries.keys().filter(|n| n.resource_type() == rt).cloned(),
            );
        }
        if matches!(scope, ResourceScope::All | ResourceScope::Modules) {
            for partition in self.modules.values() {
                names.extend(
                    partition.entries.keys().filter(|n| n.resource_type() == rt).cloned(),
                );
            }
        }
        names.sort();
        names
    }

    /// All entries across every partition.
    pub fn entries(&self, scope: ResourceScope) -> Vec<&ResourceEntry> {
        let mut out = Vec::new();
        if matches!(scope, ResourceScope::All | ResourceScope::Local) {
            out.extend(self.local.entries.values());
        }
        if matches!(scope, ResourceScope::All | ResourceScope::Modules) {
            out.extend(self.modules.values().flat_map(|p| p.entries.values()));
        }
        out
    }

    // Typed accessors used throughout the command layer.

    pub fn card_type(&self, name: &ResourceName) -> Result<&FileResource<CardTypeData>, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::CardType(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a card type"))),
        }
    }

    pub fn field_type(
        &self,
        name: &ResourceName,
    ) -> Result<&FileResource<FieldTypeData>, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::FieldType(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a field type"))),
        }
    }

    pub fn link_type(&self, name: &ResourceName) -> Result<&FileResource<LinkTypeData>, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::LinkType(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a link type"))),
        }
    }

    pub fn workflow(&self, name: &ResourceName) -> Result<&FileResource<WorkflowData>, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::Workflow(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a workflow"))),
        }
    }

    pub fn template(&self, name: &ResourceName) -> Result<&TemplateResource, CardoError> {
        match self.by_name(name) {
            Ok(ResourceEntry::Template(r)) => Ok(r),
            Ok(_) => Err(CardoError::InvalidInput(format!("'{name}' is not a template"))),
            Err(_) => Err(CardoError::TemplateNotFound(name.to_string())),
        }
    }

    pub fn report(&self, name: &ResourceName) -> Result<&FileResource<ReportData>, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::Report(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a report"))),
        }
    }

    pub fn graph_model(
        &self,
        name: &ResourceName,
    ) -> Result<&FileResource<GraphModelData>, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::GraphModel(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a graph model"))),
        }
    }

    pub fn graph_view(
        &self,
        name: &ResourceName,
    ) -> Result<&FileResource<GraphViewData>, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::GraphView(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a graph view"))),
        }
    }

    pub fn calculation(&self, name: &ResourceName) -> Result<&CalculationResource, CardoError> {
        match self.by_name(name)? {
            ResourceEntry::Calculation(r) => Ok(r),
            _ => Err(CardoError::InvalidInput(format!("'{name}' is not a calculation"))),
        }
    }
}

fn scan_partition(
    ctx: &ResourceContext,
    prefix: &str,
) -> Result<BTreeMap<ResourceName, ResourceEntry>, CardoError> {
    let mut entries = BTreeMap::new();
    for rt in ResourceType::ALL {
        let dir = ctx.paths.resource_type_dir(prefix, &ctx.local_prefix, rt);
        if !dir.exists() {
            continue;
        }
        let listing = fs::read_dir(&dir).map_err(|e| CardoError::read(&dir, e))?;
        for item in listing {
            let item = item.map_err(|e| CardoError::read(&dir, e))?;
            let path = item.path();
            let Some(identifier) = identifier_of(&path, rt) else { continue };
            let name = ResourceName::new(prefix, rt, identifier);
            let entry = open_entry(ctx.clone(), name)?;
            entries.insert(entry.name().clone(), entry);
        }
    }
    Ok(entries)
}

/// Identifier of a resource entry under its type folder, if the path is one.
fn identifier_of(path: &Path, rt: ResourceType) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    if rt.is_folder_resource() {
        path.is_dir().then(|| file_name.to_string())
    } else {
        // Flat types: take the JSON documents, skip sidecars like `<id>.lp`.
        file_name.strip_suffix(".json").map(str::to_string)
    }
}

fn open_entry(ctx: ResourceContext, name: ResourceName) -> Result<ResourceEntry, CardoError> {
    Ok(match name.resource_type() {
        ResourceType::CardTypes => ResourceEntry::CardType(FileResource::open(ctx, name)?),
        ResourceType::FieldTypes => ResourceEntry::FieldType(FileResource::open(ctx, name)?),
        ResourceType::LinkTypes => ResourceEntry::LinkType(FileResource::open(ctx, name)?),
        ResourceType::Workflows => ResourceEntry::Workflow(FileResource::open(ctx, name)?),
        ResourceType::Templates => ResourceEntry::Template(TemplateResource::open(ctx, name)?),
        ResourceType::Reports => ResourceEntry::Report(FileResource::open(ctx, name)?),
        ResourceType::GraphModels => ResourceEntry::GraphModel(FileResource::open(ctx, name)?),
        ResourceType::GraphViews => ResourceEntry::GraphView(FileResource::open(ctx, name)?),
        ResourceType::Calculations => {
            ResourceEntry::Calculation(CalculationResource::open(ctx, name)?)
        }
    })
}
